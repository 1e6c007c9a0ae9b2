use bevy::prelude::*;

use crate::components::*;
use crate::physics_core::{compute_grounded, is_holding, resolve_motion, Aabb, MotionParams};
use crate::tilemap::Tilemap;
use crate::trajectory::PhysicsProfile;

/// Systems that move bodies; planning runs before this set each tick.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicsSet;

pub struct PhysicsPlugin;

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PhysicsProfile>()
            .init_resource::<TileRules>()
            .add_systems(FixedUpdate, apply_physics.in_set(PhysicsSet));
    }
}

fn apply_physics(
    profile: Res<PhysicsProfile>,
    rules: Res<TileRules>,
    tilemap: Res<Tilemap>,
    mut query: Query<(
        &mut GamePosition,
        &mut Velocity,
        &mut Grounded,
        &Collider,
        Option<&mut Mover>,
    )>,
) {
    for (mut pos, mut vel, mut grounded, collider, mover) in query.iter_mut() {
        grounded.0 = step_body(
            &tilemap,
            &rules,
            &profile,
            &mut pos,
            &mut vel,
            collider,
            mover.map(|m| m.into_inner()),
        );
    }
}

/// Advances one body by a single tick and reports whether it ended up on
/// the ground.
///
/// A held jump overrides vertical velocity before the move; gravity is
/// applied after it, so the body traces the same arc the planner samples.
pub(crate) fn step_body(
    tilemap: &Tilemap,
    rules: &TileRules,
    profile: &PhysicsProfile,
    pos: &mut GamePosition,
    vel: &mut Velocity,
    collider: &Collider,
    mover: Option<&mut Mover>,
) -> bool {
    if let Some(mover) = mover {
        if mover.jump_ticks_left > 0 {
            vel.y = mover.jump_speed;
            mover.jump_ticks_left -= 1;
        }
    }

    let ts = tilemap.tile_size;
    let out = resolve_motion(
        tilemap,
        rules,
        MotionParams {
            tile_size: ts,
            dt: 1.0,
            x: pos.x,
            y: pos.y,
            vx: vel.x,
            vy: vel.y,
            width: collider.width,
            height: collider.height,
        },
    );
    pos.x = out.x;
    pos.y = out.y;
    vel.x = out.vx;
    vel.y = out.vy;

    let hitbox = Aabb::from_center(pos.x, pos.y, collider.width, collider.height);
    if !is_holding(tilemap, rules, &hitbox, ts) {
        vel.y = profile.fall(vel.y);
    }

    compute_grounded(tilemap, rules, ts, pos.x, pos.y, collider.width, collider.height)
}
