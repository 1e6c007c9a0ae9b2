use bevy::prelude::*;

use crate::actor::{MovementHost, PlanningActor, PursuitConfig, PursuitTick, TargetObservation};
use crate::components::{
    ChaseTarget, Chaser, Collider, GamePosition, Grounded, Mover, PatrolRoute, PlanStatus,
    TileRules, Velocity,
};
use crate::physics::PhysicsSet;
use crate::physics_core::{collides_obstacle, is_holding, Aabb};
use crate::tilemap::Tilemap;
use crate::trajectory::PhysicsProfile;

pub struct AiPlugin;

impl Plugin for AiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            FixedUpdate,
            (drive_patrols, update_chasers)
                .chain()
                .before(PhysicsSet),
        );
    }
}

/// Collider sized like the engine's 12x14 actor at 16px tiles.
pub fn actor_collider(tile_size: f32) -> Collider {
    Collider {
        width: tile_size * 0.75,
        height: tile_size * 0.875,
    }
}

/// Hitbox center of an actor standing on the floor of `tile`.
pub fn standing_position(tilemap: &Tilemap, tile: IVec2, collider: &Collider) -> GamePosition {
    GamePosition {
        x: (tile.x as f32 + 0.5) * tilemap.tile_size,
        y: tile.y as f32 * tilemap.tile_size + collider.height / 2.0,
    }
}

pub fn chaser_bundle(
    tilemap: &Tilemap,
    tile: IVec2,
    profile: &PhysicsProfile,
    config: &PursuitConfig,
    rules: &TileRules,
) -> impl Bundle {
    let collider = actor_collider(tilemap.tile_size);
    (
        standing_position(tilemap, tile, &collider),
        Velocity::default(),
        Grounded::default(),
        collider,
        Mover {
            speed: profile.speed,
            jump_speed: profile.jump_speed,
            jump_hold_ticks: profile.jump_hold_ticks,
            jump_ticks_left: 0,
        },
        Chaser {
            actor: PlanningActor::new(profile.clone(), config.clone(), *rules),
        },
        PlanStatus::default(),
    )
}

pub fn target_bundle(tilemap: &Tilemap, tile: IVec2) -> impl Bundle {
    let collider = actor_collider(tilemap.tile_size);
    (
        standing_position(tilemap, tile, &collider),
        Velocity::default(),
        Grounded::default(),
        collider,
    )
}

/// [`MovementHost`] over one chaser's components for a single tick.
struct ActorHost<'a> {
    tilemap: &'a Tilemap,
    rules: TileRules,
    body: IVec2,
    pos: Vec2,
    collider: Collider,
    grounded: bool,
    vel: &'a mut Velocity,
    mover: &'a mut Mover,
}

impl ActorHost<'_> {
    fn ladder_below(&self) -> bool {
        is_holding(
            self.tilemap,
            &self.rules,
            &self.hitbox().translate(0.0, -1.0),
            self.tilemap.tile_size,
        )
    }
}

impl MovementHost for ActorHost<'_> {
    fn hitbox(&self) -> Aabb {
        Aabb::from_center(self.pos.x, self.pos.y, self.collider.width, self.collider.height)
    }

    fn grid_pos(&self) -> IVec2 {
        let half_extra = (self.body.as_vec2() - Vec2::ONE) * self.tilemap.tile_size * 0.5;
        self.tilemap.world_to_tile(self.pos - half_extra)
    }

    fn is_landed(&self) -> bool {
        self.grounded
    }

    fn is_holding(&self) -> bool {
        is_holding(self.tilemap, &self.rules, &self.hitbox(), self.tilemap.tile_size)
    }

    fn is_movable(&self, offset: Vec2) -> bool {
        let moved = self.hitbox().translate(offset.x, offset.y);
        !collides_obstacle(self.tilemap, &self.rules, &moved, self.tilemap.tile_size)
    }

    fn move_toward(&mut self, target: Vec2) {
        let speed = self.mover.speed;
        let delta = target - self.pos;
        self.vel.x = delta.x.clamp(-speed, speed);
        if self.is_holding() || (delta.y < 0.0 && self.ladder_below()) {
            self.vel.y = delta.y.clamp(-speed, speed);
        }
    }

    fn jump(&mut self) {
        if self.mover.jump_ticks_left == 0 {
            self.mover.jump_ticks_left = self.mover.jump_hold_ticks.max(1);
        }
    }

    fn halt(&mut self) {
        self.vel.x = 0.0;
        if self.is_holding() {
            self.vel.y = 0.0;
        }
    }
}

type ChaserQueryItem<'a> = (
    Entity,
    &'a mut Chaser,
    &'a ChaseTarget,
    &'a GamePosition,
    &'a mut Velocity,
    &'a Grounded,
    &'a Collider,
    &'a mut Mover,
    &'a mut PlanStatus,
);

fn update_chasers(
    tilemap: Res<Tilemap>,
    targets: Query<(&GamePosition, &Velocity, &Collider, &Grounded), Without<Chaser>>,
    mut chasers: Query<ChaserQueryItem<'_>>,
) {
    // Writes straight into `tiles` skip the generation stamp.
    let map_changed = tilemap.is_changed();
    for (entity, mut chaser, target, pos, mut vel, grounded, collider, mut mover, mut status) in
        chasers.iter_mut()
    {
        if map_changed {
            chaser.actor.invalidate_terrain();
        }
        let observation = targets
            .get(target.0)
            .ok()
            .map(|(tpos, tvel, tcol, tgrounded)| TargetObservation {
                hitbox: Aabb::from_center(tpos.x, tpos.y, tcol.width, tcol.height),
                velocity: Vec2::new(tvel.x, tvel.y),
                landed: tgrounded.0,
            });
        if observation.is_none() && *status != PlanStatus::Idle {
            warn!("[Pursuit] chaser {entity:?} lost its target {:?}", target.0);
        }

        let body = chaser.actor.config().body();
        let mut host = ActorHost {
            tilemap: &tilemap,
            rules: *chaser.actor.rules(),
            body,
            pos: Vec2::new(pos.x, pos.y),
            collider: *collider,
            grounded: grounded.0,
            vel: &mut *vel,
            mover: &mut *mover,
        };
        if observation.is_none() {
            chaser.actor.stop_plan(&mut host);
        }
        let next = match chaser.actor.update(&tilemap, &mut host, observation.as_ref()) {
            PursuitTick::Following => PlanStatus::Following,
            PursuitTick::Unreachable => PlanStatus::Unreachable,
            PursuitTick::Idle | PursuitTick::Arrived | PursuitTick::Finished => PlanStatus::Idle,
        };
        status.set_if_neq(next);
    }
}

fn drive_patrols(mut query: Query<(&GamePosition, &mut Velocity, &mut PatrolRoute)>) {
    for (pos, mut vel, mut route) in query.iter_mut() {
        let past_end = (route.heading > 0.0 && pos.x >= route.max_x)
            || (route.heading < 0.0 && pos.x <= route.min_x);
        if past_end {
            route.heading = -route.heading;
        }
        vel.x = route.heading;
    }
}
