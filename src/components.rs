use bevy::prelude::*;

use crate::actor::PlanningActor;

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum TileType {
    Empty = 0,
    Block = 1,
    Ladder = 2,
    /// One-way platform: stands like a block, passable from below and the sides.
    Ledge = 3,
    /// Solid hazard; bodies collide with it like a block.
    Spike = 4,
}

impl TileType {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => TileType::Block,
            2 => TileType::Ladder,
            3 => TileType::Ledge,
            4 => TileType::Spike,
            _ => TileType::Empty,
        }
    }

    pub fn is_block(self) -> bool {
        self == TileType::Block
    }

    pub fn is_spike(self) -> bool {
        self == TileType::Spike
    }

    pub fn is_ledge(self) -> bool {
        self == TileType::Ledge
    }

    pub fn is_ladder(self) -> bool {
        self == TileType::Ladder
    }
}

/// Terrain classes the planner reasons about.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TileClass {
    /// Impassable for a body.
    Obstacle,
    /// Provides standing support from above.
    Stoppable,
    /// Climbable while overlapping.
    Grabbable,
}

/// Maps raw tile codes to [`TileClass`] membership.
///
/// Passed explicitly into occupancy construction so two physics profiles with
/// different terrain semantics can share one tilemap. Body physics reads the
/// same rules, so what the planner assumes and what bodies collide with agree.
#[derive(Resource, Clone, Copy, Debug)]
pub struct TileRules {
    pub obstacle: fn(u8) -> bool,
    pub stoppable: fn(u8) -> bool,
    pub grabbable: fn(u8) -> bool,
}

impl TileRules {
    pub fn matches(&self, class: TileClass, code: u8) -> bool {
        match class {
            TileClass::Obstacle => (self.obstacle)(code),
            TileClass::Stoppable => (self.stoppable)(code),
            TileClass::Grabbable => (self.grabbable)(code),
        }
    }
}

impl Default for TileRules {
    fn default() -> Self {
        Self {
            obstacle: |c| {
                let t = TileType::from_u8(c);
                t.is_block() || t.is_spike()
            },
            stoppable: |c| {
                let t = TileType::from_u8(c);
                t.is_block() || t.is_spike() || t.is_ledge()
            },
            grabbable: |c| TileType::from_u8(c).is_ladder(),
        }
    }
}

/// Sub-tile precision position (world units, hitbox center)
#[derive(Component, Clone, Copy, Default, Debug)]
pub struct GamePosition {
    pub x: f32,
    pub y: f32,
}

/// Velocity in world units per tick
#[derive(Component, Clone, Copy, Default, Debug)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

/// Whether the entity is on the ground
#[derive(Component, Clone, Copy, Default)]
pub struct Grounded(pub bool);

/// Collision box size in world units
#[derive(Component, Clone, Copy, Debug)]
pub struct Collider {
    pub width: f32,
    pub height: f32,
}

/// Horizontal speed cap and jump state for a physics-driven actor.
#[derive(Component, Clone, Copy, Debug)]
pub struct Mover {
    pub speed: f32,
    pub jump_speed: f32,
    pub jump_hold_ticks: u32,
    /// Ticks the current jump impulse is still held for.
    pub jump_ticks_left: u32,
}

/// An NPC that chases another entity through the tilemap.
#[derive(Component)]
pub struct Chaser {
    pub actor: PlanningActor,
}

/// Entity a [`Chaser`] is pursuing.
#[derive(Component, Clone, Copy)]
pub struct ChaseTarget(pub Entity);

/// Scripted back-and-forth walk between two world x coordinates.
#[derive(Component, Clone, Copy, Debug)]
pub struct PatrolRoute {
    pub min_x: f32,
    pub max_x: f32,
    /// Signed walking speed; flips at either end of the route.
    pub heading: f32,
}

/// Last observed pursuit state, refreshed every fixed tick.
#[derive(Component, Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum PlanStatus {
    #[default]
    Idle,
    Following,
    Unreachable,
}
