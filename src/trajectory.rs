use std::collections::BTreeSet;

use bevy::math::{IVec2, Vec2};
use bevy::prelude::Resource;

use crate::occupancy::{OccupancyIndex, TileRect};
use crate::physics_core::Aabb;

/// Per-tick movement constants shared by trajectory precomputation and the
/// simulation that executes plans.
#[derive(Resource, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PhysicsProfile {
    pub tile_size: f32,
    /// Horizontal world units per tick.
    pub speed: f32,
    pub jump_speed: f32,
    /// Ticks the jump impulse keeps overriding gravity.
    pub jump_hold_ticks: u32,
    pub gravity: f32,
    pub max_fall_speed: f32,
    /// Ticks simulated when building offset catalogs.
    pub horizon: u32,
}

impl Default for PhysicsProfile {
    fn default() -> Self {
        Self {
            tile_size: 16.0,
            speed: 4.0,
            jump_speed: 8.0,
            jump_hold_ticks: 2,
            gravity: 1.0,
            max_fall_speed: 8.0,
            horizon: 40,
        }
    }
}

impl PhysicsProfile {
    pub fn jump_impulse(&self, t: u32) -> Option<f32> {
        (t < self.jump_hold_ticks).then_some(self.jump_speed)
    }

    pub fn fall(&self, vy: f32) -> f32 {
        (vy - self.gravity).max(-self.max_fall_speed)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size <= 0.0 {
            return Err(format!("tile_size must be positive, got {}", self.tile_size));
        }
        if self.speed <= 0.0 {
            return Err(format!("speed must be positive, got {}", self.speed));
        }
        if self.gravity <= 0.0 {
            return Err(format!("gravity must be positive, got {}", self.gravity));
        }
        if self.max_fall_speed < 0.0 || self.jump_speed < 0.0 {
            return Err("jump_speed and max_fall_speed must not be negative".to_string());
        }
        Ok(())
    }
}

/// Tile offsets reachable by one uninterrupted jump ascent and by one
/// uninterrupted fall, stored for rightward motion (`dx >= 0`).
#[derive(Clone, Debug, Default)]
pub struct TrajectoryCatalog {
    /// `(dx, rise)` with `rise >= 0`.
    jumps: BTreeSet<(i32, i32)>,
    /// `(dx, drop)` with `drop >= 0`.
    falls: BTreeSet<(i32, i32)>,
}

impl TrajectoryCatalog {
    pub fn from_profile(profile: &PhysicsProfile) -> Self {
        Self {
            jumps: compute_jump_offsets(
                profile.speed,
                profile.tile_size,
                |t| profile.jump_impulse(t),
                |vy| profile.fall(vy),
                profile.horizon,
            ),
            falls: compute_fall_offsets(
                profile.speed,
                profile.tile_size,
                |vy| profile.fall(vy),
                profile.horizon,
            ),
        }
    }

    /// Jump offsets for direction `dir` (`+1` right, `-1` left) as `(dx, rise)`.
    pub fn jump_offsets(&self, dir: i32) -> impl Iterator<Item = IVec2> + '_ {
        self.jumps.iter().map(move |&(dx, dy)| IVec2::new(dx * dir, dy))
    }

    /// Fall offsets for direction `dir` as `(dx, drop)`.
    pub fn fall_offsets(&self, dir: i32) -> impl Iterator<Item = IVec2> + '_ {
        self.falls.iter().map(move |&(dx, dy)| IVec2::new(dx * dir, dy))
    }

    pub fn has_jump(&self, dx: i32, rise: i32) -> bool {
        self.jumps.contains(&(dx.abs(), rise))
    }

    pub fn has_fall(&self, dx: i32, drop: i32) -> bool {
        self.falls.contains(&(dx.abs(), drop))
    }

    pub fn jump_len(&self) -> usize {
        self.jumps.len()
    }

    pub fn fall_len(&self) -> usize {
        self.falls.len()
    }
}

/// Offsets covered while a jump is still ascending. Each tick the impulse
/// overrides gravity while it lasts; the sweep ends at the first tick whose
/// vertical velocity turns negative. Every column between the launch column
/// and the current x is recorded, since the body can release early.
pub fn compute_jump_offsets(
    speed: f32,
    tile_size: f32,
    jump: impl Fn(u32) -> Option<f32>,
    fall: impl Fn(f32) -> f32,
    horizon: u32,
) -> BTreeSet<(i32, i32)> {
    let mut offsets = BTreeSet::new();
    let (mut x, mut y, mut vy) = (0.0f32, 0.0f32, 0.0f32);
    let mut last = 0;
    for t in 0..horizon {
        vy = jump(t).unwrap_or_else(|| fall(vy));
        if vy < 0.0 {
            break;
        }
        x += speed;
        y += vy;
        let rise = (y / tile_size).floor() as i32;
        for row in rows_entered(last, rise) {
            for dx in 0..=(x / tile_size).floor() as i32 {
                if dx != 0 || row != 0 {
                    offsets.insert((dx, row));
                }
            }
        }
        last = rise;
    }
    offsets
}

/// Offsets covered by an unconditional fall from rest, as `(dx, drop)` where
/// `drop` counts whole tiles fallen.
pub fn compute_fall_offsets(
    speed: f32,
    tile_size: f32,
    fall: impl Fn(f32) -> f32,
    horizon: u32,
) -> BTreeSet<(i32, i32)> {
    let mut offsets = BTreeSet::new();
    offsets.insert((0, 0));
    let (mut x, mut y, mut vy) = (0.0f32, 0.0f32, 0.0f32);
    let mut last = 0;
    for _ in 0..horizon {
        x += speed;
        y += vy;
        vy = fall(vy);
        let drop = (-y / tile_size).floor() as i32;
        for row in rows_entered(last, drop) {
            for dx in 0..=(x / tile_size).floor() as i32 {
                offsets.insert((dx, row));
            }
        }
        last = drop;
    }
    offsets
}

/// Rows a body passes through during one tick that took it from row `last`
/// to row `now`. A tick spanning several rows covers every row in between.
fn rows_entered(last: i32, now: i32) -> std::ops::RangeInclusive<i32> {
    if now > last {
        last + 1..=now
    } else {
        now..=now
    }
}

/// Where a ballistic body comes to rest.
///
/// Moves `hitbox` by `velocity` once per tick, horizontal step first,
/// updating only the vertical component with `fall`. Returns the hitbox of
/// the last tick before a descending step would enter a stoppable tile from
/// above. `None` when the body runs into a wall sideways or no landing
/// happens within `horizon` ticks.
pub fn predict_landing(
    stoppable: &OccupancyIndex,
    tile_size: f32,
    hitbox: Aabb,
    velocity: Vec2,
    fall: impl Fn(f32) -> f32,
    horizon: u32,
) -> Option<Aabb> {
    let mut current = hitbox;
    let mut v = velocity;
    for _ in 0..horizon {
        let before = TileRect::covering(&current, tile_size);
        let shifted = current.translate(v.x, 0.0);
        let across = TileRect::covering(&shifted, tile_size);
        // Columns the leading edge moves into; a stoppable tile there is a
        // wall, not a floor.
        let lead = if across.right() > before.right() {
            TileRect::new(before.right(), across.y, across.right() - before.right(), across.height)
        } else if across.x < before.x {
            TileRect::new(across.x, across.y, before.x - across.x, across.height)
        } else {
            TileRect::default()
        };
        if !lead.is_empty() && stoppable.exists(&lead) {
            return None;
        }

        let moved = shifted.translate(0.0, v.y);
        if v.y <= 0.0 {
            let after = TileRect::covering(&moved, tile_size);
            let under = TileRect::new(across.x, after.y, across.width, across.y - after.y);
            if !under.is_empty() && stoppable.exists(&under) {
                return Some(current);
            }
        }
        current = moved;
        v.y = fall(v.y);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::TileType;
    use crate::tilemap::Tilemap;

    fn narrow_gap_profile() -> PhysicsProfile {
        PhysicsProfile {
            tile_size: 16.0,
            speed: 8.0,
            jump_speed: 0.0,
            jump_hold_ticks: 0,
            gravity: 1.0,
            max_fall_speed: 16.0,
            horizon: 30,
        }
    }

    #[test]
    fn fall_offsets_cover_short_hops_without_drop() {
        let catalog = TrajectoryCatalog::from_profile(&narrow_gap_profile());
        assert!(catalog.has_fall(0, 0));
        assert!(catalog.has_fall(3, 0));
        assert!(!catalog.has_fall(4, 0));
        assert!(catalog.has_fall(3, 1));
        assert!(catalog.has_fall(0, 5));
        assert_eq!(catalog.jump_len(), 0);
    }

    #[test]
    fn jump_offsets_stop_at_the_apex() {
        let profile = PhysicsProfile::default();
        let catalog = TrajectoryCatalog::from_profile(&profile);
        // 8 + 8 + 7 + ... + 0 = 44 units over 10 ticks, 40 units across.
        assert!(catalog.has_jump(2, 2));
        assert!(catalog.has_jump(1, 1));
        assert!(!catalog.has_jump(1, 0));
        assert!(!catalog.has_jump(0, 0));
        assert!(!catalog.has_jump(3, 2));
        assert!(!catalog.has_jump(2, 3));
    }

    #[test]
    fn offsets_mirror_under_direction_flip() {
        let catalog = TrajectoryCatalog::from_profile(&PhysicsProfile::default());
        let right: Vec<IVec2> = catalog.fall_offsets(1).collect();
        let left: Vec<IVec2> = catalog.fall_offsets(-1).collect();
        assert_eq!(right.len(), left.len());
        for (r, l) in right.iter().zip(&left) {
            assert_eq!(r.x, -l.x);
            assert_eq!(r.y, l.y);
        }
        for o in catalog.jump_offsets(-1) {
            assert!(catalog.jump_offsets(1).any(|r| r == IVec2::new(-o.x, o.y)));
        }
    }

    #[test]
    fn landing_is_predicted_above_the_floor() {
        let mut map = Tilemap::new(10, 10, 16.0);
        for x in 0..10 {
            map.set(x, 0, TileType::Block);
        }
        let stoppable = OccupancyIndex::build(&map, |c| {
            let t = TileType::from_u8(c);
            t.is_block() || t.is_ledge()
        });
        let profile = PhysicsProfile::default();
        let start = Aabb::from_center(24.0, 100.0, 12.0, 14.0);
        let landed = predict_landing(
            &stoppable,
            16.0,
            start,
            Vec2::new(2.0, 0.0),
            |vy| profile.fall(vy),
            60,
        )
        .expect("falls onto the floor");
        assert!(landed.min_y >= 16.0);
        assert!(landed.min_y < 32.0);
        assert!(landed.min_x > start.min_x);
    }

    #[test]
    fn landing_beyond_horizon_is_untrackable() {
        let map = Tilemap::new(4, 40, 16.0);
        let stoppable = OccupancyIndex::build(&map, |c| TileType::from_u8(c).is_block());
        let start = Aabb::from_center(24.0, 600.0, 12.0, 14.0);
        let profile = PhysicsProfile::default();
        assert!(predict_landing(&stoppable, 16.0, start, Vec2::ZERO, |vy| profile.fall(vy), 5).is_none());
    }

    #[test]
    fn drifting_into_a_wall_is_untrackable() {
        let mut map = Tilemap::new(10, 10, 16.0);
        for x in 0..10 {
            map.set(x, 0, TileType::Block);
        }
        for y in 0..10 {
            map.set(3, y, TileType::Block);
        }
        let stoppable = OccupancyIndex::build(&map, |c| TileType::from_u8(c).is_block());
        let profile = PhysicsProfile::default();
        let start = Aabb::from_center(40.0, 88.0, 12.0, 14.0);
        let fall = |vy: f32| profile.fall(vy);
        assert!(predict_landing(&stoppable, 16.0, start, Vec2::new(4.0, 0.0), fall, 60).is_none());

        let away = predict_landing(&stoppable, 16.0, start, Vec2::new(-1.0, 0.0), fall, 60)
            .expect("lands beside the wall");
        assert!(away.min_y >= 16.0 && away.min_y < 32.0);
    }

    #[test]
    fn fast_falls_cover_every_row_they_pass() {
        let profile = PhysicsProfile {
            gravity: 20.0,
            max_fall_speed: 40.0,
            ..PhysicsProfile::default()
        };
        assert!(profile.validate().is_ok());
        let catalog = TrajectoryCatalog::from_profile(&profile);
        for drop in 0..=20 {
            assert!(catalog.has_fall(0, drop), "missing straight drop of {drop}");
        }
    }

    #[test]
    fn fast_jumps_cover_every_row_they_pass() {
        let profile = PhysicsProfile {
            jump_speed: 40.0,
            jump_hold_ticks: 1,
            gravity: 20.0,
            max_fall_speed: 40.0,
            ..PhysicsProfile::default()
        };
        let catalog = TrajectoryCatalog::from_profile(&profile);
        for rise in 1..=3 {
            assert!(catalog.has_jump(0, rise), "missing straight rise of {rise}");
        }
        assert!(!catalog.has_jump(0, 4));
    }

    #[test]
    fn invalid_profiles_are_rejected() {
        let mut profile = PhysicsProfile::default();
        assert!(profile.validate().is_ok());
        profile.gravity = 0.0;
        assert!(profile.validate().is_err());
    }
}
