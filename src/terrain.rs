use bevy::math::{IVec2, Vec2};

use crate::occupancy::{find_straight_path, Occupancy, OccupancyIndex, TileRect};
use crate::physics_core::Aabb;

/// Movement questions the planner and executor ask about the terrain.
///
/// Positions are body anchors: the bottom-left tile of the body.
pub trait Capabilities {
    fn body(&self) -> IVec2;

    fn tile_size(&self) -> f32;

    /// World-space center of a body anchored at `p`.
    fn body_center(&self, p: IVec2) -> Vec2 {
        (p.as_vec2() + self.body().as_vec2() * 0.5) * self.tile_size()
    }

    fn is_obstacle_at(&self, p: IVec2) -> bool;

    /// A body at `p` has support: it overlaps something climbable, or a
    /// stoppable or climbable tile lies right under it.
    fn is_supported(&self, p: IVec2) -> bool;

    fn can_occupy(&self, p: IVec2) -> bool {
        !self.is_obstacle_at(p)
    }

    fn can_stand(&self, p: IVec2) -> bool {
        self.can_occupy(p) && self.is_supported(p)
    }

    /// Walking destination check.
    fn can_move_to(&self, p: IVec2) -> bool {
        self.can_stand(p)
    }

    /// One tile up from `p`; the lower tile must be climbable.
    fn can_climb_up(&self, p: IVec2) -> bool;

    /// One tile down from `p`; the lower tile must be climbable.
    fn can_climb_down(&self, p: IVec2) -> bool;

    /// A fall from rest at `from` that lands at `to`.
    fn can_fall(&self, from: IVec2, to: IVec2) -> bool;

    /// A fall that continues from a jump's apex at `from` down to `to`.
    fn can_drop(&self, from: IVec2, to: IVec2) -> bool;

    /// A jump launched from `from` whose ascent ends at `tip`.
    fn can_jump(&self, from: IVec2, tip: IVec2) -> bool;

    /// Nothing stoppable between the current hitbox and a body at `tip`.
    fn has_clearance(&self, hitbox: &Aabb, tip: IVec2) -> bool;

    /// Detour-free tile path from `from` to `to` avoiding obstacles.
    fn straight_path(&self, from: IVec2, to: IVec2) -> Vec<IVec2>;
}

/// [`Capabilities`] backed by summed-area indices.
#[derive(Clone, Copy, Debug)]
pub struct TerrainProbe<'a> {
    pub occupancy: Occupancy<'a>,
    pub body: IVec2,
    pub tile_size: f32,
}

impl<'a> TerrainProbe<'a> {
    pub fn new(occupancy: Occupancy<'a>, body: IVec2, tile_size: f32) -> Self {
        Self {
            occupancy,
            body,
            tile_size,
        }
    }

    fn body_at(&self, p: IVec2) -> TileRect {
        TileRect::at(p, self.body)
    }

    fn row_below(&self, p: IVec2) -> TileRect {
        TileRect::new(p.x, p.y - 1, self.body.x, 1)
    }

    fn obstacle_tile(&self, x: i32, y: i32) -> bool {
        self.occupancy.obstacle.query(x, y, x + 1, y + 1) != 0
    }

    pub fn is_grounded_at(&self, p: IVec2) -> bool {
        self.occupancy.stoppable.exists(&self.row_below(p))
    }

    pub fn is_grabbing_at(&self, p: IVec2) -> bool {
        self.occupancy.grabbable.exists(&self.body_at(p))
    }

    fn stoppable(&self) -> &OccupancyIndex {
        self.occupancy.stoppable
    }

    /// Column just ahead of a body at `p` moving in direction `vx`.
    fn ahead_column(&self, p: IVec2, vx: i32) -> i32 {
        if vx > 0 {
            p.x + self.body.x
        } else {
            p.x - 1
        }
    }

    /// Jumping into a slot between two overhangs whose inner edge is open
    /// overhead cannot be reached by a rising arc.
    fn is_squeeze(&self, tip: IVec2, vx: i32) -> bool {
        if vx == 0 {
            return false;
        }
        let ax = self.ahead_column(tip, vx);
        let above = tip.y + self.body.y;
        self.obstacle_tile(ax, above)
            && self.obstacle_tile(ax, tip.y - 1)
            && !self.obstacle_tile(ax - vx, above)
    }
}

impl Capabilities for TerrainProbe<'_> {
    fn body(&self) -> IVec2 {
        self.body
    }

    fn tile_size(&self) -> f32 {
        self.tile_size
    }

    fn is_obstacle_at(&self, p: IVec2) -> bool {
        self.occupancy.obstacle.exists(&self.body_at(p))
    }

    fn is_supported(&self, p: IVec2) -> bool {
        let below = self.row_below(p);
        self.occupancy.grabbable.exists(&self.body_at(p))
            || self.occupancy.stoppable.exists(&below)
            || self.occupancy.grabbable.exists(&below)
    }

    fn can_climb_up(&self, p: IVec2) -> bool {
        self.is_grabbing_at(p) && self.can_occupy(p + IVec2::Y)
    }

    fn can_climb_down(&self, p: IVec2) -> bool {
        let lower = p - IVec2::Y;
        self.is_grabbing_at(lower) && self.can_occupy(lower)
    }

    fn can_fall(&self, from: IVec2, to: IVec2) -> bool {
        let dx = to.x - from.x;
        if dx == 0 || to.y > from.y || !self.can_stand(from) {
            return false;
        }
        // Columns the leading edge sweeps through on the way down.
        let (x0, x1) = if dx > 0 {
            (from.x + self.body.x, to.x + self.body.x)
        } else {
            (to.x, from.x)
        };
        let corridor = TileRect::new(x0, to.y, x1 - x0, from.y + self.body.y - to.y);
        !self.stoppable().exists(&corridor)
    }

    fn can_drop(&self, from: IVec2, to: IVec2) -> bool {
        if to.y > from.y || !self.can_occupy(from) {
            return false;
        }
        let x0 = from.x.min(to.x);
        let x1 = from.x.max(to.x) + self.body.x;
        let swept = TileRect::new(x0, to.y, x1 - x0, from.y + self.body.y - to.y);
        if self.occupancy.obstacle.exists(&swept) {
            return false;
        }
        let below = TileRect::new(x0, to.y, x1 - x0, from.y - to.y);
        !self.stoppable().exists(&below)
    }

    fn can_jump(&self, from: IVec2, tip: IVec2) -> bool {
        if tip.y < from.y || !self.can_occupy(from) || !self.can_occupy(tip) {
            return false;
        }
        if !self.is_grounded_at(from) || self.is_grabbing_at(from) {
            return false;
        }
        // The arc rises through the columns behind the tip.
        let vx = (tip.x - from.x).signum();
        let (x0, x1) = match vx {
            1 => (from.x, tip.x + self.body.x - 1),
            -1 => (tip.x + 1, from.x + self.body.x),
            _ => (from.x, from.x + self.body.x),
        };
        let swept = TileRect::new(x0, from.y, x1 - x0, tip.y + self.body.y - from.y);
        if self.stoppable().exists(&swept) {
            return false;
        }
        !self.is_squeeze(tip, vx)
    }

    fn has_clearance(&self, hitbox: &Aabb, tip: IVec2) -> bool {
        let swept = TileRect::covering(hitbox, self.tile_size).union(&self.body_at(tip));
        !self.stoppable().exists(&swept)
    }

    fn straight_path(&self, from: IVec2, to: IVec2) -> Vec<IVec2> {
        find_straight_path(self.occupancy.obstacle, from, to, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::TileRules;
    use crate::occupancy::OccupancyCache;
    use crate::tilemap::Tilemap;

    fn level(rows: &[&str]) -> Tilemap {
        Tilemap::from_ascii(rows, 16.0).expect("test level parses")
    }

    #[test]
    fn support_comes_from_ground_or_ladders() {
        let map = level(&[
            "......",
            "..H...",
            "..H.=.",
            "######",
        ]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        assert!(probe.can_stand(IVec2::new(0, 1)));
        assert!(!probe.can_stand(IVec2::new(0, 2)));
        assert!(probe.can_stand(IVec2::new(2, 2)));
        // Top of the ladder.
        assert!(probe.can_stand(IVec2::new(2, 3)));
        // On the ledge.
        assert!(probe.can_stand(IVec2::new(4, 2)));
        assert!(!probe.can_occupy(IVec2::new(0, 0)));
    }

    #[test]
    fn spikes_block_bodies_like_walls() {
        let map = level(&[
            "......",
            "..^...",
            "######",
        ]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        assert!(!probe.can_occupy(IVec2::new(2, 1)));
        assert!(probe.can_stand(IVec2::new(2, 2)));
        assert!(probe.can_stand(IVec2::new(1, 1)));
    }

    #[test]
    fn climbing_needs_the_lower_tile_to_be_a_ladder() {
        let map = level(&[
            "....",
            ".H..",
            ".H..",
            "####",
        ]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        assert!(probe.can_climb_up(IVec2::new(1, 1)));
        assert!(probe.can_climb_up(IVec2::new(1, 2)));
        assert!(!probe.can_climb_up(IVec2::new(1, 3)));
        assert!(probe.can_climb_down(IVec2::new(1, 3)));
        assert!(!probe.can_climb_down(IVec2::new(1, 1)));
        assert!(!probe.can_climb_up(IVec2::new(2, 1)));
    }

    #[test]
    fn falls_are_blocked_by_stoppable_tiles_in_the_corridor() {
        let open = level(&[
            "......",
            "##....",
            "......",
            "######",
        ]);
        let walled = level(&[
            "......",
            "##.=..",
            "......",
            "######",
        ]);
        let mut cache = OccupancyCache::new(TileRules::default());
        {
            let probe = TerrainProbe::new(cache.prepare(&open), IVec2::ONE, 16.0);
            assert!(probe.can_fall(IVec2::new(1, 3), IVec2::new(3, 1)));
            assert!(!probe.can_fall(IVec2::new(1, 3), IVec2::new(1, 1)));
        }
        let probe = TerrainProbe::new(cache.prepare(&walled), IVec2::ONE, 16.0);
        assert!(!probe.can_fall(IVec2::new(1, 3), IVec2::new(3, 1)));
        assert!(probe.can_fall(IVec2::new(1, 3), IVec2::new(2, 1)));
    }

    #[test]
    fn drops_cannot_pass_through_walls() {
        let map = level(&["....", ".#..", "####"]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        assert!(!probe.can_drop(IVec2::new(0, 1), IVec2::new(2, 1)));
        assert!(probe.can_drop(IVec2::new(0, 2), IVec2::new(1, 2)));
        assert!(probe.can_drop(IVec2::new(2, 2), IVec2::new(3, 1)));
    }

    #[test]
    fn jumps_launch_from_solid_ground_only() {
        let map = level(&[
            "......",
            "......",
            "....##",
            ".H....",
            "######",
        ]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        assert!(probe.can_jump(IVec2::new(3, 1), IVec2::new(4, 3)));
        assert!(!probe.can_jump(IVec2::new(1, 1), IVec2::new(2, 3)));
        assert!(!probe.can_jump(IVec2::new(3, 2), IVec2::new(4, 3)));
        assert!(!probe.can_jump(IVec2::new(3, 1), IVec2::new(4, 2)));
    }

    #[test]
    fn squeezing_between_overhangs_is_rejected() {
        let map = level(&[
            "......",
            "...#..",
            "......",
            "...#..",
            "......",
            "######",
        ]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        assert!(!probe.can_jump(IVec2::new(1, 1), IVec2::new(2, 3)));
        assert!(probe.can_jump(IVec2::new(1, 1), IVec2::new(1, 3)));
    }

    #[test]
    fn clearance_checks_the_swept_column() {
        let map = level(&[
            "....",
            "..=.",
            "....",
            "####",
        ]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        let standing = Aabb::from_center(8.0, 23.0, 12.0, 14.0);
        assert!(probe.has_clearance(&standing, IVec2::new(0, 3)));
        let under_ledge = Aabb::from_center(40.0, 23.0, 12.0, 14.0);
        assert!(!probe.has_clearance(&under_ledge, IVec2::new(2, 3)));
    }
}
