use bevy::math::IVec2;

use crate::components::{TileClass, TileRules};
use crate::physics_core::Aabb;
use crate::tilemap::Tilemap;

/// Half-open rectangle of tiles: `[x, x + width) × [y, y + height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct TileRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl TileRect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Body rectangle of a `size.x × size.y` actor anchored at tile `p`.
    pub fn at(p: IVec2, size: IVec2) -> Self {
        Self::new(p.x, p.y, size.x, size.y)
    }

    /// Tiles touched by `aabb`; edges lying exactly on a tile boundary do not
    /// count as touching the next tile.
    pub fn covering(aabb: &Aabb, tile_size: f32) -> Self {
        let x0 = (aabb.min_x / tile_size).floor() as i32;
        let y0 = (aabb.min_y / tile_size).floor() as i32;
        let x1 = (aabb.max_x / tile_size).ceil() as i32;
        let y1 = (aabb.max_y / tile_size).ceil() as i32;
        Self::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn top(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn inflate(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.x - dx,
            self.y - dy,
            self.width + dx * 2,
            self.height + dy * 2,
        )
    }

    pub fn union(&self, other: &TileRect) -> Self {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.top().max(other.top());
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Intersection with `bounds`; empty rectangles come back with zero size.
    pub fn clamp_to(&self, bounds: &TileRect) -> Self {
        let x0 = self.x.max(bounds.x);
        let y0 = self.y.max(bounds.y);
        let x1 = self.right().min(bounds.right());
        let y1 = self.top().min(bounds.top());
        Self::new(x0, y0, (x1 - x0).max(0), (y1 - y0).max(0))
    }

    pub fn contains(&self, p: IVec2) -> bool {
        self.x <= p.x && p.x < self.right() && self.y <= p.y && p.y < self.top()
    }
}

/// Summed-area table counting tiles that match one predicate.
///
/// `data[(y * (width + 1)) + x]` holds the count over `[0, x) × [0, y)`.
#[derive(Clone, Debug)]
pub struct OccupancyIndex {
    width: i32,
    height: i32,
    data: Vec<u32>,
}

impl OccupancyIndex {
    pub fn build(tilemap: &Tilemap, predicate: impl Fn(u8) -> bool) -> Self {
        let width = tilemap.width as i32;
        let height = tilemap.height as i32;
        let stride = tilemap.width + 1;
        let mut data = vec![0u32; stride * (tilemap.height + 1)];
        for y in 0..height {
            let mut run = 0u32;
            for x in 0..width {
                if predicate(tilemap.get_tile(x, y)) {
                    run += 1;
                }
                let below = data[y as usize * stride + x as usize + 1];
                data[(y as usize + 1) * stride + x as usize + 1] = below + run;
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    fn at(&self, x: i32, y: i32) -> u32 {
        self.data[y as usize * (self.width as usize + 1) + x as usize]
    }

    /// Number of matching tiles in `[x0, x1) × [y0, y1)`. Corners may be given
    /// in either order and are clamped to the grid.
    pub fn query(&self, x0: i32, y0: i32, x1: i32, y1: i32) -> u32 {
        let (x0, x1) = (x0.min(x1), x0.max(x1));
        let (y0, y1) = (y0.min(y1), y0.max(y1));
        let x0 = x0.clamp(0, self.width);
        let x1 = x1.clamp(0, self.width);
        let y0 = y0.clamp(0, self.height);
        let y1 = y1.clamp(0, self.height);
        self.at(x1, y1) + self.at(x0, y0) - self.at(x0, y1) - self.at(x1, y0)
    }

    pub fn count(&self, rect: &TileRect) -> u32 {
        self.query(rect.x, rect.y, rect.right(), rect.top())
    }

    pub fn exists(&self, rect: &TileRect) -> bool {
        self.count(rect) != 0
    }
}

#[derive(Clone, Debug)]
struct Stamped {
    generation: u64,
    index: OccupancyIndex,
}

/// Lazily built indices for each [`TileClass`], rebuilt when the tilemap
/// contents no longer match the stamp. Any edit, or a different map, counts.
#[derive(Clone, Debug, Default)]
pub struct OccupancyCache {
    rules: TileRules,
    slots: [Option<Stamped>; 3],
}

fn slot_of(class: TileClass) -> usize {
    match class {
        TileClass::Obstacle => 0,
        TileClass::Stoppable => 1,
        TileClass::Grabbable => 2,
    }
}

impl OccupancyCache {
    pub fn new(rules: TileRules) -> Self {
        Self {
            rules,
            slots: [None, None, None],
        }
    }

    pub fn rules(&self) -> &TileRules {
        &self.rules
    }

    pub fn is_current(&self, class: TileClass, tilemap: &Tilemap) -> bool {
        self.slots[slot_of(class)]
            .as_ref()
            .is_some_and(|s| s.generation == tilemap.generation())
    }

    pub fn get(&mut self, class: TileClass, tilemap: &Tilemap) -> &OccupancyIndex {
        let rules = self.rules;
        refresh(&mut self.slots[slot_of(class)], rules, class, tilemap)
    }

    pub fn invalidate(&mut self) {
        self.slots = [None, None, None];
    }

    /// Brings all three indices up to date and borrows them for one pass.
    pub fn prepare(&mut self, tilemap: &Tilemap) -> Occupancy<'_> {
        let rules = self.rules;
        let [obstacle, stoppable, grabbable] = &mut self.slots;
        Occupancy {
            obstacle: refresh(obstacle, rules, TileClass::Obstacle, tilemap),
            stoppable: refresh(stoppable, rules, TileClass::Stoppable, tilemap),
            grabbable: refresh(grabbable, rules, TileClass::Grabbable, tilemap),
        }
    }
}

fn refresh<'a>(
    slot: &'a mut Option<Stamped>,
    rules: TileRules,
    class: TileClass,
    tilemap: &Tilemap,
) -> &'a OccupancyIndex {
    let stale = slot
        .as_ref()
        .map_or(true, |s| s.generation != tilemap.generation());
    if stale {
        *slot = None;
    }
    let stamped = slot.get_or_insert_with(|| Stamped {
        generation: tilemap.generation(),
        index: OccupancyIndex::build(tilemap, |code| rules.matches(class, code)),
    });
    &stamped.index
}

#[derive(Clone, Copy, Debug)]
pub struct Occupancy<'a> {
    pub obstacle: &'a OccupancyIndex,
    pub stoppable: &'a OccupancyIndex,
    pub grabbable: &'a OccupancyIndex,
}

impl<'a> Occupancy<'a> {
    pub fn get(&self, class: TileClass) -> &'a OccupancyIndex {
        match class {
            TileClass::Obstacle => self.obstacle,
            TileClass::Stoppable => self.stoppable,
            TileClass::Grabbable => self.grabbable,
        }
    }
}

#[derive(Clone, Copy)]
struct PathCell {
    cost: i32,
    prev: Option<(usize, usize)>,
}

/// Monotone path from `from` to `to` that only ever steps toward the goal.
///
/// Each cell of the bounding box picks the cheaper of its x or y predecessor;
/// a cell whose body overlaps `blocked` has no predecessor and costs
/// `2(w + h + 1)`. Tracing stops at the first cell without a predecessor, so a
/// blocked goal yields just the goal. Returned start to goal.
pub fn find_straight_path(
    blocked: &OccupancyIndex,
    from: IVec2,
    to: IVec2,
    body: IVec2,
) -> Vec<IVec2> {
    let w = (to.x - from.x).unsigned_abs() as usize;
    let h = (to.y - from.y).unsigned_abs() as usize;
    let inf = ((w + h + 1) * 2) as i32;
    let vx = if from.x <= to.x { 1 } else { -1 };
    let vy = if from.y <= to.y { 1 } else { -1 };

    let mut grid: Vec<Vec<PathCell>> = Vec::with_capacity(h + 1);
    for dy in 0..=h {
        let mut row = Vec::with_capacity(w + 1);
        let y = from.y + dy as i32 * vy;
        for dx in 0..=w {
            let x = from.x + dx as i32 * vx;
            let cell = if dx == 0 && dy == 0 {
                PathCell { cost: 0, prev: None }
            } else {
                let mut cost = inf;
                let mut prev = None;
                if !blocked.exists(&TileRect::at(IVec2::new(x, y), body)) {
                    if dx > 0 {
                        let left: &PathCell = &row[dx - 1];
                        if left.cost < cost {
                            cost = left.cost;
                            prev = Some((dy, dx - 1));
                        }
                    }
                    if dy > 0 && grid[dy - 1][dx].cost < cost {
                        cost = grid[dy - 1][dx].cost;
                        prev = Some((dy - 1, dx));
                    }
                }
                PathCell {
                    cost: cost + 1,
                    prev,
                }
            };
            row.push(cell);
        }
        grid.push(row);
    }

    let mut path = Vec::new();
    let mut cursor = Some((h, w));
    while let Some((dy, dx)) = cursor {
        path.push(IVec2::new(
            from.x + dx as i32 * vx,
            from.y + dy as i32 * vy,
        ));
        cursor = grid[dy][dx].prev;
    }
    path.reverse();
    path
}
