use crate::components::{TileClass, TileRules};
use crate::tilemap::Tilemap;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Aabb {
    pub fn from_center(x: f32, y: f32, width: f32, height: f32) -> Self {
        let hw = width / 2.0;
        let hh = height / 2.0;
        Self {
            min_x: x - hw,
            min_y: y - hh,
            max_x: x + hw,
            max_y: y + hh,
        }
    }

    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self {
            min_x: self.min_x + dx,
            min_y: self.min_y + dy,
            max_x: self.max_x + dx,
            max_y: self.max_y + dy,
        }
    }

    pub fn center_x(&self) -> f32 {
        (self.min_x + self.max_x) * 0.5
    }

    pub fn center_y(&self) -> f32 {
        (self.min_y + self.max_y) * 0.5
    }

    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    pub fn union(&self, other: &Aabb) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MotionResult {
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct MotionParams {
    pub tile_size: f32,
    pub dt: f32,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Copy)]
struct LandingProbe {
    x: f32,
    prev_y: f32,
    new_y: f32,
    width: f32,
    height: f32,
    tile_size: f32,
}

/// Moves a box through the tilemap, x axis first. Obstacles are solid on
/// every side; stoppable tiles that are not obstacles act as one-way ledges
/// and only stop a box that was above them before the step.
pub fn resolve_motion(
    tilemap: &Tilemap,
    rules: &TileRules,
    params: MotionParams,
) -> MotionResult {
    let MotionParams {
        tile_size,
        dt,
        x,
        y,
        vx,
        vy,
        width,
        height,
    } = params;
    let mut out_x = x;
    let mut out_y = y;
    let mut out_vx = vx;
    let mut out_vy = vy;

    let dx = vx * dt;
    let dy = vy * dt;

    let new_x = out_x + dx;
    let x_aabb = Aabb::from_center(new_x, out_y, width, height);
    if !collides_obstacle(tilemap, rules, &x_aabb, tile_size) {
        out_x = new_x;
    } else {
        if dx > 0.0 {
            let tile_x = (x_aabb.max_x / tile_size).floor() as i32;
            out_x = tile_x as f32 * tile_size - width / 2.0 - 0.01;
        } else if dx < 0.0 {
            let tile_x = (x_aabb.min_x / tile_size).floor() as i32;
            out_x = (tile_x + 1) as f32 * tile_size + width / 2.0 + 0.01;
        }
        out_vx = 0.0;
    }

    let new_y = out_y + dy;
    let y_aabb = Aabb::from_center(out_x, new_y, width, height);
    let ledge_landing = if dy < 0.0 {
        find_ledge_landing(
            tilemap,
            rules,
            LandingProbe {
                x: out_x,
                prev_y: out_y,
                new_y,
                width,
                height,
                tile_size,
            },
        )
    } else {
        None
    };

    if !collides_obstacle(tilemap, rules, &y_aabb, tile_size) && ledge_landing.is_none() {
        out_y = new_y;
    } else {
        if dy < 0.0 {
            let tile_y = (y_aabb.min_y / tile_size).floor() as i32;
            let block_top = (tile_y + 1) as f32 * tile_size + height / 2.0;
            out_y = match ledge_landing {
                Some(ledge_y) if !collides_obstacle(tilemap, rules, &y_aabb, tile_size) => ledge_y,
                Some(ledge_y) => ledge_y.max(block_top),
                None => block_top,
            };
        } else if dy > 0.0 {
            let tile_y = (y_aabb.max_y / tile_size).floor() as i32;
            out_y = tile_y as f32 * tile_size - height / 2.0 - 0.01;
        }
        out_vy = 0.0;
    }

    MotionResult {
        x: out_x,
        y: out_y,
        vx: out_vx,
        vy: out_vy,
    }
}

/// True when a stoppable tile lies directly under the box.
pub fn compute_grounded(
    tilemap: &Tilemap,
    rules: &TileRules,
    tile_size: f32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
) -> bool {
    let check_y = y - height / 2.0 - 0.5;
    let left_x = x - width / 2.0 + 0.01;
    let right_x = x + width / 2.0 - 0.01;

    let left_tile_x = (left_x / tile_size).floor() as i32;
    let right_tile_x = (right_x / tile_size).floor() as i32;
    let tile_y = (check_y / tile_size).floor() as i32;

    (left_tile_x..=right_tile_x)
        .any(|tx| rules.matches(TileClass::Stoppable, tilemap.get_tile(tx, tile_y)))
}

/// True while the box overlaps a grabbable tile.
pub fn is_holding(tilemap: &Tilemap, rules: &TileRules, aabb: &Aabb, tile_size: f32) -> bool {
    overlaps_class(tilemap, rules, aabb, tile_size, TileClass::Grabbable)
}

pub fn collides_obstacle(
    tilemap: &Tilemap,
    rules: &TileRules,
    aabb: &Aabb,
    tile_size: f32,
) -> bool {
    overlaps_class(tilemap, rules, aabb, tile_size, TileClass::Obstacle)
}

pub fn overlaps_class(
    tilemap: &Tilemap,
    rules: &TileRules,
    aabb: &Aabb,
    tile_size: f32,
    class: TileClass,
) -> bool {
    overlapping_tiles(aabb, tile_size)
        .any(|(tx, ty)| rules.matches(class, tilemap.get_tile(tx, ty)))
}

/// Stoppable but passable: lands a box falling onto it and nothing else.
fn is_one_way(rules: &TileRules, code: u8) -> bool {
    rules.matches(TileClass::Stoppable, code) && !rules.matches(TileClass::Obstacle, code)
}

fn overlapping_tiles(aabb: &Aabb, tile_size: f32) -> impl Iterator<Item = (i32, i32)> {
    let min_tx = (aabb.min_x / tile_size).floor() as i32;
    let max_tx = ((aabb.max_x - 0.01) / tile_size).floor() as i32;
    let min_ty = (aabb.min_y / tile_size).floor() as i32;
    let max_ty = ((aabb.max_y - 0.01) / tile_size).floor() as i32;
    (min_ty..=max_ty).flat_map(move |ty| (min_tx..=max_tx).map(move |tx| (tx, ty)))
}

fn find_ledge_landing(
    tilemap: &Tilemap,
    rules: &TileRules,
    probe: LandingProbe,
) -> Option<f32> {
    let LandingProbe {
        x,
        prev_y,
        new_y,
        width,
        height,
        tile_size,
    } = probe;
    let prev_bottom = prev_y - height / 2.0;
    let new_bottom = new_y - height / 2.0;
    if prev_bottom <= new_bottom {
        return None;
    }

    let left_x = x - width / 2.0 + 0.01;
    let right_x = x + width / 2.0 - 0.01;
    let left_tile_x = (left_x / tile_size).floor() as i32;
    let right_tile_x = (right_x / tile_size).floor() as i32;
    let min_ty = (new_bottom / tile_size).floor() as i32;
    let max_ty = ((prev_bottom - 0.01) / tile_size).floor() as i32;

    let mut best_top: Option<f32> = None;
    for ty in min_ty..=max_ty {
        let ledge_top = (ty + 1) as f32 * tile_size;
        if prev_bottom < ledge_top - 0.01 || new_bottom > ledge_top {
            continue;
        }
        for tx in left_tile_x..=right_tile_x {
            if is_one_way(rules, tilemap.get_tile(tx, ty)) {
                best_top = Some(best_top.map_or(ledge_top, |curr| curr.max(ledge_top)));
            }
        }
    }
    best_top.map(|top| top + height / 2.0)
}
