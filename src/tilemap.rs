use std::sync::atomic::{AtomicU64, Ordering};

use bevy::prelude::*;

use crate::components::TileType;
use crate::occupancy::TileRect;
use crate::physics_core::Aabb;

pub struct TilemapPlugin {
    pub level: Tilemap,
}

impl Plugin for TilemapPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.level.clone());
    }
}

#[derive(Resource, Clone, Debug)]
pub struct Tilemap {
    pub width: usize,
    pub height: usize,
    /// Row-major, row 0 is the bottom row.
    pub tiles: Vec<u8>,
    pub tile_size: f32,
    /// Count of cell edits made to this map.
    pub revision: u64,
    /// Process-unique stamp of the current contents, renewed on every cell
    /// edit. Two maps never share one unless one is a clone of the other.
    generation: u64,
    pub chaser_spawn: Option<IVec2>,
    pub target_spawn: Option<IVec2>,
}

impl Default for Tilemap {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            tiles: Vec::new(),
            tile_size: 16.0,
            revision: 0,
            generation: next_generation(),
            chaser_spawn: None,
            target_spawn: None,
        }
    }
}

static GENERATION: AtomicU64 = AtomicU64::new(1);

fn next_generation() -> u64 {
    GENERATION.fetch_add(1, Ordering::Relaxed)
}

impl Tilemap {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn new(width: usize, height: usize, tile_size: f32) -> Self {
        Self {
            width,
            height,
            tiles: vec![TileType::Empty as u8; width * height],
            tile_size,
            ..Default::default()
        }
    }

    /// Parses a level drawn top row first.
    ///
    /// `.` or space is empty, `#` block, `H` ladder, `=` ledge, `^` spike,
    /// `P` marks the chaser spawn and `T` the target spawn (both empty cells).
    pub fn from_ascii(rows: &[&str], tile_size: f32) -> Result<Self, String> {
        let height = rows.len();
        if height == 0 {
            return Err("level has no rows".to_string());
        }
        let width = rows[0].chars().count();
        if width == 0 {
            return Err("level has an empty first row".to_string());
        }

        let mut map = Tilemap::new(width, height, tile_size);
        for (line_index, line) in rows.iter().enumerate() {
            if line.chars().count() != width {
                return Err(format!(
                    "row {line_index} has {} columns, expected {width}",
                    line.chars().count()
                ));
            }
            let y = (height - 1 - line_index) as i32;
            for (x, ch) in line.chars().enumerate() {
                let x = x as i32;
                let tile = match ch {
                    '.' | ' ' => TileType::Empty,
                    '#' => TileType::Block,
                    'H' => TileType::Ladder,
                    '=' => TileType::Ledge,
                    '^' => TileType::Spike,
                    'P' => {
                        map.chaser_spawn = Some(IVec2::new(x, y));
                        TileType::Empty
                    }
                    'T' => {
                        map.target_spawn = Some(IVec2::new(x, y));
                        TileType::Empty
                    }
                    other => {
                        return Err(format!("unknown tile '{other}' at column {x}, row {line_index}"))
                    }
                };
                map.tiles[y as usize * width + x as usize] = tile as u8;
            }
        }
        Ok(map)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32
    }

    pub fn get_tile(&self, x: i32, y: i32) -> u8 {
        if !self.in_bounds(x, y) {
            return TileType::Empty as u8;
        }
        self.tiles[y as usize * self.width + x as usize]
    }

    pub fn get(&self, x: i32, y: i32) -> TileType {
        TileType::from_u8(self.get_tile(x, y))
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile_id: u8) {
        if !self.in_bounds(x, y) {
            return;
        }
        let index = y as usize * self.width + x as usize;
        if self.tiles[index] != tile_id {
            self.tiles[index] = tile_id;
            self.revision = self.revision.wrapping_add(1);
            self.generation = next_generation();
        }
    }

    pub fn set(&mut self, x: i32, y: i32, tile: TileType) {
        self.set_tile(x, y, tile as u8);
    }

    pub fn is_block(&self, x: i32, y: i32) -> bool {
        self.get(x, y).is_block()
    }

    pub fn bounds(&self) -> TileRect {
        TileRect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn world_to_tile(&self, p: Vec2) -> IVec2 {
        IVec2::new(
            (p.x / self.tile_size).floor() as i32,
            (p.y / self.tile_size).floor() as i32,
        )
    }

    pub fn tile_center(&self, tile: IVec2) -> Vec2 {
        Vec2::new(
            (tile.x as f32 + 0.5) * self.tile_size,
            (tile.y as f32 + 0.5) * self.tile_size,
        )
    }

    pub fn tile_rect_of(&self, aabb: &Aabb) -> TileRect {
        TileRect::covering(aabb, self.tile_size)
    }

    /// Small level used by the demo binary when nothing else is configured.
    pub fn demo_level() -> Self {
        let rows = [
            "......................",
            "..............####....",
            "......=====.......H...",
            ".............T....H...",
            "..######.....######...",
            "..H...................",
            "..H........===........",
            "..H...................",
            ".P....................",
            "######...#############",
        ];
        match Tilemap::from_ascii(&rows, 16.0) {
            Ok(map) => map,
            Err(_) => Tilemap::new(22, 10, 16.0),
        }
    }
}
