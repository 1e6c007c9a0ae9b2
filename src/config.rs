use crate::actor::PursuitConfig;
use crate::tilemap::Tilemap;
use crate::trajectory::PhysicsProfile;

pub const DEFAULT_CONFIG_PATH: &str = "pursuit.json";
pub const DEFAULT_TICKS: u32 = 600;

/// Level baked in at build time from `PURSUIT_EMBED_LEVEL_PATH`; empty when
/// none was given.
pub const EMBEDDED_LEVEL: &str =
    include_str!(concat!(env!("OUT_DIR"), "/pursuit_embedded_level.txt"));

/// Everything the demo reads from `pursuit.json`.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct PursuitFileConfig {
    pub physics: PhysicsProfile,
    pub pursuit: PursuitConfig,
    /// ASCII level rows, top row first.
    pub level: Option<Vec<String>>,
    /// Fixed ticks to simulate before exiting.
    pub ticks: Option<u32>,
}

impl PursuitFileConfig {
    pub fn ticks(&self) -> u32 {
        self.ticks.unwrap_or(DEFAULT_TICKS)
    }

    pub fn level(&self) -> Option<Result<Tilemap, String>> {
        let rows = self.level.as_ref()?;
        let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
        Some(Tilemap::from_ascii(&rows, self.physics.tile_size))
    }
}

pub fn config_path() -> String {
    std::env::var("PURSUIT_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

pub fn parse_config(contents: &str) -> Result<PursuitFileConfig, String> {
    let config: PursuitFileConfig =
        serde_json::from_str(contents).map_err(|e| format!("invalid config JSON: {e}"))?;
    config
        .physics
        .validate()
        .map_err(|e| format!("invalid physics: {e}"))?;
    if config.pursuit.search_radius < 0 {
        return Err(format!(
            "search_radius must not be negative, got {}",
            config.pursuit.search_radius
        ));
    }
    Ok(config)
}

/// Reads the config file, falling back to defaults when it is missing or
/// unreadable.
pub fn load_config() -> PursuitFileConfig {
    let path = config_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => match parse_config(&contents) {
            Ok(cfg) => {
                println!("[Pursuit] Loaded config from {}", path);
                cfg
            }
            Err(e) => {
                eprintln!("[Pursuit] Failed to parse {}: {}", path, e);
                PursuitFileConfig::default()
            }
        },
        Err(_) => PursuitFileConfig::default(),
    }
}

/// Parses a level stored as plain text, one row per line. Blank lines are
/// ignored; `None` when the text holds no rows at all.
pub fn parse_level_text(text: &str, tile_size: f32) -> Option<Result<Tilemap, String>> {
    let rows: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(Tilemap::from_ascii(&rows, tile_size))
}

pub fn embedded_level(tile_size: f32) -> Option<Result<Tilemap, String>> {
    parse_level_text(EMBEDDED_LEVEL, tile_size)
}
