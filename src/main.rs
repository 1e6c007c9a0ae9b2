use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;

use pursuit::ai::{chaser_bundle, target_bundle, AiPlugin};
use pursuit::components::{ChaseTarget, GamePosition, PatrolRoute, PlanStatus, TileRules};
use pursuit::config::{embedded_level, load_config, PursuitFileConfig};
use pursuit::physics::PhysicsPlugin;
use pursuit::tilemap::{Tilemap, TilemapPlugin};

const TICK_HZ: f64 = 60.0;

fn choose_level(config: &PursuitFileConfig) -> Result<Tilemap, String> {
    let ts = config.physics.tile_size;
    if let Some(level) = config.level() {
        println!("[Pursuit] Using level from config");
        return level;
    }
    if let Some(level) = embedded_level(ts) {
        println!("[Pursuit] Using embedded level");
        return level.map_err(|e| format!("embedded level: {e}"));
    }
    let mut level = Tilemap::demo_level();
    level.tile_size = ts;
    Ok(level)
}

fn run(config: PursuitFileConfig) -> Result<(), String> {
    let level = choose_level(&config)?;
    let chaser_tile = level
        .chaser_spawn
        .ok_or_else(|| "level has no chaser spawn ('P')".to_string())?;
    let target_tile = level
        .target_spawn
        .ok_or_else(|| "level has no target spawn ('T')".to_string())?;
    println!(
        "[Pursuit] Level {}x{}, chaser at {chaser_tile}, target at {target_tile}",
        level.width, level.height
    );

    let rules = TileRules::default();
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .add_plugins(bevy::log::LogPlugin::default())
        .insert_resource(Time::<Fixed>::from_hz(TICK_HZ))
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(
            1.0 / TICK_HZ,
        )))
        .insert_resource(config.physics.clone())
        .insert_resource(rules)
        .add_plugins(TilemapPlugin {
            level: level.clone(),
        })
        .add_plugins(PhysicsPlugin)
        .add_plugins(AiPlugin);

    let ts = level.tile_size;
    let target = app
        .world_mut()
        .spawn((
            target_bundle(&level, target_tile),
            PatrolRoute {
                min_x: (target_tile.x - 3) as f32 * ts,
                max_x: (target_tile.x + 4) as f32 * ts,
                heading: config.physics.speed * 0.5,
            },
        ))
        .id();
    let chaser = app
        .world_mut()
        .spawn((
            chaser_bundle(&level, chaser_tile, &config.physics, &config.pursuit, &rules),
            ChaseTarget(target),
        ))
        .id();

    app.finish();
    app.cleanup();

    let ticks = config.ticks();
    let mut last_status = PlanStatus::Idle;
    for tick in 0..ticks {
        app.update();
        let status = app
            .world()
            .get::<PlanStatus>(chaser)
            .copied()
            .unwrap_or_default();
        if status != last_status {
            println!("[Pursuit] tick {tick}: {last_status:?} -> {status:?}");
            last_status = status;
        }
    }

    let world = app.world();
    let tile_of = |entity: Entity| {
        world
            .get::<GamePosition>(entity)
            .map(|p| level.world_to_tile(Vec2::new(p.x, p.y)))
    };
    println!(
        "[Pursuit] Finished {ticks} ticks: chaser {:?}, target {:?}, status {last_status:?}",
        tile_of(chaser),
        tile_of(target)
    );
    Ok(())
}

fn main() {
    let config = load_config();
    if let Err(e) = run(config) {
        eprintln!("[Pursuit] {e}");
        std::process::exit(2);
    }
}
