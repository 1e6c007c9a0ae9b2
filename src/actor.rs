use bevy::prelude::*;

use crate::components::TileRules;
use crate::executor::{MotionIntent, PlanExecutor};
use crate::occupancy::{OccupancyCache, TileRect};
use crate::physics_core::Aabb;
use crate::planner::{MotionPlanner, PlanLimits};
use crate::terrain::{Capabilities, TerrainProbe};
use crate::tilemap::Tilemap;
use crate::trajectory::{predict_landing, PhysicsProfile, TrajectoryCatalog};

/// What a planning actor needs from the body it steers.
pub trait MovementHost {
    fn hitbox(&self) -> Aabb;
    fn grid_pos(&self) -> IVec2;
    fn is_landed(&self) -> bool;
    fn is_holding(&self) -> bool;
    /// Whether the hitbox could be displaced by `offset` without hitting an
    /// obstacle.
    fn is_movable(&self, offset: Vec2) -> bool;
    fn move_toward(&mut self, target: Vec2);
    fn jump(&mut self);
    fn halt(&mut self);
}

/// A snapshot of the entity being chased.
#[derive(Clone, Copy, Debug)]
pub struct TargetObservation {
    pub hitbox: Aabb,
    pub velocity: Vec2,
    pub landed: bool,
}

#[derive(Resource, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PursuitConfig {
    /// Tiles around the goal the search may visit.
    pub search_radius: i32,
    pub max_cost: u32,
    pub max_expansions: u32,
    /// Ticks one plan step may take before the plan is dropped.
    pub timeout_ticks: u32,
    /// Ticks an airborne target is extrapolated to find its landing spot.
    pub landing_horizon: u32,
    pub body_width: i32,
    pub body_height: i32,
}

impl Default for PursuitConfig {
    fn default() -> Self {
        Self {
            search_radius: 10,
            max_cost: 200,
            max_expansions: 1000,
            timeout_ticks: 120,
            landing_horizon: 20,
            body_width: 1,
            body_height: 1,
        }
    }
}

impl PursuitConfig {
    pub fn body(&self) -> IVec2 {
        IVec2::new(self.body_width.max(1), self.body_height.max(1))
    }

    pub fn limits(&self) -> PlanLimits {
        PlanLimits {
            max_cost: self.max_cost,
            max_expansions: self.max_expansions,
        }
    }
}

/// Outcome of one [`PlanningActor::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PursuitTick {
    /// No target, or the target is airborne beyond the landing horizon with
    /// no plan running.
    Idle,
    /// Already standing on the goal tile.
    Arrived,
    /// A plan is running.
    Following,
    /// The running plan ended this tick.
    Finished,
    /// No plan reaches the current goal.
    Unreachable,
}

/// Chases a target by planning over the tilemap and steering a
/// [`MovementHost`] along the plan.
pub struct PlanningActor {
    profile: PhysicsProfile,
    config: PursuitConfig,
    cache: OccupancyCache,
    planner: MotionPlanner,
    runner: Option<PlanExecutor>,
    intents: Vec<MotionIntent>,
}

impl PlanningActor {
    pub fn new(profile: PhysicsProfile, config: PursuitConfig, rules: TileRules) -> Self {
        let catalog = TrajectoryCatalog::from_profile(&profile);
        Self {
            profile,
            config,
            cache: OccupancyCache::new(rules),
            planner: MotionPlanner::new(catalog),
            runner: None,
            intents: Vec::new(),
        }
    }

    pub fn profile(&self) -> &PhysicsProfile {
        &self.profile
    }

    pub fn config(&self) -> &PursuitConfig {
        &self.config
    }

    pub fn rules(&self) -> &TileRules {
        self.cache.rules()
    }

    pub fn planner(&self) -> &MotionPlanner {
        &self.planner
    }

    pub fn runner(&self) -> Option<&PlanExecutor> {
        self.runner.as_ref()
    }

    pub fn is_following(&self) -> bool {
        self.runner.is_some()
    }

    /// Forgets cached terrain; the next update rebuilds it from scratch.
    pub fn invalidate_terrain(&mut self) {
        self.cache.invalidate();
    }

    /// Drops the running plan, if any, and stops the host.
    pub fn stop_plan(&mut self, host: &mut impl MovementHost) {
        end_plan(&mut self.runner, host);
    }

    pub fn update(
        &mut self,
        tilemap: &Tilemap,
        host: &mut impl MovementHost,
        target: Option<&TargetObservation>,
    ) -> PursuitTick {
        let Some(target) = target else {
            return PursuitTick::Idle;
        };
        let body = self.config.body();
        let occupancy = self.cache.prepare(tilemap);
        let probe = TerrainProbe::new(occupancy, body, tilemap.tile_size);

        let landing = if target.landed {
            Some(target.hitbox)
        } else {
            let profile = &self.profile;
            predict_landing(
                occupancy.stoppable,
                tilemap.tile_size,
                target.hitbox,
                target.velocity,
                |vy| profile.fall(vy),
                self.config.landing_horizon,
            )
        };

        let mut outcome = PursuitTick::Idle;
        if let Some(hitbox) = landing {
            let goal = fitted_goal(&probe, tilemap, &hitbox);
            let start = host.grid_pos();
            let stale = self.runner.as_ref().map(|r| r.goal()) != Some(Some(goal));
            if start == goal && self.runner.is_none() {
                return PursuitTick::Arrived;
            }
            if stale {
                end_plan(&mut self.runner, host);
                if start == goal {
                    return PursuitTick::Arrived;
                }
                let r = self.config.search_radius;
                let range = TileRect::at(goal, IVec2::ONE)
                    .inflate(r, r)
                    .clamp_to(&tilemap.bounds());
                self.planner.init_plan(goal);
                if self
                    .planner
                    .fill_plan(&probe, range, Some(start), self.config.limits())
                {
                    let runner =
                        PlanExecutor::new(&self.planner, start, self.config.timeout_ticks);
                    info!(
                        "[Pursuit plan] begin {start} -> {goal}, {} steps, {} nodes",
                        runner.remaining(),
                        self.planner.action_count()
                    );
                    self.runner = Some(runner);
                } else {
                    debug!(
                        "[Pursuit plan] no route {start} -> {goal} ({} nodes explored)",
                        self.planner.action_count()
                    );
                    outcome = PursuitTick::Unreachable;
                }
            }
        }

        if let Some(runner) = self.runner.as_mut() {
            self.intents.clear();
            if runner.update(&probe, host, &mut self.intents) {
                for intent in self.intents.drain(..) {
                    match intent {
                        MotionIntent::MoveTo(p) => host.move_toward(p),
                        MotionIntent::JumpTo(_) => host.jump(),
                    }
                }
                outcome = PursuitTick::Following;
            } else {
                end_plan(&mut self.runner, host);
                outcome = PursuitTick::Finished;
            }
        }
        outcome
    }

    fn probe<'a>(&'a mut self, tilemap: &Tilemap) -> TerrainProbe<'a> {
        let body = self.config.body();
        TerrainProbe::new(self.cache.prepare(tilemap), body, tilemap.tile_size)
    }

    pub fn can_move_to(&mut self, tilemap: &Tilemap, p: IVec2) -> bool {
        self.probe(tilemap).can_move_to(p)
    }

    pub fn can_jump(&mut self, tilemap: &Tilemap, from: IVec2, tip: IVec2) -> bool {
        self.probe(tilemap).can_jump(from, tip)
    }

    pub fn can_fall(&mut self, tilemap: &Tilemap, from: IVec2, to: IVec2) -> bool {
        self.probe(tilemap).can_fall(from, to)
    }

    pub fn can_climb_up(&mut self, tilemap: &Tilemap, p: IVec2) -> bool {
        self.probe(tilemap).can_climb_up(p)
    }

    pub fn can_climb_down(&mut self, tilemap: &Tilemap, p: IVec2) -> bool {
        self.probe(tilemap).can_climb_down(p)
    }
}

fn end_plan(runner: &mut Option<PlanExecutor>, host: &mut impl MovementHost) {
    if let Some(r) = runner.take() {
        debug!(
            "[Pursuit plan] end at {:?} ({:?})",
            r.current().map(|a| a.pos),
            r.state()
        );
        host.halt();
    }
}

/// Tile under the hitbox center, shifted left by up to the body width when
/// the body would not fit there.
fn fitted_goal(probe: &TerrainProbe<'_>, tilemap: &Tilemap, hitbox: &Aabb) -> IVec2 {
    let tile = tilemap.world_to_tile(Vec2::new(hitbox.center_x(), hitbox.center_y()));
    (0..probe.body().x)
        .map(|dx| tile - IVec2::new(dx, 0))
        .find(|&p| probe.can_occupy(p))
        .unwrap_or(tile)
}
