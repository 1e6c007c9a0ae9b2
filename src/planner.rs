use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use bevy::math::IVec2;

use crate::occupancy::TileRect;
use crate::terrain::Capabilities;
use crate::trajectory::TrajectoryCatalog;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    None,
    Walk,
    Fall,
    Jump,
    Climb,
}

/// Distinguishes an airborne node from a resting one at the same tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlanContext {
    /// Past a jump's apex, about to fall.
    Falling,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub pos: IVec2,
    pub context: Option<PlanContext>,
}

impl PlanKey {
    pub fn new(pos: IVec2, context: Option<PlanContext>) -> Self {
        Self { pos, context }
    }
}

/// One node of the goal-rooted action graph: performing `kind` at `pos`
/// leads to `next`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanAction {
    pub pos: IVec2,
    pub context: Option<PlanContext>,
    pub kind: ActionKind,
    pub cost: u32,
    pub next: Option<PlanKey>,
}

impl PlanAction {
    pub fn key(&self) -> PlanKey {
        PlanKey::new(self.pos, self.context)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlanLimits {
    pub max_cost: u32,
    /// Upper bound on nodes expanded by one `fill_plan` call.
    pub max_expansions: u32,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self {
            max_cost: 200,
            max_expansions: 1000,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlannerState {
    #[default]
    Idle,
    Filling,
    Found,
    Exhausted,
}

type QueueEntry = (u32, u64, u32, (i32, i32), Option<PlanContext>);

enum Frontier {
    /// Reverse breadth-first order when no start is known.
    Fifo(VecDeque<QueueEntry>),
    /// Ordered by cost plus Manhattan distance to the start, then insertion.
    Heap(BinaryHeap<Reverse<QueueEntry>>),
}

impl Frontier {
    fn push(&mut self, entry: QueueEntry) {
        match self {
            Frontier::Fifo(q) => q.push_back(entry),
            Frontier::Heap(h) => h.push(Reverse(entry)),
        }
    }

    fn pop(&mut self) -> Option<QueueEntry> {
        match self {
            Frontier::Fifo(q) => q.pop_front(),
            Frontier::Heap(h) => h.pop().map(|Reverse(e)| e),
        }
    }

    fn len(&self) -> usize {
        match self {
            Frontier::Fifo(q) => q.len(),
            Frontier::Heap(h) => h.len(),
        }
    }
}

/// Reverse search from a goal tile over walk, climb, fall and jump actions.
pub struct MotionPlanner {
    catalog: TrajectoryCatalog,
    goal: Option<IVec2>,
    start: Option<IVec2>,
    actions: HashMap<PlanKey, PlanAction>,
    frontier: Frontier,
    seq: u64,
    state: PlannerState,
}

impl MotionPlanner {
    pub fn new(catalog: TrajectoryCatalog) -> Self {
        Self {
            catalog,
            goal: None,
            start: None,
            actions: HashMap::new(),
            frontier: Frontier::Fifo(VecDeque::new()),
            seq: 0,
            state: PlannerState::Idle,
        }
    }

    pub fn catalog(&self) -> &TrajectoryCatalog {
        &self.catalog
    }

    pub fn goal(&self) -> Option<IVec2> {
        self.goal
    }

    pub fn start(&self) -> Option<IVec2> {
        self.start
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn actions(&self) -> impl Iterator<Item = &PlanAction> {
        self.actions.values()
    }

    /// Drops any previous graph and seeds the search with a zero-cost node at
    /// `goal`.
    pub fn init_plan(&mut self, goal: IVec2) {
        self.goal = Some(goal);
        self.start = None;
        self.actions.clear();
        self.frontier = Frontier::Fifo(VecDeque::new());
        self.seq = 0;
        self.actions.insert(
            PlanKey::new(goal, None),
            PlanAction {
                pos: goal,
                context: None,
                kind: ActionKind::None,
                cost: 0,
                next: None,
            },
        );
        self.state = PlannerState::Filling;
    }

    pub fn get_action(&self, pos: IVec2, context: Option<PlanContext>) -> Option<&PlanAction> {
        self.actions.get(&PlanKey::new(pos, context))
    }

    pub fn action(&self, key: PlanKey) -> Option<&PlanAction> {
        self.actions.get(&key)
    }

    /// Follows `next` links from the resting node at `start` to the goal.
    pub fn chain_from(&self, start: IVec2) -> Vec<PlanAction> {
        let mut chain = Vec::new();
        let mut cursor = self.get_action(start, None).copied();
        while let Some(action) = cursor {
            if chain.len() > self.actions.len() {
                break;
            }
            chain.push(action);
            cursor = action.next.and_then(|key| self.action(key).copied());
        }
        chain
    }

    /// Grows the action graph inside `range` until `start` is reached.
    ///
    /// Returns false when the frontier or the expansion budget runs out first;
    /// the graph then only holds the explored fringe.
    pub fn fill_plan(
        &mut self,
        caps: &impl Capabilities,
        range: TileRect,
        start: Option<IVec2>,
        limits: PlanLimits,
    ) -> bool {
        let Some(goal) = self.goal else {
            return false;
        };
        if self.state != PlannerState::Filling {
            return self.state == PlannerState::Found;
        }
        if let Some(s) = start {
            if !caps.can_stand(s) {
                self.state = PlannerState::Exhausted;
                return false;
            }
        }

        self.start = start;
        self.frontier = match start {
            Some(_) => Frontier::Heap(BinaryHeap::new()),
            None => Frontier::Fifo(VecDeque::new()),
        };
        self.seq = 0;
        self.enqueue(PlanKey::new(goal, None), 0);

        let mut expansions = 0u32;
        while let Some((_, _, cost, (x, y), context)) = self.frontier.pop() {
            let p = IVec2::new(x, y);
            let Some(a0) = self.actions.get(&PlanKey::new(p, context)).copied() else {
                continue;
            };
            if a0.cost < cost {
                continue;
            }
            if context.is_none() && start == Some(p) {
                self.state = PlannerState::Found;
                return true;
            }
            if expansions >= limits.max_expansions {
                break;
            }
            expansions += 1;

            if caps.is_obstacle_at(p) {
                continue;
            }
            if context.is_none() && !caps.is_supported(p) {
                continue;
            }
            if a0.cost + 1 > limits.max_cost {
                continue;
            }
            self.expand(caps, &a0, range, limits.max_cost);
        }

        self.state = PlannerState::Exhausted;
        false
    }

    fn expand(&mut self, caps: &impl Capabilities, a0: &PlanAction, range: TileRect, max_cost: u32) {
        let p = a0.pos;
        let next = Some(a0.key());

        if a0.context.is_none() {
            let below = p - IVec2::Y;
            if range.contains(below) && caps.can_climb_up(below) {
                self.offer(below, None, ActionKind::Climb, a0.cost + 1, next, max_cost);
            }
            let above = p + IVec2::Y;
            if range.contains(above) && caps.can_climb_down(above) {
                self.offer(above, None, ActionKind::Climb, a0.cost + 1, next, max_cost);
            }
        }

        for vx in [-1, 1] {
            match a0.context {
                None => {
                    let w = IVec2::new(p.x - vx, p.y);
                    if range.contains(w) && caps.can_move_to(w) {
                        self.offer(w, None, ActionKind::Walk, a0.cost + 1, next, max_cost);
                    }

                    let falls: Vec<IVec2> = self.catalog.fall_offsets(vx).collect();
                    for offset in falls {
                        let origin = IVec2::new(p.x - offset.x, p.y + offset.y);
                        if !range.contains(origin) || caps.is_obstacle_at(origin) {
                            continue;
                        }
                        let cost = a0.cost + offset.x.unsigned_abs() + offset.y as u32 + 1;
                        if offset.x != 0 && caps.can_fall(origin, p) {
                            self.offer(origin, None, ActionKind::Fall, cost, next, max_cost);
                        }
                        if caps.can_drop(origin, p) {
                            self.offer(
                                origin,
                                Some(PlanContext::Falling),
                                ActionKind::Fall,
                                cost,
                                next,
                                max_cost,
                            );
                        }
                    }
                }
                Some(PlanContext::Falling) => {
                    let jumps: Vec<IVec2> = self.catalog.jump_offsets(vx).collect();
                    for offset in jumps {
                        let origin = IVec2::new(p.x - offset.x, p.y - offset.y);
                        if !range.contains(origin) || !caps.can_jump(origin, p) {
                            continue;
                        }
                        let cost = a0.cost + offset.x.unsigned_abs() + offset.y as u32 + 1;
                        self.offer(origin, None, ActionKind::Jump, cost, next, max_cost);
                    }
                }
            }
        }
    }

    /// Records the action if it beats whatever is already stored for its key.
    fn offer(
        &mut self,
        pos: IVec2,
        context: Option<PlanContext>,
        kind: ActionKind,
        cost: u32,
        next: Option<PlanKey>,
        max_cost: u32,
    ) {
        if cost > max_cost {
            return;
        }
        let key = PlanKey::new(pos, context);
        if let Some(existing) = self.actions.get(&key) {
            if existing.cost <= cost {
                return;
            }
        }
        self.actions.insert(
            key,
            PlanAction {
                pos,
                context,
                kind,
                cost,
                next,
            },
        );
        self.enqueue(key, cost);
    }

    fn enqueue(&mut self, key: PlanKey, cost: u32) {
        let prio = match self.start {
            Some(s) => cost + (s - key.pos).abs().element_sum() as u32,
            None => 0,
        };
        self.seq += 1;
        self.frontier
            .push((prio, self.seq, cost, (key.pos.x, key.pos.y), key.context));
    }

    pub fn pending(&self) -> usize {
        self.frontier.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::TileRules;
    use crate::occupancy::OccupancyCache;
    use crate::terrain::TerrainProbe;
    use crate::tilemap::Tilemap;
    use crate::trajectory::PhysicsProfile;

    fn level(rows: &[&str]) -> Tilemap {
        Tilemap::from_ascii(rows, 16.0).expect("test level parses")
    }

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

    fn plan(
        map: &Tilemap,
        profile: &PhysicsProfile,
        start: IVec2,
        goal: IVec2,
    ) -> (MotionPlanner, bool) {
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(map), IVec2::ONE, map.tile_size);
        let mut planner = MotionPlanner::new(TrajectoryCatalog::from_profile(profile));
        planner.init_plan(goal);
        let found = planner.fill_plan(&probe, map.bounds(), Some(start), PlanLimits::default());
        (planner, found)
    }

    fn kinds(chain: &[PlanAction]) -> Vec<ActionKind> {
        chain.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn flat_floor_is_a_chain_of_walks() {
        let map = level(&["..........", "..........", "##########"]);
        let (planner, found) =
            plan(&map, &PhysicsProfile::default(), IVec2::new(1, 1), IVec2::new(8, 1));
        assert!(found);
        assert_eq!(planner.state(), PlannerState::Found);
        let chain = planner.chain_from(IVec2::new(1, 1));
        assert_eq!(chain.len(), 8);
        assert_eq!(&kinds(&chain)[..7], &[ActionKind::Walk; 7]);
        assert_eq!(chain[7].kind, ActionKind::None);
        assert_eq!(chain[7].pos, IVec2::new(8, 1));
        assert_eq!(chain[0].cost, 7);
    }

    #[test]
    fn narrow_gap_is_crossed_with_one_fall() {
        let map = level(&["..........", "..........", "####..####"]);
        let (planner, found) =
            plan(&map, &narrow_gap_profile(), IVec2::new(1, 1), IVec2::new(8, 1));
        assert!(found);
        let chain = planner.chain_from(IVec2::new(1, 1));
        assert_eq!(
            kinds(&chain),
            vec![
                ActionKind::Walk,
                ActionKind::Walk,
                ActionKind::Fall,
                ActionKind::Walk,
                ActionKind::Walk,
                ActionKind::None,
            ]
        );
        assert_eq!(chain[2].pos, IVec2::new(3, 1));
        assert_eq!(chain[3].pos, IVec2::new(6, 1));
        assert_eq!(chain[0].cost, 8);
    }

    #[test]
    fn enclosed_goal_is_unreachable() {
        let map = level(&[
            "..........",
            ".......###",
            ".......#.#",
            ".......###",
            "##########",
        ]);
        let (planner, found) =
            plan(&map, &PhysicsProfile::default(), IVec2::new(1, 1), IVec2::new(8, 2));
        assert!(!found);
        assert_eq!(planner.state(), PlannerState::Exhausted);
        assert!(planner.actions().all(|a| a.pos == IVec2::new(8, 2)));
    }

    #[test]
    fn unstandable_start_fails_immediately() {
        let map = level(&["......", "......", "######"]);
        let (planner, found) =
            plan(&map, &PhysicsProfile::default(), IVec2::new(1, 2), IVec2::new(4, 1));
        assert!(!found);
        assert_eq!(planner.action_count(), 1);
    }

    #[test]
    fn ladders_are_climbed() {
        let map = level(&[
            "......",
            "..H###",
            "..H...",
            "..H...",
            "######",
        ]);
        let (planner, found) =
            plan(&map, &PhysicsProfile::default(), IVec2::new(0, 1), IVec2::new(4, 4));
        assert!(found);
        let chain = planner.chain_from(IVec2::new(0, 1));
        assert_eq!(
            kinds(&chain),
            vec![
                ActionKind::Walk,
                ActionKind::Walk,
                ActionKind::Climb,
                ActionKind::Climb,
                ActionKind::Climb,
                ActionKind::Walk,
                ActionKind::Walk,
                ActionKind::None,
            ]
        );
    }

    #[test]
    fn step_is_climbed_with_a_jump_into_a_fall() {
        let map = level(&[
            "........",
            "........",
            "....####",
            "....####",
            "########",
        ]);
        let start = IVec2::new(1, 1);
        let (planner, found) = plan(&map, &PhysicsProfile::default(), start, IVec2::new(6, 3));
        assert!(found);
        let chain = planner.chain_from(start);
        assert_eq!(chain[0].cost, 9);
        let jump = chain
            .iter()
            .position(|a| a.kind == ActionKind::Jump)
            .expect("plan jumps");
        assert_eq!(chain[jump + 1].context, Some(PlanContext::Falling));
        assert_eq!(chain[jump + 1].kind, ActionKind::Fall);
        assert_eq!(chain.last().map(|a| a.pos), Some(IVec2::new(6, 3)));
    }

    #[test]
    fn plans_are_physically_consistent_and_deterministic() {
        let map = level(&[
            "............",
            "...===...H..",
            ".........H..",
            "..####...H..",
            ".........H..",
            "####..######",
        ]);
        let start = IVec2::new(0, 1);
        let goal = IVec2::new(4, 5);
        let (first, found) = plan(&map, &PhysicsProfile::default(), start, goal);
        assert!(found);
        let (second, _) = plan(&map, &PhysicsProfile::default(), start, goal);
        let chain = first.chain_from(start);
        assert_eq!(chain, second.chain_from(start));
        assert_eq!(chain.last().map(|a| a.pos), Some(goal));

        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        for pair in chain.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(!probe.is_obstacle_at(a.pos));
            assert!(a.cost > b.cost);
            match a.kind {
                ActionKind::Walk => {
                    assert!(probe.can_stand(a.pos));
                    assert_eq!((b.pos - a.pos).abs().element_sum(), 1);
                }
                ActionKind::Climb => {
                    assert_eq!((b.pos - a.pos).x, 0);
                    let lower = if b.pos.y > a.pos.y { a.pos } else { b.pos };
                    assert!(probe.is_grabbing_at(lower));
                }
                ActionKind::Fall if a.context.is_none() => assert!(probe.can_fall(a.pos, b.pos)),
                ActionKind::Fall => assert!(probe.can_drop(a.pos, b.pos)),
                ActionKind::Jump => {
                    assert!(probe.can_jump(a.pos, b.pos));
                    assert_eq!(b.context, Some(PlanContext::Falling));
                }
                ActionKind::None => panic!("only the goal has no action"),
            }
        }
    }

    #[test]
    fn search_without_start_floods_the_range() {
        let map = level(&["......", "......", "######"]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        let mut planner = MotionPlanner::new(TrajectoryCatalog::from_profile(&PhysicsProfile::default()));
        planner.init_plan(IVec2::new(5, 1));
        assert!(!planner.fill_plan(&probe, map.bounds(), None, PlanLimits::default()));
        for x in 0..6 {
            let action = planner.get_action(IVec2::new(x, 1), None).expect("tile reached");
            assert_eq!(action.cost, (5 - x) as u32);
        }
    }

    #[test]
    fn cost_budget_bounds_the_search() {
        let map = level(&["..........", "..........", "##########"]);
        let mut cache = OccupancyCache::new(TileRules::default());
        let probe = TerrainProbe::new(cache.prepare(&map), IVec2::ONE, 16.0);
        let mut planner = MotionPlanner::new(TrajectoryCatalog::from_profile(&PhysicsProfile::default()));
        planner.init_plan(IVec2::new(8, 1));
        let limits = PlanLimits {
            max_cost: 3,
            ..PlanLimits::default()
        };
        assert!(!planner.fill_plan(&probe, map.bounds(), Some(IVec2::new(1, 1)), limits));
        assert!(planner.actions().all(|a| a.cost <= 3));
    }
}
