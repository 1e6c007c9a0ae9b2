use std::collections::VecDeque;

use bevy::math::{IVec2, Vec2};

use crate::actor::MovementHost;
use crate::planner::{ActionKind, MotionPlanner, PlanAction};
use crate::terrain::Capabilities;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MotionIntent {
    MoveTo(Vec2),
    JumpTo(IVec2),
}

/// Receives the motion requests an executor emits during one tick.
pub trait IntentSink {
    fn moveto(&mut self, target: Vec2);
    fn jumpto(&mut self, tip: IVec2);
}

impl IntentSink for Vec<MotionIntent> {
    fn moveto(&mut self, target: Vec2) {
        self.push(MotionIntent::MoveTo(target));
    }

    fn jumpto(&mut self, tip: IVec2) {
        self.push(MotionIntent::JumpTo(tip));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutorState {
    Running,
    Completed,
    TimedOut,
}

/// Walks a found plan forward one tick at a time.
///
/// Every action gets `timeout` ticks to reach the next node; running out of
/// budget leaves the executor timed out for good.
#[derive(Clone, Debug)]
pub struct PlanExecutor {
    chain: VecDeque<PlanAction>,
    goal: Option<IVec2>,
    timeout: u32,
    budget: u32,
    state: ExecutorState,
}

impl PlanExecutor {
    pub fn new(planner: &MotionPlanner, start: IVec2, timeout: u32) -> Self {
        let chain: VecDeque<PlanAction> = planner.chain_from(start).into();
        let state = if chain.len() < 2 {
            ExecutorState::Completed
        } else {
            ExecutorState::Running
        };
        Self {
            chain,
            goal: planner.goal(),
            timeout,
            budget: timeout,
            state,
        }
    }

    pub fn goal(&self) -> Option<IVec2> {
        self.goal
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn current(&self) -> Option<&PlanAction> {
        self.chain.front()
    }

    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(1)
    }

    fn advance(&mut self) {
        self.chain.pop_front();
        self.budget = self.timeout;
    }

    /// Emits this tick's intents. Returns false once there is nothing left to
    /// do or the current action ran out of ticks.
    pub fn update(
        &mut self,
        caps: &impl Capabilities,
        host: &impl MovementHost,
        sink: &mut impl IntentSink,
    ) -> bool {
        if self.state != ExecutorState::Running {
            return false;
        }
        let (Some(&action), Some(&next)) = (self.chain.front(), self.chain.get(1)) else {
            self.state = ExecutorState::Completed;
            return false;
        };
        if self.budget == 0 {
            self.state = ExecutorState::TimedOut;
            return false;
        }
        self.budget -= 1;

        let cur = host.grid_pos();
        let dst = next.pos;
        match action.kind {
            ActionKind::None => {}
            ActionKind::Walk | ActionKind::Climb => {
                sink.moveto(caps.body_center(dst));
                if cur == dst {
                    self.advance();
                }
            }
            ActionKind::Fall => {
                let hitbox = host.hitbox();
                let here = Vec2::new(hitbox.center_x(), hitbox.center_y());
                // Farthest cell along the corridor that is reachable right now.
                let path = caps.straight_path(cur, dst);
                if let Some(target) = path
                    .iter()
                    .rev()
                    .map(|&cell| caps.body_center(cell))
                    .find(|&target| host.is_movable(target - here))
                {
                    sink.moveto(target);
                }
                if cur == dst {
                    self.advance();
                }
            }
            ActionKind::Jump => {
                let tip = IVec2::new(cur.x, dst.y);
                let footing = host.is_landed() && !host.is_holding();
                if footing && caps.has_clearance(&host.hitbox(), tip) {
                    sink.jumpto(dst);
                    self.advance();
                } else {
                    sink.moveto(caps.body_center(cur));
                }
            }
        }
        true
    }
}
