use serde::{Deserialize, Serialize};

use crate::{EntityId, Position, auction::Bid, pathing::PathMap, task::Task};

/// Life cycle of an explorer. `Dead` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    #[default]
    Alive,
    Dead,
}

/// Per-explorer state, owned by the coordination loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: EntityId,
    pub position: Position,
    pub status: AgentStatus,
    pub has_arrow: bool,
}

/// What an agent needs besides its own state to value a task.
#[derive(Debug, Clone, Copy)]
pub struct BidContext<'a> {
    /// Paths from the bidder's position over this round's belief snapshot.
    pub paths: &'a PathMap,
    /// Positions of the other living agents.
    pub others: &'a [Position],
    pub spread_bonus: bool,
}

impl Agent {
    pub fn new(id: EntityId, position: Position, has_arrow: bool) -> Self {
        Agent {
            id,
            position,
            status: AgentStatus::Alive,
            has_arrow,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.status == AgentStatus::Alive
    }

    /// The only status transition. Killing a dead agent does nothing.
    pub fn kill(&mut self) {
        self.status = AgentStatus::Dead;
    }

    /// Values `task` as reward minus travel cost, plus the optional spread
    /// bonus. Tasks the agent cannot complete are bid at negative infinity
    /// with no path.
    pub fn bid_for_task(&self, task: &Task, context: &BidContext<'_>) -> Bid {
        let refuse = || Bid::unreachable(self.id, *task);
        if !self.is_alive() {
            return refuse();
        }

        let (end, path) = match task {
            Task::Move { target } => match context.paths.path_to(*target) {
                Some(path) => (*target, path),
                None => return refuse(),
            },
            Task::Shoot { target } => {
                if !self.has_arrow {
                    return refuse();
                }
                match context.paths.nearest_aligned(*target) {
                    Some(found) => found,
                    None => return refuse(),
                }
            }
        };
        let Some(cost) = context.paths.cost_to(end) else {
            return refuse();
        };

        let mut value = task.reward() - f64::from(cost);
        if context.spread_bonus {
            value += spread_bonus(end, context.others);
        }

        Bid {
            value,
            agent: self.id,
            task: *task,
            path: Some(path),
        }
    }
}

/// Distance from `end` to the closest other agent, scaled down so it only
/// breaks near-ties between bids.
fn spread_bonus(end: Position, others: &[Position]) -> f64 {
    others
        .iter()
        .map(|other| end.manhattan(other))
        .min()
        .map_or(0.0, |distance| distance as f64 / 100.0)
}
