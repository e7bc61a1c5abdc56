use serde::{Deserialize, Serialize};

pub mod agent;
pub mod auction;
pub mod belief;
pub mod config;
pub mod environment;
pub mod map;
pub mod pathing;
pub mod simulation;
pub mod task;

pub use agent::{Agent, AgentStatus};
pub use auction::{Awards, Bid, award_tasks, create_bids};
pub use belief::{BeliefFlags, BeliefStore, DangerGroup, GroupId, Hazards, Observation};
pub use config::{ConfigError, SimConfig};
pub use environment::{Board, BoardError, Cell, Percept, TaskOutcome, load_board_from_string};
pub use pathing::{PathMap, SearchMode};
pub use simulation::{EpisodeEnd, EpisodeSummary, RoundOutcome, Simulation};
pub use task::{AwardedTask, Task, create_tasks};

/// Unique identifier for agents.
pub type EntityId = usize;

/// Represents a 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Returns manhattan distance between two positions
    pub fn manhattan(&self, other: &Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// True if both positions share a row or a column.
    pub fn is_aligned_with(&self, other: &Position) -> bool {
        self.x == other.x || self.y == other.y
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
