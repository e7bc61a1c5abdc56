use serde::{Deserialize, Serialize};

use crate::pathing::SearchMode;

/// Represents configuration errors detected before a run starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid size must be at least 1")]
    EmptyGrid,
    #[error("At least one agent is required")]
    NoAgents,
    #[error("{placed} placed items and {agents} agents do not fit on a {size}x{size} grid")]
    Overcrowded {
        placed: usize,
        agents: usize,
        size: usize,
    },
}

/// Fixed parameters for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Side length of the square board.
    pub grid_size: usize,
    pub agent_count: usize,
    pub wumpus_count: usize,
    pub pit_count: usize,
    pub gold_count: usize,
    /// Emit Shoot tasks against confirmed wumpus cells and hand every agent an arrow.
    pub shooting: bool,
    pub search: SearchMode,
    /// Add the coverage bonus that favours targets far from the other agents.
    pub spread_bonus: bool,
    /// Rounds after which an episode is abandoned.
    pub max_rounds: usize,
    /// Seed for board generation. `None` draws from the OS.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            grid_size: 10,
            agent_count: 4,
            wumpus_count: 1,
            pit_count: 5,
            gold_count: 1,
            shooting: false,
            search: SearchMode::BreadthFirst,
            spread_bonus: false,
            max_rounds: 500,
            seed: None,
        }
    }
}

impl SimConfig {
    /// Rejects configurations no board can satisfy.
    ///
    /// This only checks raw cell counts. Whether enough hint-free start cells
    /// remain is decided at generation time, see
    /// [`BoardError::NotEnoughStartCells`](crate::environment::BoardError).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_size == 0 {
            return Err(ConfigError::EmptyGrid);
        }
        if self.agent_count == 0 {
            return Err(ConfigError::NoAgents);
        }
        let placed = self.wumpus_count + self.pit_count + self.gold_count;
        let cells = self.grid_size * self.grid_size;
        if placed + self.agent_count > cells {
            return Err(ConfigError::Overcrowded {
                placed,
                agents: self.agent_count,
                size: self.grid_size,
            });
        }
        Ok(())
    }
}
