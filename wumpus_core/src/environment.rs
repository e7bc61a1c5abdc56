use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    Position,
    agent::Agent,
    belief::Observation,
    config::{ConfigError, SimConfig},
    map::Grid,
    task::{AwardedTask, Task},
};

/// Ground truth for one cell of the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub pit: bool,
    /// A wumpus that is still alive.
    pub wumpus: bool,
    pub dead_wumpus: bool,
    pub gold: bool,
    pub breeze: bool,
    pub stench: bool,
}

impl Cell {
    #[inline]
    pub fn is_deadly(&self) -> bool {
        self.pit || self.wumpus
    }

    #[inline]
    fn is_free(&self) -> bool {
        !self.pit && !self.wumpus && !self.gold
    }
}

/// The signals sensed at a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percept {
    pub breeze: bool,
    pub stench: bool,
}

impl From<Percept> for Observation {
    fn from(percept: Percept) -> Self {
        Observation {
            breeze: percept.breeze,
            stench: percept.stench,
            ..Observation::default()
        }
    }
}

/// What happened to an agent while executing its task this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Where the agent ended up.
    pub position: Position,
    pub breeze: bool,
    pub stench: bool,
    pub pit: bool,
    pub wumpus: bool,
    pub gold: bool,
    pub dead: bool,
    pub wumpus_died_at: Option<Position>,
    pub arrow_used: bool,
}

impl TaskOutcome {
    pub fn observation(&self) -> Observation {
        Observation {
            breeze: self.breeze,
            stench: self.stench,
            pit: self.pit,
            wumpus: self.wumpus,
            wumpus_died_at: self.wumpus_died_at,
        }
    }
}

/// Represents errors that can occur while building a board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Map string is empty")]
    EmptyMap,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    InconsistentWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown map code '{code}' at position {position}")]
    UnknownCode { code: String, position: Position },
    #[error("No start position ('ST') found in map")]
    NoStartPosition,
    #[error("Requested {requested} free cells but only {available} are left")]
    NotEnoughFreeCells { requested: usize, available: usize },
    #[error("Requested {requested} start cells but only {available} hint-free cells exist")]
    NotEnoughStartCells { requested: usize, available: usize },
}

/// The hidden hazard board. Only the coordination loop and the tests look
/// at it directly; agents learn about it through percepts and outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    cells: Grid<Cell>,
}

impl Board {
    /// Creates an empty board.
    pub fn new(width: usize, height: usize) -> Self {
        Board {
            cells: Grid::new(width, height),
        }
    }

    /// Places wumpus, pits and gold uniformly at random on distinct cells,
    /// then picks one hint-free start cell per agent.
    pub fn generate<R: Rng + ?Sized>(
        config: &SimConfig,
        rng: &mut R,
    ) -> Result<(Board, Vec<Position>), BoardError> {
        config.validate()?;
        let mut board = Board::new(config.grid_size, config.grid_size);

        board.place(config.wumpus_count, rng, |cell| cell.wumpus = true)?;
        board.place(config.pit_count, rng, |cell| cell.pit = true)?;
        board.place(config.gold_count, rng, |cell| cell.gold = true)?;
        board.refresh_hints();

        let hint_free: Vec<Position> = board
            .cells
            .enumerate()
            .filter(|(_, cell)| cell.is_free() && !cell.breeze && !cell.stench)
            .map(|(position, _)| position)
            .collect();
        if hint_free.len() < config.agent_count {
            return Err(BoardError::NotEnoughStartCells {
                requested: config.agent_count,
                available: hint_free.len(),
            });
        }
        let starts = hint_free
            .choose_multiple(rng, config.agent_count)
            .copied()
            .collect();

        Ok((board, starts))
    }

    fn place<R, F>(&mut self, count: usize, rng: &mut R, mut place: F) -> Result<(), BoardError>
    where
        R: Rng + ?Sized,
        F: FnMut(&mut Cell),
    {
        let free: Vec<Position> = self
            .cells
            .enumerate()
            .filter(|(_, cell)| cell.is_free())
            .map(|(position, _)| position)
            .collect();
        if free.len() < count {
            return Err(BoardError::NotEnoughFreeCells {
                requested: count,
                available: free.len(),
            });
        }
        for position in free.choose_multiple(rng, count) {
            place(&mut self.cells[*position]);
        }
        Ok(())
    }

    /// Recomputes breezes and stenches from the current hazards.
    fn refresh_hints(&mut self) {
        let hints: Vec<(Position, bool, bool)> = self
            .cells
            .positions()
            .map(|position| {
                let mut breeze = false;
                let mut stench = false;
                for neighbor in self.cells.neighbors(position) {
                    breeze |= self.cells[neighbor].pit;
                    stench |= self.cells[neighbor].wumpus;
                }
                (position, breeze, stench)
            })
            .collect();
        for (position, breeze, stench) in hints {
            let cell = &mut self.cells[position];
            cell.breeze = breeze;
            cell.stench = stench;
        }
    }

    pub fn cells(&self) -> &Grid<Cell> {
        &self.cells
    }

    pub fn width(&self) -> usize {
        self.cells.width()
    }

    pub fn height(&self) -> usize {
        self.cells.height()
    }

    /// Signals at `position`. Nothing is sensed off the board.
    pub fn percept(&self, position: Position) -> Percept {
        self.cells
            .get(position)
            .map(|cell| Percept {
                breeze: cell.breeze,
                stench: cell.stench,
            })
            .unwrap_or_default()
    }

    /// Carries out one round of `awarded` for `agent`.
    ///
    /// Every task advances the agent one step along its path. A Shoot task
    /// whose path is exhausted fires the arrow instead.
    pub fn execute(&mut self, agent: &Agent, awarded: &AwardedTask) -> TaskOutcome {
        match (awarded.task, awarded.next_step()) {
            (_, Some(next)) => self.step(agent, next),
            (Task::Shoot { target }, None) if agent.has_arrow => self.shoot(agent, target),
            (task, None) => {
                warn!(agent = agent.id, ?task, "nothing left to execute");
                self.outcome_at(agent.position)
            }
        }
    }

    fn step(&self, agent: &Agent, next: Position) -> TaskOutcome {
        if !self.cells.contains(next) || agent.position.manhattan(&next) != 1 {
            warn!(agent = agent.id, from = %agent.position, to = %next, "invalid step");
            return TaskOutcome {
                dead: true,
                ..self.outcome_at(agent.position)
            };
        }
        self.outcome_at(next)
    }

    fn shoot(&mut self, agent: &Agent, target: Position) -> TaskOutcome {
        let from = agent.position;
        let mut outcome = TaskOutcome {
            arrow_used: true,
            ..self.outcome_at(from)
        };
        if target == from || !from.is_aligned_with(&target) {
            warn!(agent = agent.id, %from, %target, "arrow fired out of line");
            return outcome;
        }

        let dx = (target.x as isize - from.x as isize).signum();
        let dy = (target.y as isize - from.y as isize).signum();
        let mut current = from;
        loop {
            let (Some(x), Some(y)) = (
                current.x.checked_add_signed(dx),
                current.y.checked_add_signed(dy),
            ) else {
                break;
            };
            current = Position { x, y };
            let Some(cell) = self.cells.get_mut(current) else {
                break;
            };
            if cell.wumpus {
                cell.wumpus = false;
                cell.dead_wumpus = true;
                outcome.wumpus_died_at = Some(current);
                debug!(agent = agent.id, position = %current, "wumpus shot");
                break;
            }
        }

        if outcome.wumpus_died_at.is_some() {
            self.refresh_hints();
            let percept = self.percept(from);
            outcome.breeze = percept.breeze;
            outcome.stench = percept.stench;
        }
        outcome
    }

    /// Outcome of an agent standing on `position`.
    fn outcome_at(&self, position: Position) -> TaskOutcome {
        let cell = self.cells.get(position).copied().unwrap_or_default();
        TaskOutcome {
            position,
            breeze: cell.breeze,
            stench: cell.stench,
            pit: cell.pit,
            wumpus: cell.wumpus,
            gold: cell.gold,
            dead: cell.is_deadly(),
            wumpus_died_at: None,
            arrow_used: false,
        }
    }
}

/// Loads a board from a string of whitespace separated two-letter codes:
/// `BL` blank, `PT` pit, `WU` wumpus, `GD` gold, `ST` agent start.
///
/// Start cells are returned in row-major order.
pub fn load_board_from_string(map_string: &str) -> Result<(Board, Vec<Position>), BoardError> {
    let lines: Vec<&str> = map_string.trim().lines().collect();
    if lines.is_empty() {
        return Err(BoardError::EmptyMap);
    }

    let height = lines.len();
    let mut width = 0;
    let mut parsed_rows: Vec<Vec<&str>> = Vec::with_capacity(height);

    for (y, line) in lines.iter().enumerate() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if y == 0 {
            width = tokens.len();
        } else if tokens.len() != width {
            return Err(BoardError::InconsistentWidth {
                row: y,
                expected: width,
                found: tokens.len(),
            });
        }
        parsed_rows.push(tokens);
    }
    let mut board = Board::new(width, height);
    let mut starts = Vec::new();

    for (y, row_tokens) in parsed_rows.iter().enumerate() {
        for (x, token) in row_tokens.iter().enumerate() {
            let position = Position { x, y };
            let cell = &mut board.cells[position];
            match *token {
                "BL" => {}
                "PT" => cell.pit = true,
                "WU" => cell.wumpus = true,
                "GD" => cell.gold = true,
                "ST" => starts.push(position),
                unknown => {
                    return Err(BoardError::UnknownCode {
                        code: unknown.to_string(),
                        position,
                    });
                }
            }
        }
    }

    if starts.is_empty() {
        return Err(BoardError::NoStartPosition);
    }
    board.refresh_hints();

    Ok((board, starts))
}
