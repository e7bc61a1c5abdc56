use serde::{Deserialize, Serialize};

use crate::{Position, belief::BeliefStore};

pub const MOVE_REWARD: f64 = 1.0;
pub const SHOOT_REWARD: f64 = 10.0;

/// A unit of work put up for auction. Tasks are regenerated every round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Task {
    /// Walk to an unexplored cell.
    Move { target: Position },
    /// Get in line with a confirmed wumpus and fire the arrow at it.
    Shoot { target: Position },
}

impl Task {
    pub fn target(&self) -> Position {
        match self {
            Task::Move { target } | Task::Shoot { target } => *target,
        }
    }

    pub fn reward(&self) -> f64 {
        match self {
            Task::Move { .. } => MOVE_REWARD,
            Task::Shoot { .. } => SHOOT_REWARD,
        }
    }
}

/// A task together with the path its winner resolved for it.
///
/// The path starts at the winner's position. For a Shoot task it ends at the
/// cell from which the arrow is fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardedTask {
    pub task: Task,
    pub path: Vec<Position>,
}

impl AwardedTask {
    /// The cell the agent moves to this round, `None` once it stands on the end of the path.
    pub fn next_step(&self) -> Option<Position> {
        self.path.get(1).copied()
    }
}

/// One Move task per unvisited cell not known to be deadly and, with
/// `shooting` on, one Shoot task per wumpus believed alive.
pub fn create_tasks(beliefs: &BeliefStore, shooting: bool) -> Vec<Task> {
    let cells = beliefs.cells();
    let mut tasks: Vec<Task> = cells
        .enumerate()
        .filter(|(_, flags)| !flags.visited && !flags.is_confirmed_hazard())
        .map(|(target, _)| Task::Move { target })
        .collect();

    if shooting {
        tasks.extend(
            cells
                .enumerate()
                .filter(|(_, flags)| flags.live_wumpus())
                .map(|(target, _)| Task::Shoot { target }),
        );
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::belief::Observation;

    #[test]
    fn visited_and_deadly_cells_get_no_move_task() {
        let mut beliefs = BeliefStore::new(3, 1);
        beliefs.sense(
            Position::new(0, 0),
            &Observation {
                stench: true,
                ..Observation::default()
            },
        );
        assert!(beliefs.flags(Position::new(1, 0)).wumpus);

        let tasks = create_tasks(&beliefs, false);
        assert_eq!(
            tasks,
            vec![Task::Move {
                target: Position::new(2, 0)
            }]
        );

        let with_shooting = create_tasks(&beliefs, true);
        assert_eq!(
            with_shooting,
            vec![
                Task::Move {
                    target: Position::new(2, 0)
                },
                Task::Shoot {
                    target: Position::new(1, 0)
                },
            ]
        );
    }

    #[test]
    fn dead_wumpus_is_a_move_target_again() {
        let mut beliefs = BeliefStore::new(2, 1);
        beliefs.sense(Position::new(0, 0), &Observation::default());
        beliefs.record_wumpus_death(Position::new(1, 0));

        assert_eq!(
            create_tasks(&beliefs, true),
            vec![Task::Move {
                target: Position::new(1, 0)
            }]
        );
    }

    #[test]
    fn rewards_are_fixed_per_kind() {
        let target = Position::new(4, 4);
        assert_eq!(Task::Move { target }.reward(), 1.0);
        assert_eq!(Task::Shoot { target }.reward(), 10.0);
    }
}
