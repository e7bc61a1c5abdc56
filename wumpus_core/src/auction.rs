//! Single-round greedy auction.
//!
//! Every living agent bids on every task from one belief snapshot. Bids are
//! awarded from the highest value down, skipping agents and tasks already
//! matched. The result is a greedy approximation, not an optimal matching.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    EntityId, Position,
    agent::{Agent, BidContext},
    belief::BeliefStore,
    pathing::{PathMap, SearchMode},
    task::{AwardedTask, Task},
};

/// One agent's valuation of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bid {
    /// Negative infinity when the agent cannot complete the task.
    pub value: f64,
    pub agent: EntityId,
    pub task: Task,
    pub path: Option<Vec<Position>>,
}

impl Bid {
    pub fn unreachable(agent: EntityId, task: Task) -> Self {
        Bid {
            value: f64::NEG_INFINITY,
            agent,
            task,
            path: None,
        }
    }
}

/// The tasks won this round, at most one per agent and one agent per task.
pub type Awards = BTreeMap<EntityId, AwardedTask>;

/// Collects a bid from every living agent for every task, sorted by value,
/// highest first. Equal values keep agent-then-task generation order.
pub fn create_bids(
    agents: &[Agent],
    tasks: &[Task],
    beliefs: &BeliefStore,
    search: SearchMode,
    spread_bonus: bool,
) -> Vec<Bid> {
    let mut bids = Vec::with_capacity(agents.len() * tasks.len());

    for agent in agents.iter().filter(|agent| agent.is_alive()) {
        let paths = PathMap::plan(beliefs, agent.position, search);
        let others: Vec<Position> = agents
            .iter()
            .filter(|other| other.is_alive() && other.id != agent.id)
            .map(|other| other.position)
            .collect();
        let context = BidContext {
            paths: &paths,
            others: &others,
            spread_bonus,
        };

        for task in tasks {
            let bid = agent.bid_for_task(task, &context);
            trace!(agent = agent.id, ?task, value = bid.value, "bid");
            bids.push(bid);
        }
    }

    // `sort_by` is stable.
    bids.sort_by(|a, b| b.value.total_cmp(&a.value));
    bids
}

/// Awards tasks from bids sorted highest first. A bid is skipped when its
/// agent already won a task, its task is already taken, or it has no path.
pub fn award_tasks(bids: Vec<Bid>) -> Awards {
    let mut awards = Awards::new();
    let mut taken: HashSet<Task> = HashSet::new();

    for bid in bids {
        if awards.contains_key(&bid.agent) || taken.contains(&bid.task) {
            continue;
        }
        let Some(path) = bid.path else {
            continue;
        };
        trace!(agent = bid.agent, task = ?bid.task, value = bid.value, "awarded");
        taken.insert(bid.task);
        awards.insert(
            bid.agent,
            AwardedTask {
                task: bid.task,
                path,
            },
        );
    }

    awards
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{belief::Observation, task::create_tasks};

    fn p(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    fn bid(value: f64, agent: EntityId, target: Position) -> Bid {
        Bid {
            value,
            agent,
            task: Task::Move { target },
            path: Some(vec![target]),
        }
    }

    #[test]
    fn higher_bid_wins_and_loser_gets_another_task() {
        let contested = p(1, 1);
        let fallback = p(3, 3);
        let mut bids = vec![
            bid(5.0, 0, contested),
            bid(1.0, 0, fallback),
            bid(3.0, 1, contested),
            bid(2.0, 1, fallback),
        ];
        bids.sort_by(|a, b| b.value.total_cmp(&a.value));

        let awards = award_tasks(bids);
        assert_eq!(awards[&0].task, Task::Move { target: contested });
        assert_eq!(awards[&1].task, Task::Move { target: fallback });
    }

    #[test]
    fn greedy_award_is_not_globally_optimal() {
        let first = p(0, 1);
        let second = p(0, 2);
        let bids = vec![
            bid(10.0, 0, first),
            bid(9.0, 0, second),
            bid(9.0, 1, first),
            bid(0.0, 1, second),
        ];

        let awards = award_tasks(bids);
        // Swapping would total 18 instead of 10.
        assert_eq!(awards[&0].task.target(), first);
        assert_eq!(awards[&1].task.target(), second);
    }

    #[test]
    fn bids_without_path_are_never_awarded() {
        let bids = vec![
            Bid::unreachable(0, Task::Move { target: p(2, 2) }),
            Bid::unreachable(1, Task::Move { target: p(2, 2) }),
        ];
        assert!(award_tasks(bids).is_empty());
    }

    #[test]
    fn each_agent_and_task_is_awarded_once() {
        let beliefs = {
            let mut beliefs = BeliefStore::new(4, 4);
            for start in [p(0, 0), p(3, 3), p(0, 3)] {
                beliefs.sense(start, &Observation::default());
            }
            beliefs
        };
        let agents = vec![
            Agent::new(0, p(0, 0), false),
            Agent::new(1, p(3, 3), false),
            Agent::new(2, p(0, 3), false),
        ];
        let tasks = create_tasks(&beliefs, false);
        let bids = create_bids(&agents, &tasks, &beliefs, SearchMode::BreadthFirst, true);
        assert!(bids.windows(2).all(|pair| pair[0].value >= pair[1].value));

        let awards = award_tasks(bids);
        assert_eq!(awards.len(), 3);
        let targets: HashSet<_> = awards.values().map(|awarded| awarded.task).collect();
        assert_eq!(targets.len(), 3);
        for (agent, awarded) in &awards {
            assert_eq!(awarded.path.first(), Some(&agents[*agent].position));
            assert_eq!(awarded.path.last(), Some(&awarded.task.target()));
        }
    }

    #[test]
    fn each_agent_wins_the_task_next_to_it() {
        let mut beliefs = BeliefStore::new(5, 1);
        beliefs.sense(p(0, 0), &Observation::default());
        beliefs.sense(p(3, 0), &Observation::default());
        let agents = vec![Agent::new(0, p(0, 0), false), Agent::new(1, p(3, 0), false)];
        let tasks = vec![Task::Move { target: p(2, 0) }, Task::Move { target: p(1, 0) }];

        let bids = create_bids(&agents, &tasks, &beliefs, SearchMode::BreadthFirst, false);
        let awards = award_tasks(bids);

        // Both zero-value bids win; the -1 bids find their tasks taken.
        assert_eq!(awards[&1].task, Task::Move { target: p(2, 0) });
        assert_eq!(awards[&0].task, Task::Move { target: p(1, 0) });
    }

    #[test]
    fn dead_agents_do_not_bid() {
        let beliefs = BeliefStore::new(3, 3);
        let mut dead = Agent::new(0, p(0, 0), false);
        dead.kill();
        let agents = vec![dead, Agent::new(1, p(2, 2), false)];
        let tasks = vec![Task::Move { target: p(1, 1) }];

        let bids = create_bids(&agents, &tasks, &beliefs, SearchMode::BreadthFirst, false);
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].agent, 1);
    }
}
