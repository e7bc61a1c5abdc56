use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    EntityId, Position,
    agent::Agent,
    auction::{award_tasks, create_bids},
    belief::BeliefStore,
    config::SimConfig,
    environment::{Board, BoardError},
    task::create_tasks,
};

/// Represents the outcome of one auction round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundOutcome {
    Continue,
    /// No task could be awarded to any agent.
    Stuck,
    GoldFound { agent: EntityId },
    AllDead,
}

/// Why an episode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpisodeEnd {
    Stuck,
    GoldFound { agent: EntityId },
    AllDead,
    RoundLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub rounds: usize,
    pub deaths: usize,
    pub explored: usize,
    pub end: EpisodeEnd,
}

/// Owns the board, the agents and the shared beliefs, and runs rounds.
#[derive(Debug, Clone)]
pub struct Simulation {
    config: SimConfig,
    board: Board,
    agents: Vec<Agent>,
    beliefs: BeliefStore,
    rounds: usize,
}

impl Simulation {
    /// Places one agent on each start cell and lets it sense its surroundings.
    pub fn new(config: SimConfig, board: Board, starts: &[Position]) -> Self {
        let agents: Vec<Agent> = starts
            .iter()
            .enumerate()
            .map(|(id, start)| Agent::new(id, *start, config.shooting))
            .collect();

        let mut beliefs = BeliefStore::new(board.width(), board.height());
        for agent in &agents {
            beliefs.sense(agent.position, &board.percept(agent.position).into());
        }

        Simulation {
            config,
            board,
            agents,
            beliefs,
            rounds: 0,
        }
    }

    /// Builds a random board from `config` and places the agents on it.
    pub fn generate<R: Rng + ?Sized>(config: SimConfig, rng: &mut R) -> Result<Self, BoardError> {
        let (board, starts) = Board::generate(&config, rng)?;
        Ok(Self::new(config, board, &starts))
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Runs one round: tasks and bids from the current beliefs, then each
    /// awarded agent executes in turn and folds its outcome into the beliefs.
    pub fn step(&mut self) -> RoundOutcome {
        self.rounds += 1;

        let tasks = create_tasks(&self.beliefs, self.config.shooting);
        let bids = create_bids(
            &self.agents,
            &tasks,
            &self.beliefs,
            self.config.search,
            self.config.spread_bonus,
        );
        let awards = award_tasks(bids);
        debug!(round = self.rounds, tasks = tasks.len(), awards = awards.len(), "auction closed");

        if awards.is_empty() {
            info!(round = self.rounds, "no task could be awarded");
            return RoundOutcome::Stuck;
        }

        for agent in self.agents.iter_mut() {
            let Some(awarded) = awards.get(&agent.id) else {
                continue;
            };
            let outcome = self.board.execute(agent, awarded);
            agent.position = outcome.position;
            if outcome.arrow_used {
                agent.has_arrow = false;
            }
            if outcome.dead {
                info!(agent = agent.id, position = %agent.position, "agent died");
                agent.kill();
            }
            self.beliefs.sense(agent.position, &outcome.observation());

            if outcome.gold && agent.is_alive() {
                info!(agent = agent.id, position = %agent.position, "gold found");
                return RoundOutcome::GoldFound { agent: agent.id };
            }
        }

        if self.agents.iter().all(|agent| !agent.is_alive()) {
            return RoundOutcome::AllDead;
        }
        RoundOutcome::Continue
    }

    /// Steps until the episode ends or `max_rounds` from the config is reached.
    pub fn run_episode(&mut self) -> EpisodeSummary {
        let end = loop {
            if self.rounds >= self.config.max_rounds {
                break EpisodeEnd::RoundLimit;
            }
            match self.step() {
                RoundOutcome::Continue => {}
                RoundOutcome::Stuck => break EpisodeEnd::Stuck,
                RoundOutcome::GoldFound { agent } => break EpisodeEnd::GoldFound { agent },
                RoundOutcome::AllDead => break EpisodeEnd::AllDead,
            }
        };

        let summary = self.summary(end);
        info!(?summary, "episode finished");
        summary
    }

    /// Summarises the episode so far as ending with `end`.
    pub fn summary(&self, end: EpisodeEnd) -> EpisodeSummary {
        EpisodeSummary {
            rounds: self.rounds,
            deaths: self.agents.iter().filter(|agent| !agent.is_alive()).count(),
            explored: self.beliefs.visited_count(),
            end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{agent::AgentStatus, environment::load_board_from_string, pathing::SearchMode};

    fn p(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    fn simulation(map: &str, config: SimConfig) -> Simulation {
        let (board, starts) = load_board_from_string(map).expect("valid map");
        Simulation::new(config, board, &starts)
    }

    #[test]
    fn single_agent_explores_to_the_gold() {
        let mut sim = simulation(
            "
            ST BL BL
            BL BL BL
            BL BL GD
            ",
            SimConfig::default(),
        );

        let summary = sim.run_episode();
        assert_eq!(summary.end, EpisodeEnd::GoldFound { agent: 0 });
        assert_eq!(summary.deaths, 0);
        assert!(summary.rounds >= 4);
        assert_eq!(sim.agents()[0].position, p(2, 2));
    }

    #[test]
    fn fenced_in_agent_is_stuck() {
        let mut sim = simulation(
            "
            ST BL
            PT BL
            ",
            SimConfig::default(),
        );

        assert_eq!(sim.step(), RoundOutcome::Stuck);
        assert_eq!(sim.rounds(), 1);
        assert_eq!(sim.beliefs().groups().count(), 1);
    }

    #[test]
    fn risky_agent_steps_onto_a_suspect_and_survives() {
        let config = SimConfig {
            search: SearchMode::Weighted { risky: true },
            ..SimConfig::default()
        };
        let mut sim = simulation(
            "
            ST BL
            PT BL
            ",
            config,
        );

        assert_eq!(sim.step(), RoundOutcome::Continue);
        assert_eq!(sim.agents()[0].position, p(1, 0));
        assert!(sim.agents()[0].is_alive());
        // The quiet (1, 0) collapses the group onto (0, 1).
        assert!(sim.beliefs().flags(p(0, 1)).pit);
        assert_eq!(sim.beliefs().groups().count(), 0);
    }

    #[test]
    fn dead_agents_stay_dead_and_stop_bidding() {
        let config = SimConfig {
            search: SearchMode::Weighted { risky: true },
            ..SimConfig::default()
        };
        let mut sim = simulation(
            "
            ST PT
            BL BL
            ",
            config,
        );

        assert_eq!(sim.step(), RoundOutcome::AllDead);
        assert_eq!(sim.agents()[0].status, AgentStatus::Dead);
        let flags = sim.beliefs().flags(p(1, 0));
        assert!(flags.pit && !flags.potential_pit);
        assert!(!sim.beliefs().flags(p(0, 1)).potential_pit);

        assert_eq!(sim.step(), RoundOutcome::Stuck);
        assert_eq!(sim.agents()[0].status, AgentStatus::Dead);
    }

    #[test]
    fn agent_shoots_a_confirmed_wumpus() {
        let config = SimConfig {
            shooting: true,
            ..SimConfig::default()
        };
        let mut sim = simulation("ST BL WU", config);

        // Smell the wumpus from (1, 0); it is the only candidate.
        assert_eq!(sim.step(), RoundOutcome::Continue);
        assert_eq!(sim.agents()[0].position, p(1, 0));
        assert!(sim.beliefs().flags(p(2, 0)).live_wumpus());

        // Already in line: the arrow is fired from (1, 0).
        assert_eq!(sim.step(), RoundOutcome::Continue);
        assert!(!sim.agents()[0].has_arrow);
        let flags = sim.beliefs().flags(p(2, 0));
        assert!(flags.wumpus && flags.dead_wumpus);
        assert!(sim.board().cells()[p(2, 0)].dead_wumpus);

        // The dead wumpus cell can now be explored.
        assert_eq!(sim.step(), RoundOutcome::Continue);
        assert_eq!(sim.agents()[0].position, p(2, 0));
        assert!(sim.agents()[0].is_alive());

        assert_eq!(sim.step(), RoundOutcome::Stuck);
    }

    #[test]
    fn round_limit_ends_the_episode() {
        let config = SimConfig {
            max_rounds: 2,
            ..SimConfig::default()
        };
        let mut sim = simulation(
            "
            ST BL BL BL
            BL BL BL BL
            BL BL BL BL
            BL BL BL GD
            ",
            config,
        );

        let summary = sim.run_episode();
        assert_eq!(summary.end, EpisodeEnd::RoundLimit);
        assert_eq!(summary.rounds, 2);
        assert_eq!(summary.explored, 3);
    }

    #[test]
    fn agents_spread_out_over_distinct_targets() {
        let config = SimConfig {
            spread_bonus: true,
            ..SimConfig::default()
        };
        let mut sim = simulation(
            "
            ST BL BL BL
            BL BL BL BL
            BL BL BL BL
            BL BL BL ST
            ",
            config,
        );

        assert_eq!(sim.step(), RoundOutcome::Continue);
        let agents = sim.agents();
        assert_ne!(agents[0].position, agents[1].position);
        assert_eq!(sim.beliefs().visited_count(), 4);
    }
}
