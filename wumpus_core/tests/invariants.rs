use std::collections::HashSet;

use proptest::prelude::*;
use rand::{SeedableRng, rngs::StdRng};
use wumpus_core::{
    BeliefFlags, Hazards, Position, RoundOutcome, SearchMode, SimConfig, Simulation, Task, award_tasks,
    create_bids, create_tasks,
};

const ROUNDS: usize = 60;

fn search_mode() -> impl Strategy<Value = SearchMode> {
    prop_oneof![
        Just(SearchMode::BreadthFirst),
        Just(SearchMode::Weighted { risky: false }),
        Just(SearchMode::Weighted { risky: true }),
    ]
}

prop_compose! {
    fn sim_config()(
        grid_size in 4usize..8,
        agent_count in 1usize..4,
        wumpus_count in 0usize..3,
        pit_count in 0usize..5,
        shooting in any::<bool>(),
        search in search_mode(),
        spread_bonus in any::<bool>(),
        seed in any::<u64>(),
    ) -> SimConfig {
        SimConfig {
            grid_size,
            agent_count,
            wumpus_count,
            pit_count,
            gold_count: 1,
            shooting,
            search,
            spread_bonus,
            max_rounds: ROUNDS,
            seed: Some(seed),
        }
    }
}

fn generate(config: &SimConfig) -> Option<Simulation> {
    let seed = config.seed.unwrap_or_default();
    Simulation::generate(config.clone(), &mut StdRng::seed_from_u64(seed)).ok()
}

fn confirmed(flags: &BeliefFlags) -> (bool, bool, bool) {
    (flags.pit, flags.wumpus, flags.dead_wumpus)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn confirmed_flags_are_never_cleared(config in sim_config()) {
        let Some(mut sim) = generate(&config) else {
            return Ok(());
        };

        for _ in 0..ROUNDS {
            let before: Vec<(Position, (bool, bool, bool))> = sim
                .beliefs()
                .cells()
                .enumerate()
                .map(|(position, flags)| (position, confirmed(flags)))
                .collect();

            let outcome = sim.step();

            for (position, (pit, wumpus, dead)) in before {
                let after = sim.beliefs().flags(position);
                prop_assert!(!pit || after.pit, "pit cleared at {}", position);
                prop_assert!(!wumpus || after.wumpus, "wumpus cleared at {}", position);
                prop_assert!(!dead || after.dead_wumpus, "dead wumpus cleared at {}", position);
            }
            if outcome != RoundOutcome::Continue {
                break;
            }
        }
    }

    #[test]
    fn confirmed_cells_are_not_suspects(config in sim_config()) {
        let Some(mut sim) = generate(&config) else {
            return Ok(());
        };

        for _ in 0..ROUNDS {
            let outcome = sim.step();
            for (position, flags) in sim.beliefs().cells().enumerate() {
                prop_assert!(!(flags.pit && flags.potential_pit), "pit at {} still suspected", position);
                prop_assert!(
                    !(flags.wumpus && flags.potential_wumpus),
                    "wumpus at {} still suspected",
                    position
                );
            }
            if outcome != RoundOutcome::Continue {
                break;
            }
        }
    }

    #[test]
    fn open_groups_are_backed_by_member_flags(config in sim_config()) {
        let Some(mut sim) = generate(&config) else {
            return Ok(());
        };

        for _ in 0..ROUNDS {
            let outcome = sim.step();
            let beliefs = sim.beliefs();

            for group in beliefs.groups() {
                prop_assert!(
                    group.suspects == Hazards::PIT || group.suspects == Hazards::WUMPUS,
                    "group {} tracks {:?}",
                    group.id,
                    group.suspects
                );
                prop_assert!(group.members.len() >= 2, "group {} has collapsed", group.id);
                for member in &group.members {
                    let flags = beliefs.flags(*member);
                    prop_assert_eq!(
                        flags.suspicion().intersect(group.suspects),
                        group.suspects,
                        "{} lacks the flag of group {}",
                        member,
                        group.id
                    );
                    // A member found to hold the hazard resolves the group.
                    let holds = Hazards {
                        pit: flags.pit,
                        wumpus: flags.wumpus,
                    };
                    prop_assert!(
                        !holds.overlaps(group.suspects),
                        "group {} still open although {} holds its hazard",
                        group.id,
                        member
                    );
                }
            }

            if outcome != RoundOutcome::Continue {
                break;
            }
        }
    }

    #[test]
    fn awards_are_injective_and_start_at_the_winner(config in sim_config()) {
        let Some(mut sim) = generate(&config) else {
            return Ok(());
        };

        for _ in 0..ROUNDS {
            let tasks = create_tasks(sim.beliefs(), config.shooting);
            let bids = create_bids(sim.agents(), &tasks, sim.beliefs(), config.search, config.spread_bonus);
            prop_assert!(bids.windows(2).all(|pair| pair[0].value >= pair[1].value));

            let awards = award_tasks(bids);
            let mut taken = HashSet::new();
            for (id, awarded) in &awards {
                let agent = &sim.agents()[*id];
                prop_assert!(agent.is_alive());
                prop_assert!(taken.insert(awarded.task), "{:?} awarded twice", awarded.task);
                prop_assert_eq!(awarded.path.first(), Some(&agent.position));
                let end = awarded.path.last().copied();
                match awarded.task {
                    Task::Move { target } => {
                        prop_assert_eq!(end, Some(target));
                    }
                    Task::Shoot { target } => {
                        prop_assert!(agent.has_arrow);
                        prop_assert!(end.is_some_and(|end| end.is_aligned_with(&target)));
                    }
                }
            }

            if sim.step() != RoundOutcome::Continue {
                break;
            }
        }
    }

    #[test]
    fn dead_agents_stay_dead(config in sim_config()) {
        let Some(mut sim) = generate(&config) else {
            return Ok(());
        };

        let mut dead: HashSet<usize> = HashSet::new();
        for _ in 0..ROUNDS {
            let outcome = sim.step();
            for agent in sim.agents() {
                if dead.contains(&agent.id) {
                    prop_assert!(!agent.is_alive(), "agent {} came back", agent.id);
                } else if !agent.is_alive() {
                    dead.insert(agent.id);
                }
            }
            if outcome != RoundOutcome::Continue {
                break;
            }
        }
    }
}
