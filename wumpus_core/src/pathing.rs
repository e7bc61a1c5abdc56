use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, VecDeque},
};

use serde::{Deserialize, Serialize};

use crate::{
    Position,
    belief::{BeliefFlags, BeliefStore},
};

/// Cost of stepping onto a suspected cell in risky mode.
pub const RISKY_STEP_COST: u32 = 1000;
/// Cost of stepping onto any other passable cell.
pub const STEP_COST: u32 = 1;

/// Which planner agents use to reach their targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Uniform-cost search over certified-safe cells.
    #[default]
    BreadthFirst,
    /// Dijkstra. With `risky` set, suspected cells are passable at
    /// [`RISKY_STEP_COST`] per step instead of excluded.
    Weighted { risky: bool },
}

/// Cost of entering a cell, `None` if it is excluded.
fn step_cost(flags: &BeliefFlags, risky: bool) -> Option<u32> {
    if !flags.is_passable(risky) {
        None
    } else if flags.is_potential_hazard() {
        Some(RISKY_STEP_COST)
    } else {
        Some(STEP_COST)
    }
}

/// Predecessor and cost-so-far maps from one start cell to every cell it can reach.
#[derive(Debug, Clone)]
pub struct PathMap {
    start: Position,
    came_from: HashMap<Position, Position>,
    cost_so_far: HashMap<Position, u32>,
    /// Cells in the order they were first reached, start included.
    order: Vec<Position>,
}

impl PathMap {
    fn rooted_at(start: Position) -> Self {
        PathMap {
            start,
            came_from: HashMap::new(),
            cost_so_far: HashMap::from([(start, 0)]),
            order: vec![start],
        }
    }

    /// Plans from `start` with the given `mode` over the current beliefs.
    pub fn plan(beliefs: &BeliefStore, start: Position, mode: SearchMode) -> Self {
        match mode {
            SearchMode::BreadthFirst => Self::breadth_first(beliefs, start),
            SearchMode::Weighted { risky } => Self::weighted(beliefs, start, risky),
        }
    }

    /// Breadth-first expansion that never enters a confirmed or suspected hazard.
    pub fn breadth_first(beliefs: &BeliefStore, start: Position) -> Self {
        let mut map = Self::rooted_at(start);
        let mut queue = VecDeque::from([start]);
        let cells = beliefs.cells();

        while let Some(current) = queue.pop_front() {
            let depth = map.cost_so_far[&current];
            for neighbor in cells.neighbors(current) {
                if map.cost_so_far.contains_key(&neighbor) {
                    continue;
                }
                if step_cost(&cells[neighbor], false).is_none() {
                    continue;
                }
                map.came_from.insert(neighbor, current);
                map.cost_so_far.insert(neighbor, depth + 1);
                map.order.push(neighbor);
                queue.push_back(neighbor);
            }
        }

        map
    }

    /// Dijkstra expansion. Equal-cost frontier entries pop in insertion order.
    pub fn weighted(beliefs: &BeliefStore, start: Position, risky: bool) -> Self {
        #[derive(Clone, Eq, PartialEq)]
        struct Frontier {
            cost: u32,
            sequence: usize,
            position: Position,
        }

        impl Ord for Frontier {
            fn cmp(&self, other: &Self) -> Ordering {
                // Cheapest first, then oldest.
                other
                    .cost
                    .cmp(&self.cost)
                    .then_with(|| other.sequence.cmp(&self.sequence))
            }
        }

        impl PartialOrd for Frontier {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut map = Self::rooted_at(start);
        let cells = beliefs.cells();
        let mut sequence = 0;
        let mut frontier = BinaryHeap::from([Frontier {
            cost: 0,
            sequence,
            position: start,
        }]);

        while let Some(Frontier {
            cost,
            position: current,
            ..
        }) = frontier.pop()
        {
            if map.cost_so_far.get(&current).is_some_and(|best| cost > *best) {
                continue;
            }

            for neighbor in cells.neighbors(current) {
                let Some(step) = step_cost(&cells[neighbor], risky) else {
                    continue;
                };
                let new_cost = cost + step;
                let improved = match map.cost_so_far.get(&neighbor) {
                    Some(known) => new_cost < *known,
                    None => {
                        map.order.push(neighbor);
                        true
                    }
                };
                if improved {
                    map.cost_so_far.insert(neighbor, new_cost);
                    map.came_from.insert(neighbor, current);
                    sequence += 1;
                    frontier.push(Frontier {
                        cost: new_cost,
                        sequence,
                        position: neighbor,
                    });
                }
            }
        }

        map
    }

    pub fn contains(&self, position: Position) -> bool {
        self.cost_so_far.contains_key(&position)
    }

    /// Reachable cells in discovery order.
    pub fn reachable(&self) -> impl Iterator<Item = Position> + '_ {
        self.order.iter().copied()
    }

    /// Accumulated step cost to `goal`.
    pub fn cost_to(&self, goal: Position) -> Option<u32> {
        self.cost_so_far.get(&goal).copied()
    }

    /// Walks the predecessors back from `goal`. The path starts at the start
    /// cell and ends at `goal`; `None` if `goal` was never reached.
    pub fn path_to(&self, goal: Position) -> Option<Vec<Position>> {
        if !self.contains(goal) {
            return None;
        }

        let mut path = vec![goal];
        let mut current = goal;
        while current != self.start {
            current = *self.came_from.get(&current)?;
            path.push(current);
        }

        path.reverse();
        Some(path)
    }

    /// The reachable cell sharing a row or column with `target` whose path is
    /// shortest. Ties go to the cell discovered first.
    pub fn nearest_aligned(&self, target: Position) -> Option<(Position, Vec<Position>)> {
        let mut best: Option<(Position, Vec<Position>)> = None;

        for candidate in self.reachable() {
            if candidate == target || !candidate.is_aligned_with(&target) {
                continue;
            }
            let Some(path) = self.path_to(candidate) else {
                continue;
            };
            let shorter = best
                .as_ref()
                .is_none_or(|(_, best_path)| path.len() < best_path.len());
            if shorter {
                best = Some((candidate, path));
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::belief::Observation;

    fn p(x: usize, y: usize) -> Position {
        Position::new(x, y)
    }

    /// A breeze at (2, 2) with no prior knowledge leaves its four neighbours suspected.
    fn suspected_cross() -> BeliefStore {
        let mut beliefs = BeliefStore::new(5, 5);
        beliefs.sense(
            p(2, 2),
            &Observation {
                breeze: true,
                ..Observation::default()
            },
        );
        beliefs
    }

    #[test]
    fn breadth_first_path_counts_edges() {
        let beliefs = BeliefStore::new(4, 4);
        let map = PathMap::breadth_first(&beliefs, p(0, 0));

        let path = map.path_to(p(2, 1)).expect("reachable");
        assert_eq!(path.first(), Some(&p(0, 0)));
        assert_eq!(path.last(), Some(&p(2, 1)));
        assert_eq!(path.len(), 4);
        assert_eq!(map.cost_to(p(2, 1)), Some(3));
    }

    #[test]
    fn suspected_cells_are_excluded_from_breadth_first() {
        let beliefs = suspected_cross();
        let map = PathMap::breadth_first(&beliefs, p(2, 2));

        assert_eq!(map.reachable().collect::<Vec<_>>(), vec![p(2, 2)]);
        assert_eq!(map.path_to(p(0, 0)), None);
    }

    #[test]
    fn weighted_without_risk_reaches_the_same_cells() {
        let beliefs = suspected_cross();
        for start in [p(0, 0), p(2, 2), p(4, 1)] {
            let bfs: HashSet<_> = PathMap::breadth_first(&beliefs, start).reachable().collect();
            let weighted: HashSet<_> = PathMap::weighted(&beliefs, start, false)
                .reachable()
                .collect();
            assert_eq!(bfs, weighted, "start {start}");
        }
    }

    #[test]
    fn risky_steps_cost_a_thousand() {
        let beliefs = suspected_cross();
        let map = PathMap::weighted(&beliefs, p(2, 2), true);

        assert_eq!(map.cost_to(p(3, 2)), Some(RISKY_STEP_COST));
        assert_eq!(map.cost_to(p(4, 2)), Some(RISKY_STEP_COST + STEP_COST));
    }

    #[test]
    fn risky_search_prefers_a_safe_detour() {
        let beliefs = suspected_cross();
        let map = PathMap::weighted(&beliefs, p(1, 1), true);

        // (1, 2) and (2, 1) are suspected; the way round through column 0 is cheaper.
        let cost = map.cost_to(p(1, 3)).expect("reachable");
        assert_eq!(cost, 4);
        let path = map.path_to(p(1, 3)).expect("path");
        assert!(path.iter().all(|cell| !beliefs.flags(*cell).is_potential_hazard()));
    }

    #[test]
    fn confirmed_hazards_stay_excluded_in_risky_mode() {
        let mut beliefs = BeliefStore::new(3, 1);
        beliefs.sense(
            p(0, 0),
            &Observation {
                breeze: true,
                ..Observation::default()
            },
        );
        assert!(beliefs.flags(p(1, 0)).pit);

        let map = PathMap::weighted(&beliefs, p(0, 0), true);
        assert_eq!(map.path_to(p(2, 0)), None);
    }

    #[test]
    fn nearest_aligned_picks_shortest_path() {
        let beliefs = BeliefStore::new(5, 5);
        let map = PathMap::breadth_first(&beliefs, p(0, 0));

        let (cell, path) = map.nearest_aligned(p(3, 3)).expect("aligned cell");
        // (0, 3) and (3, 0) are both three steps away; (3, 0) is found first.
        assert_eq!(cell, p(3, 0));
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn nearest_aligned_includes_the_start() {
        let beliefs = BeliefStore::new(5, 5);
        let map = PathMap::breadth_first(&beliefs, p(0, 2));

        let (cell, path) = map.nearest_aligned(p(4, 2)).expect("aligned cell");
        assert_eq!(cell, p(0, 2));
        assert_eq!(path, vec![p(0, 2)]);
    }

    #[test]
    fn nearest_aligned_without_reachable_cell() {
        let beliefs = suspected_cross();
        let map = PathMap::breadth_first(&beliefs, p(2, 2));
        assert!(map.nearest_aligned(p(0, 0)).is_none());
    }
}
