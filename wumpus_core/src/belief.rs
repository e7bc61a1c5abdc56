//! Shared knowledge the explorers hold about the hidden board.
//!
//! Every visited cell records the signals sensed there. Breeze and stench are
//! handled one kind at a time. A signal that no confirmed hazard explains
//! marks the plausible neighbours as suspects; when more than one neighbour
//! is plausible they form a [`DangerGroup`], a set known to hold exactly one
//! unresolved hazard of that kind. Groups shrink as members are
//! ruled out and collapse into a confirmed hazard once a single member is
//! left.
//!
//! Confirmed flags (`pit`, `wumpus`, `dead_wumpus`) are never cleared.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Position, map::Grid};

/// A set of hazard kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hazards {
    pub pit: bool,
    pub wumpus: bool,
}

impl Hazards {
    pub const NONE: Hazards = Hazards {
        pit: false,
        wumpus: false,
    };
    pub const PIT: Hazards = Hazards {
        pit: true,
        wumpus: false,
    };
    pub const WUMPUS: Hazards = Hazards {
        pit: false,
        wumpus: true,
    };

    #[inline]
    pub fn any(self) -> bool {
        self.pit || self.wumpus
    }

    #[inline]
    pub fn overlaps(self, other: Hazards) -> bool {
        (self.pit && other.pit) || (self.wumpus && other.wumpus)
    }

    #[inline]
    pub fn intersect(self, other: Hazards) -> Hazards {
        Hazards {
            pit: self.pit && other.pit,
            wumpus: self.wumpus && other.wumpus,
        }
    }

    #[inline]
    pub fn union(self, other: Hazards) -> Hazards {
        Hazards {
            pit: self.pit || other.pit,
            wumpus: self.wumpus || other.wumpus,
        }
    }

    #[inline]
    pub fn minus(self, other: Hazards) -> Hazards {
        Hazards {
            pit: self.pit && !other.pit,
            wumpus: self.wumpus && !other.wumpus,
        }
    }
}

/// Everything the explorers believe about one cell. Absent knowledge is `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeliefFlags {
    pub visited: bool,
    pub breeze: bool,
    pub stench: bool,
    pub potential_pit: bool,
    pub potential_wumpus: bool,
    pub pit: bool,
    pub wumpus: bool,
    pub dead_wumpus: bool,
}

impl BeliefFlags {
    #[inline]
    pub fn live_wumpus(&self) -> bool {
        self.wumpus && !self.dead_wumpus
    }

    /// A pit or a wumpus that is still alive.
    #[inline]
    pub fn is_confirmed_hazard(&self) -> bool {
        self.pit || self.live_wumpus()
    }

    #[inline]
    pub fn is_potential_hazard(&self) -> bool {
        self.potential_pit || self.potential_wumpus
    }

    /// Whether a planner may enter the cell. Suspected cells are only
    /// passable in risky mode; confirmed hazards never are.
    #[inline]
    pub fn is_passable(&self, risky: bool) -> bool {
        !self.is_confirmed_hazard() && (risky || !self.is_potential_hazard())
    }

    /// The hazard kinds this cell is currently suspected of.
    #[inline]
    pub fn suspicion(&self) -> Hazards {
        Hazards {
            pit: self.potential_pit,
            wumpus: self.potential_wumpus,
        }
    }

    /// The hazard kinds confirmed here, counting a dead wumpus.
    #[inline]
    fn confirmed(&self) -> Hazards {
        Hazards {
            pit: self.pit,
            wumpus: self.wumpus || self.dead_wumpus,
        }
    }
}

/// What an agent learned at its own cell, either from a plain percept or
/// from the result of executing a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub breeze: bool,
    pub stench: bool,
    /// The agent fell into a pit here.
    pub pit: bool,
    /// The agent was eaten by a live wumpus here.
    pub wumpus: bool,
    pub wumpus_died_at: Option<Position>,
}

impl Observation {
    /// Hazard kinds the sensed signals point at.
    #[inline]
    pub fn signals(&self) -> Hazards {
        Hazards {
            pit: self.breeze,
            wumpus: self.stench,
        }
    }

    #[inline]
    fn hazards_here(&self) -> Hazards {
        Hazards {
            pit: self.pit,
            wumpus: self.wumpus,
        }
    }
}

pub type GroupId = usize;

/// Cells which jointly hold exactly one unresolved hazard of one kind.
///
/// Every member carries the potential flag of `suspects`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerGroup {
    pub id: GroupId,
    /// The visited cell whose signal produced the group.
    pub source: Position,
    /// The single hazard kind the group tracks.
    pub suspects: Hazards,
    pub members: BTreeSet<Position>,
}

/// Belief flags for every cell plus the open danger groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeliefStore {
    cells: Grid<BeliefFlags>,
    groups: BTreeMap<GroupId, DangerGroup>,
    next_group_id: GroupId,
}

impl BeliefStore {
    pub fn new(width: usize, height: usize) -> Self {
        BeliefStore {
            cells: Grid::new(width, height),
            groups: BTreeMap::new(),
            next_group_id: 0,
        }
    }

    pub fn cells(&self) -> &Grid<BeliefFlags> {
        &self.cells
    }

    /// Flags for `position`, all `false` when out of bounds.
    pub fn flags(&self, position: Position) -> BeliefFlags {
        self.cells.get(position).copied().unwrap_or_default()
    }

    pub fn is_visited(&self, position: Position) -> bool {
        self.flags(position).visited
    }

    pub fn visited_count(&self) -> usize {
        self.cells.enumerate().filter(|(_, flags)| flags.visited).count()
    }

    pub fn groups(&self) -> impl Iterator<Item = &DangerGroup> {
        self.groups.values()
    }

    /// Folds what an agent observed at `position` into the shared beliefs and
    /// propagates the inference to its neighbours.
    ///
    /// Sensing the same observation twice leaves the store unchanged.
    pub fn sense(&mut self, position: Position, observation: &Observation) {
        let Some(cell) = self.cells.get_mut(position) else {
            warn!(%position, "ignoring observation outside the board");
            return;
        };
        cell.visited = true;
        cell.breeze = observation.breeze;
        cell.stench = observation.stench;

        if let Some(dead) = observation.wumpus_died_at {
            self.record_wumpus_death(dead);
        }

        let here = observation.hazards_here();
        if here.any() {
            self.confirm(position, here);
        } else {
            self.rule_out(position);
        }

        let signals = observation.signals();
        if signals.any() {
            self.suspect_neighbors(position, signals);
        } else {
            self.clear_neighbors(position);
        }
    }

    /// Marks a killed wumpus. The `wumpus` flag stays set next to `dead_wumpus`.
    pub fn record_wumpus_death(&mut self, position: Position) {
        if !self.cells.contains(position) {
            warn!(%position, "ignoring wumpus death outside the board");
            return;
        }
        self.confirm(position, Hazards::WUMPUS);
        self.cells[position].dead_wumpus = true;
        debug!(%position, "wumpus killed");
    }

    fn suspect_neighbors(&mut self, source: Position, signals: Hazards) {
        for kind in [Hazards::PIT, Hazards::WUMPUS] {
            if signals.overlaps(kind) {
                self.suspect_kind(source, kind);
            }
        }
    }

    /// Spreads suspicion of one hazard `kind` from `source` to the neighbours
    /// that could hold it. Each kind gets its own group.
    fn suspect_kind(&mut self, source: Position, kind: Hazards) {
        let neighbors: Vec<Position> = self.cells.neighbors(source).collect();
        if neighbors
            .iter()
            .any(|n| self.cells[*n].confirmed().overlaps(kind))
        {
            debug!(%source, ?kind, "signal explained by confirmed hazard");
            return;
        }

        let candidates: Vec<Position> = neighbors
            .into_iter()
            .filter(|n| !self.cells[*n].visited && !self.contradicted(*n).overlaps(kind))
            .collect();

        match candidates.as_slice() {
            [] => {
                debug!(%source, ?kind, "no candidate can explain the signal");
            }
            [only] => {
                debug!(%source, position = %only, ?kind, "single candidate promoted");
                self.confirm(*only, kind);
            }
            _ => {
                for position in &candidates {
                    let cell = &mut self.cells[*position];
                    cell.potential_pit |= kind.pit;
                    cell.potential_wumpus |= kind.wumpus;
                }
                let members: BTreeSet<Position> = candidates.into_iter().collect();
                let duplicate = self
                    .groups
                    .values()
                    .any(|g| g.suspects == kind && g.members == members);
                if !duplicate {
                    self.open_group(source, kind, members);
                }
            }
        }
    }

    /// Hazard kinds ruled out at `position` by a visited neighbour that
    /// lacks the matching signal.
    fn contradicted(&self, position: Position) -> Hazards {
        self.cells
            .neighbors(position)
            .map(|n| self.cells[n])
            .filter(|flags| flags.visited)
            .fold(Hazards::NONE, |acc, flags| {
                acc.union(Hazards {
                    pit: !flags.breeze,
                    wumpus: !flags.stench,
                })
            })
    }

    fn clear_neighbors(&mut self, position: Position) {
        let neighbors: Vec<Position> = self.cells.neighbors(position).collect();
        for neighbor in neighbors {
            if self.cells[neighbor].is_potential_hazard() {
                self.rule_out(neighbor);
            }
        }
    }

    fn open_group(&mut self, source: Position, suspects: Hazards, members: BTreeSet<Position>) {
        let id = self.next_group_id;
        self.next_group_id += 1;
        debug!(id, %source, ?suspects, size = members.len(), "danger group opened");
        self.groups.insert(
            id,
            DangerGroup {
                id,
                source,
                suspects,
                members,
            },
        );
    }

    fn groups_containing(&self, position: Position) -> Vec<GroupId> {
        self.groups
            .values()
            .filter(|g| g.members.contains(&position))
            .map(|g| g.id)
            .collect()
    }

    /// `position` holds no hazard at all.
    fn rule_out(&mut self, position: Position) {
        let cell = &mut self.cells[position];
        cell.potential_pit = false;
        cell.potential_wumpus = false;
        for id in self.groups_containing(position) {
            self.remove_member(id, position);
        }
    }

    /// `position` holds `hazards`. Groups tracking that kind are resolved by
    /// it. Suspicion of the other kind is left alone.
    fn confirm(&mut self, position: Position, hazards: Hazards) {
        let cell = &mut self.cells[position];
        if hazards.pit {
            cell.pit = true;
            cell.potential_pit = false;
        }
        if hazards.wumpus {
            cell.wumpus = true;
            cell.potential_wumpus = false;
        }
        debug!(%position, ?hazards, "hazard confirmed");

        for id in self.groups_containing(position) {
            let resolved = self
                .groups
                .get(&id)
                .is_some_and(|group| group.suspects.overlaps(hazards));
            if resolved {
                self.resolve(id, position);
            }
        }
    }

    /// Dissolves a group whose hazard was found at `hazard`. The remaining
    /// members lose the group's suspicion unless another group still holds it.
    fn resolve(&mut self, id: GroupId, hazard: Position) {
        let Some(group) = self.groups.remove(&id) else {
            return;
        };
        debug!(id, position = %hazard, "danger group resolved");
        for member in group.members.iter().filter(|m| **m != hazard) {
            let held = self.held_by_groups(*member);
            let cleared = group.suspects.minus(held);
            let cell = &mut self.cells[*member];
            if cleared.pit {
                cell.potential_pit = false;
            }
            if cleared.wumpus {
                cell.potential_wumpus = false;
            }
        }
    }

    /// Suspicion still backed by an open group.
    fn held_by_groups(&self, position: Position) -> Hazards {
        self.groups
            .values()
            .filter(|g| g.members.contains(&position))
            .fold(Hazards::NONE, |acc, g| acc.union(g.suspects))
    }

    fn remove_member(&mut self, id: GroupId, position: Position) {
        let Some(group) = self.groups.get_mut(&id) else {
            return;
        };
        group.members.remove(&position);

        match group.members.len() {
            0 => {
                self.groups.remove(&id);
                debug!(id, "danger group emptied");
            }
            1 => {
                let Some(group) = self.groups.remove(&id) else {
                    return;
                };
                let Some(last) = group.members.first().copied() else {
                    return;
                };
                self.collapse(group, last);
            }
            _ => {}
        }
    }

    /// A group shrank to `last`. Promote it with the suspicion it still
    /// carries, skipping kinds a confirmed hazard next to the source already
    /// explains.
    fn collapse(&mut self, group: DangerGroup, last: Position) {
        let explained = self
            .cells
            .neighbors(group.source)
            .filter(|n| *n != last)
            .fold(Hazards::NONE, |acc, n| acc.union(self.cells[n].confirmed()));
        let suspicion = self.cells[last].suspicion().intersect(group.suspects);
        let promoted = suspicion.minus(explained);

        if promoted.any() {
            debug!(id = group.id, position = %last, ?promoted, "danger group collapsed");
            self.confirm(last, promoted);
        } else {
            debug!(
                id = group.id,
                position = %last,
                "danger group dissolved, hazard explained elsewhere"
            );
        }
    }
}
