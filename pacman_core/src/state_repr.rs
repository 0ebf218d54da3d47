//! Canonical game-state keys for tabular learning

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::Direction;

/// Hashable encoding of everything the learner distinguishes between states.
///
/// Cells are encoded by occupant kind only, so two agents of the same kind in
/// the same cell produce the same key whatever their ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    /// One occupancy code per cell, row-major
    pub occupancy: Vec<u8>,
    pub pacman_invulnerable: bool,
}

/// Snapshot of a game state: its key plus the actions available right now.
///
/// Equality and hashing look at the key only.
#[derive(Debug, Clone)]
pub struct StateRepr {
    key: StateKey,
    pacman_actions: Vec<Direction>,
    ghost_actions: Vec<Direction>,
}

impl StateRepr {
    pub fn new(
        key: StateKey,
        pacman_actions: Vec<Direction>,
        ghost_actions: Vec<Direction>,
    ) -> Self {
        Self {
            key,
            pacman_actions,
            ghost_actions,
        }
    }

    pub fn key(&self) -> &StateKey {
        &self.key
    }

    /// Moves open to the first pacman; empty once it is dead or the game ended.
    pub fn pacman_actions(&self) -> &[Direction] {
        &self.pacman_actions
    }

    /// Moves open to the first ghost; empty while it is dead or the game ended.
    pub fn ghost_actions(&self) -> &[Direction] {
        &self.ghost_actions
    }

    pub fn is_pacman_invulnerable(&self) -> bool {
        self.key.pacman_invulnerable
    }
}

impl PartialEq for StateRepr {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for StateRepr {}

impl Hash for StateRepr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn key(occupancy: &[u8], invulnerable: bool) -> StateKey {
        StateKey {
            occupancy: occupancy.to_vec(),
            pacman_invulnerable: invulnerable,
        }
    }

    #[test]
    fn test_equality_ignores_actions() {
        let a = StateRepr::new(key(&[1, 8, 2], false), vec![Direction::Up], vec![]);
        let b = StateRepr::new(key(&[1, 8, 2], false), vec![], vec![Direction::Left]);
        assert_eq!(a, b);

        let set: HashSet<StateRepr> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_invulnerability_distinguishes_states() {
        let a = StateRepr::new(key(&[1, 8, 2], false), vec![], vec![]);
        let b = StateRepr::new(key(&[1, 8, 2], true), vec![], vec![]);
        assert_ne!(a, b);
    }
}
