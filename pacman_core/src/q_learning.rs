//! Tabular Q-learning over canonical state keys

use std::collections::HashMap;

use rand::{Rng, SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::{Direction, PacmanError, Result, config::LearningConfig, state_repr::StateKey};

/// Action values keyed by state, then action. Unseen pairs are worth 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QTable {
    values: HashMap<StateKey, HashMap<Direction, f64>>,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, state: &StateKey, action: Direction) -> f64 {
        self.values
            .get(state)
            .and_then(|actions| actions.get(&action))
            .copied()
            .unwrap_or(0.0)
    }

    /// Stores Q(state, action); the key is cloned only for a new state.
    pub fn set(&mut self, state: &StateKey, action: Direction, value: f64) {
        match self.values.get_mut(state) {
            Some(actions) => {
                actions.insert(action, value);
            }
            None => {
                self.values.insert(state.clone(), HashMap::from([(action, value)]));
            }
        }
    }

    /// Highest value over `actions`, or 0 when there are none.
    pub fn max_value(&self, state: &StateKey, actions: &[Direction]) -> f64 {
        actions
            .iter()
            .map(|&action| self.get(state, action))
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// First action in `actions` with the highest value.
    pub fn best_action(&self, state: &StateKey, actions: &[Direction]) -> Option<Direction> {
        let mut best: Option<(Direction, f64)> = None;
        for &action in actions {
            let value = self.get(state, action);
            if best.is_none_or(|(_, best_value)| value > best_value) {
                best = Some((action, value));
            }
        }
        best.map(|(action, _)| action)
    }

    /// Number of stored (state, action) pairs.
    pub fn len(&self) -> usize {
        self.values.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(HashMap::is_empty)
    }

    /// Number of distinct states with at least one stored value.
    pub fn state_count(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, Direction, f64)> {
        self.values.iter().flat_map(|(state, actions)| {
            actions.iter().map(move |(&action, &value)| (state, action, value))
        })
    }

    /// Encodes the table as an opaque MessagePack blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| PacmanError::Serialization {
            operation: "encode Q-table".to_string(),
            message: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| PacmanError::Serialization {
            operation: "decode Q-table".to_string(),
            message: e.to_string(),
        })
    }
}

/// ε-greedy learner updating its table with the one-step Q-learning rule.
#[derive(Debug)]
pub struct QLearningAgent {
    table: QTable,
    config: LearningConfig,
    rng: StdRng,
}

impl QLearningAgent {
    pub fn new(config: LearningConfig) -> Self {
        Self::with_table(config, QTable::new())
    }

    /// Continues learning from an existing table.
    pub fn with_table(config: LearningConfig, table: QTable) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { table, config, rng }
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn into_table(self) -> QTable {
        self.table
    }

    pub fn config(&self) -> &LearningConfig {
        &self.config
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.config.epsilon = epsilon;
    }

    pub fn value(&self, state: &StateKey, action: Direction) -> f64 {
        self.table.get(state, action)
    }

    /// Explores with probability ε, otherwise exploits the table.
    ///
    /// Returns `None` when `actions` is empty.
    pub fn select_action(&mut self, state: &StateKey, actions: &[Direction]) -> Option<Direction> {
        if actions.is_empty() {
            return None;
        }
        if self.rng.random::<f64>() < self.config.epsilon {
            actions.choose(&mut self.rng).copied()
        } else {
            self.table.best_action(state, actions)
        }
    }

    /// Q(s,a) ← Q(s,a) + α·(r + γ·max_a' Q(s',a') − Q(s,a))
    ///
    /// A next state without actions is terminal and contributes nothing.
    /// Returns the new value of Q(s,a).
    pub fn update_value(
        &mut self,
        state: &StateKey,
        action: Direction,
        next_state: &StateKey,
        next_actions: &[Direction],
        reward: f64,
    ) -> f64 {
        let current = self.table.get(state, action);
        let next_max = self.table.max_value(next_state, next_actions);
        let td_error = reward + self.config.gamma * next_max - current;
        let updated = current + self.config.alpha * td_error;
        self.table.set(state, action, updated);
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tag: u8) -> StateKey {
        StateKey {
            occupancy: vec![1, tag, 1],
            pacman_invulnerable: false,
        }
    }

    #[test]
    fn test_unseen_pairs_are_zero() {
        let table = QTable::new();
        assert_eq!(table.get(&key(0), Direction::Up), 0.0);
        assert_eq!(table.max_value(&key(0), &[]), 0.0);
    }

    #[test]
    fn test_best_action_prefers_first_of_ties() {
        let mut table = QTable::new();
        table.set(&key(0), Direction::Left, 2.0);
        table.set(&key(0), Direction::Right, 2.0);
        table.set(&key(0), Direction::Up, -1.0);

        let actions = [Direction::Up, Direction::Right, Direction::Left];
        assert_eq!(table.best_action(&key(0), &actions), Some(Direction::Right));
        assert_eq!(table.max_value(&key(0), &actions), 2.0);

        // All unseen: the first action wins.
        let down_first = [Direction::Down, Direction::None];
        assert_eq!(table.best_action(&key(1), &down_first), Some(Direction::Down));
        assert_eq!(table.best_action(&key(1), &[]), None);
    }

    #[test]
    fn test_negative_values_still_pick_maximum() {
        let mut table = QTable::new();
        table.set(&key(0), Direction::Up, -5.0);
        table.set(&key(0), Direction::Down, -3.0);
        assert_eq!(
            table.best_action(&key(0), &[Direction::Up, Direction::Down]),
            Some(Direction::Down)
        );
        assert_eq!(table.max_value(&key(0), &[Direction::Up, Direction::Down]), -3.0);
    }

    #[test]
    fn test_q_update_rule() {
        let mut agent = QLearningAgent::new(LearningConfig::new(1.0, 0.9, 0.0));
        let next = key(1);
        agent.table.set(&next, Direction::Left, 5.0);
        agent.table.set(&next, Direction::Right, 1.0);

        let updated = agent.update_value(
            &key(0),
            Direction::Right,
            &next,
            &[Direction::Left, Direction::Right],
            10.0,
        );

        assert!((updated - 14.5).abs() < 1e-12);
        assert!((agent.value(&key(0), Direction::Right) - 14.5).abs() < 1e-12);
    }

    #[test]
    fn test_terminal_next_state_has_no_future() {
        let mut agent = QLearningAgent::new(LearningConfig::new(0.5, 0.9, 0.0));
        agent.table.set(&key(1), Direction::Up, 100.0);
        let updated = agent.update_value(&key(0), Direction::Up, &key(1), &[], 4.0);
        assert!((updated - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_greedy_selection_follows_table() {
        let mut config = LearningConfig::new(0.1, 0.9, 0.0);
        config.seed = Some(3);
        let mut agent = QLearningAgent::new(config);
        agent.table.set(&key(0), Direction::Down, 1.0);
        for _ in 0..20 {
            assert_eq!(
                agent.select_action(&key(0), &[Direction::Up, Direction::Down]),
                Some(Direction::Down)
            );
        }
        assert_eq!(agent.select_action(&key(0), &[]), None);
    }

    #[test]
    fn test_full_exploration_stays_within_actions() {
        let mut config = LearningConfig::new(0.1, 0.9, 1.0);
        config.seed = Some(5);
        let mut agent = QLearningAgent::new(config);
        agent.table.set(&key(0), Direction::Down, 1.0);
        let actions = [Direction::Up, Direction::Down, Direction::Left];
        let mut seen = Vec::new();
        for _ in 0..200 {
            let action = agent.select_action(&key(0), &actions).unwrap();
            assert!(actions.contains(&action));
            if !seen.contains(&action) {
                seen.push(action);
            }
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut table = QTable::new();
        table.set(&key(0), Direction::Up, 0.1 + 0.2);
        table.set(&key(0), Direction::None, -7.25);
        table.set(
            &StateKey {
                occupancy: vec![1, 8, 2],
                pacman_invulnerable: true,
            },
            Direction::Left,
            f64::MIN_POSITIVE,
        );

        let restored = QTable::from_bytes(&table.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, table);
    }

    #[test]
    fn test_len_counts_pairs_across_states() {
        let mut table = QTable::new();
        assert!(table.is_empty());
        table.set(&key(0), Direction::Up, 1.0);
        table.set(&key(0), Direction::Down, 2.0);
        table.set(&key(0), Direction::Up, 3.0);
        table.set(&key(1), Direction::Left, 4.0);

        assert_eq!(table.len(), 3);
        assert_eq!(table.state_count(), 2);
        assert_eq!(table.get(&key(0), Direction::Up), 3.0);
        let mut pairs: Vec<_> = table.iter().map(|(_, action, value)| (action, value)).collect();
        pairs.sort_by(|a, b| a.1.total_cmp(&b.1));
        let expected = [(Direction::Down, 2.0), (Direction::Up, 3.0), (Direction::Left, 4.0)];
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        assert!(matches!(
            QTable::from_bytes(&[0xc1, 0x00]),
            Err(PacmanError::Serialization { .. })
        ));
    }
}
