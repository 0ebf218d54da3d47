use serde::{Deserialize, Serialize};

/// Rules of the simulation that are not part of the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Ticks of invulnerability granted by a powerup
    pub powerup_time: u32,
    /// Ticks a dead ghost waits before reappearing at its spawn
    pub respawn_time: u32,
    /// Score per food pellet eaten
    pub food_reward: i64,
    /// Score per ghost killed
    pub ghost_kill_reward: i64,
    /// Seed for the random ghost strategy; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            powerup_time: 40,
            respawn_time: 30,
            food_reward: 10,
            ghost_kill_reward: 200,
            seed: None,
        }
    }
}

impl GameConfig {
    /// Default rules with a fixed seed, for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Default::default()
        }
    }
}

/// Hyperparameters of the tabular learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    /// Learning rate α
    pub alpha: f64,
    /// Discount factor γ
    pub gamma: f64,
    /// Exploration rate ε
    pub epsilon: f64,
    /// Seed for exploration; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            gamma: 0.9,
            epsilon: 0.1,
            seed: None,
        }
    }
}

impl LearningConfig {
    pub fn new(alpha: f64, gamma: f64, epsilon: f64) -> Self {
        Self {
            alpha,
            gamma,
            epsilon,
            seed: None,
        }
    }

    /// Same hyperparameters with exploration switched off.
    pub fn greedy(&self) -> Self {
        Self {
            epsilon: 0.0,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rules() {
        let config = GameConfig::default();
        assert_eq!(config.powerup_time, 40);
        assert_eq!(config.respawn_time, 30);
        assert_eq!(config.food_reward, 10);
        assert_eq!(config.ghost_kill_reward, 200);
    }

    #[test]
    fn test_greedy_keeps_rates() {
        let config = LearningConfig::new(0.5, 0.8, 0.3).greedy();
        assert_eq!(config.alpha, 0.5);
        assert_eq!(config.gamma, 0.8);
        assert_eq!(config.epsilon, 0.0);
    }
}
