//! Episode loop for training a Q-learning pacman on one level.

use tracing::{debug, info};

use crate::{
    Result,
    config::GameConfig,
    game_state::{GameStatus, PlayerSetup},
    map::Level,
    q_learning::QLearningAgent,
    session::{EpisodeSummary, GameSession},
};

/// Aggregate results of a batch of episodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeSummary>,
    pub table_size: usize,
}

impl TrainingReport {
    pub fn wins(&self) -> usize {
        self.count(GameStatus::Win)
    }

    pub fn losses(&self) -> usize {
        self.count(GameStatus::Lose)
    }

    /// Episodes cut off by the tick budget.
    pub fn unfinished(&self) -> usize {
        self.count(GameStatus::Ongoing)
    }

    fn count(&self, status: GameStatus) -> usize {
        self.episodes.iter().filter(|e| e.status == status).count()
    }

    pub fn mean_score(&self) -> f64 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        let total: i64 = self.episodes.iter().map(|e| e.score).sum();
        total as f64 / self.episodes.len() as f64
    }

    pub fn best_score(&self) -> Option<i64> {
        self.episodes.iter().map(|e| e.score).max()
    }
}

/// Runs episodes of one level with the first pacman under learned control.
#[derive(Debug, Clone)]
pub struct Trainer {
    level: Level,
    game_config: GameConfig,
    /// Tick budget per episode
    pub max_ticks: Option<u64>,
    /// Episodes between progress logs
    pub log_interval: usize,
}

impl Trainer {
    pub fn new(level: Level, game_config: GameConfig) -> Self {
        Self {
            level,
            game_config,
            max_ticks: Some(1000),
            log_interval: 100,
        }
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Rules for episode `episode`; seeded runs get a distinct seed per episode
    /// so ghosts do not replay the same walk.
    fn episode_config(&self, episode: usize) -> GameConfig {
        GameConfig {
            seed: self
                .game_config
                .seed
                .map(|seed| seed.wrapping_add((episode as u64) << 16)),
            ..self.game_config.clone()
        }
    }

    fn session(&self, episode: usize) -> Result<GameSession> {
        GameSession::initialize(
            self.level.clone(),
            PlayerSetup::learner(),
            self.episode_config(episode),
        )
    }

    /// Trains `learner` for `episodes` episodes.
    pub fn train(&self, learner: &mut QLearningAgent, episodes: usize) -> Result<TrainingReport> {
        let mut report = TrainingReport::default();
        for episode in 0..episodes {
            let mut session = self.session(episode)?;
            let summary = session.run_episode(learner, self.max_ticks)?;
            debug!(
                episode,
                status = ?summary.status,
                score = summary.score,
                ticks = summary.ticks,
                "episode finished"
            );
            report.episodes.push(summary);

            if self.log_interval > 0 && (episode + 1) % self.log_interval == 0 {
                let recent = &report.episodes[report.episodes.len() - self.log_interval..];
                let wins = recent.iter().filter(|e| e.status == GameStatus::Win).count();
                let mean = recent.iter().map(|e| e.score).sum::<i64>() as f64 / recent.len() as f64;
                info!(
                    episode = episode + 1,
                    wins,
                    mean_score = mean,
                    table_size = learner.table().len(),
                    "training progress"
                );
            }
        }
        report.table_size = learner.table().len();
        info!(
            level = %self.level.id,
            episodes,
            wins = report.wins(),
            losses = report.losses(),
            mean_score = report.mean_score(),
            table_size = report.table_size,
            states = learner.table().state_count(),
            "training finished"
        );
        Ok(report)
    }

    /// Plays `episodes` episodes greedily without touching the table.
    pub fn evaluate(
        &self,
        learner: &mut QLearningAgent,
        episodes: usize,
    ) -> Result<TrainingReport> {
        let epsilon = learner.config().epsilon;
        learner.set_epsilon(0.0);
        let mut report = TrainingReport::default();
        for episode in 0..episodes {
            let mut session = self.session(episode)?;
            while !session.is_game_over()
                && !self.max_ticks.is_some_and(|max| session.elapsed_ticks() >= max)
            {
                session.policy_step(learner)?;
            }
            report.episodes.push(session.summary());
        }
        learner.set_epsilon(epsilon);
        report.table_size = learner.table().len();
        Ok(report)
    }
}
