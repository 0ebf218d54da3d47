use tracing::debug;

use crate::{
    Direction, EntityId, PacmanError, Result,
    config::GameConfig,
    game_state::{GameState, GameStatus, PlayerSetup, TickOutcome},
    input::InputQueue,
    map::Level,
    q_learning::QLearningAgent,
    state_repr::StateRepr,
};

/// One learning transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningStep {
    pub action: Direction,
    pub outcome: TickOutcome,
    /// Value of Q(s, action) after the update
    pub value: f64,
}

/// How a played-out game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeSummary {
    /// `Ongoing` when the tick budget ran out first
    pub status: GameStatus,
    pub score: i64,
    pub ticks: u64,
    pub food_eaten: usize,
    pub ghosts_killed: usize,
}

/// A game in progress together with the input it reads from.
#[derive(Debug)]
pub struct GameSession {
    level: Level,
    players: PlayerSetup,
    state: GameState,
    input: InputQueue,
}

impl GameSession {
    pub fn initialize(level: Level, players: PlayerSetup, config: GameConfig) -> Result<Self> {
        let state = GameState::from_level(&level, players, config)?;
        debug!(level = %level.id, ?players, "session initialized");
        Ok(Self {
            level,
            players,
            state,
            input: InputQueue::new(),
        })
    }

    /// Starts the level over with new rules, dropping pending input.
    pub fn restart(&mut self, config: GameConfig) -> Result<()> {
        self.state = GameState::from_level(&self.level, self.players, config)?;
        self.input.clear();
        Ok(())
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn input_mut(&mut self) -> &mut InputQueue {
        &mut self.input
    }

    pub fn tick(&mut self) -> TickOutcome {
        self.state.tick(&mut self.input)
    }

    pub fn is_game_over(&self) -> bool {
        self.state.is_game_over()
    }

    pub fn status(&self) -> GameStatus {
        self.state.status()
    }

    pub fn score(&self) -> i64 {
        self.state.score()
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.state.elapsed_ticks()
    }

    pub fn state_snapshot(&self) -> StateRepr {
        self.state.snapshot()
    }

    pub fn set_injected_action(&mut self, agent: EntityId, direction: Direction) -> Result<()> {
        self.state.set_injected_action(agent, direction)
    }

    pub fn available_actions(&self, agent: EntityId) -> Result<Vec<Direction>> {
        self.state.available_directions(agent)
    }

    fn learner_id(&self) -> Result<EntityId> {
        self.state
            .pacman_ids()
            .first()
            .copied()
            .ok_or(PacmanError::UnknownAgent(0))
    }

    /// Lets `learner` pick the first pacman's action and advances one tick,
    /// without learning from the result.
    ///
    /// Returns `None` once the game is over.
    pub fn policy_step(&mut self, learner: &mut QLearningAgent) -> Result<Option<TickOutcome>> {
        if self.is_game_over() {
            return Ok(None);
        }
        let pacman = self.learner_id()?;
        let snapshot = self.state.snapshot();
        let action = learner
            .select_action(snapshot.key(), snapshot.pacman_actions())
            .unwrap_or(Direction::None);
        self.state.set_injected_action(pacman, action)?;
        Ok(Some(self.tick()))
    }

    /// One Q-learning transition: observe, act, tick, and update the table
    /// with the score delta as reward.
    ///
    /// Returns `None` once the game is over.
    pub fn learning_step(&mut self, learner: &mut QLearningAgent) -> Result<Option<LearningStep>> {
        if self.is_game_over() {
            return Ok(None);
        }
        let pacman = self.learner_id()?;
        let snapshot = self.state.snapshot();
        let action = learner
            .select_action(snapshot.key(), snapshot.pacman_actions())
            .unwrap_or(Direction::None);
        self.state.set_injected_action(pacman, action)?;

        let outcome = self.tick();
        let next = self.state.snapshot();
        let value = learner.update_value(
            snapshot.key(),
            action,
            next.key(),
            next.pacman_actions(),
            outcome.reward as f64,
        );

        Ok(Some(LearningStep {
            action,
            outcome,
            value,
        }))
    }

    /// Learns until the game ends or `max_ticks` ticks have elapsed.
    pub fn run_episode(
        &mut self,
        learner: &mut QLearningAgent,
        max_ticks: Option<u64>,
    ) -> Result<EpisodeSummary> {
        while !self.budget_spent(max_ticks) {
            if self.learning_step(learner)?.is_none() {
                break;
            }
        }
        Ok(self.summary())
    }

    /// Plays without a learner until the game ends or the budget runs out.
    pub fn play_out(&mut self, max_ticks: Option<u64>) -> EpisodeSummary {
        while !self.is_game_over() && !self.budget_spent(max_ticks) {
            self.tick();
        }
        self.summary()
    }

    fn budget_spent(&self, max_ticks: Option<u64>) -> bool {
        max_ticks.is_some_and(|max| self.elapsed_ticks() >= max)
    }

    pub fn summary(&self) -> EpisodeSummary {
        EpisodeSummary {
            status: self.state.status(),
            score: self.state.score(),
            ticks: self.state.elapsed_ticks(),
            food_eaten: self.state.food_eaten(),
            ghosts_killed: self.state.ghosts_killed(),
        }
    }
}
