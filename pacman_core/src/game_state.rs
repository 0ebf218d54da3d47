use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    Direction, EntityId, PacmanError, Position, Result,
    agent::{AgentState, AgentView, Controller, PlayerNumber, controller_for},
    cell::{GridCell, Occupant, Resolution, ResolveContext},
    config::GameConfig,
    input::InputQueue,
    map::{Grid, Level, MapSymbol},
    state_repr::{StateKey, StateRepr},
};

/// Win/lose state machine of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    Ongoing,
    Win,
    Lose,
}

/// Player numbers assigned to the agents of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSetup {
    /// Applies to every pacman
    pub pacman: PlayerNumber,
    /// Applies to the first ghost; the others always move randomly
    pub ghost: PlayerNumber,
}

impl Default for PlayerSetup {
    fn default() -> Self {
        Self {
            pacman: PlayerNumber::Random,
            ghost: PlayerNumber::Random,
        }
    }
}

impl PlayerSetup {
    /// Pacman driven by injected actions, ghosts random.
    pub fn learner() -> Self {
        Self {
            pacman: PlayerNumber::Learned,
            ghost: PlayerNumber::Random,
        }
    }
}

/// Everything that happened during one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Score delta produced by the tick
    pub reward: i64,
    pub status: GameStatus,
    pub food_eaten: usize,
    pub ghosts_killed: usize,
    pub pacmen_killed: usize,
    pub ghosts_respawned: usize,
}

impl TickOutcome {
    fn idle(status: GameStatus) -> Self {
        Self {
            reward: 0,
            status,
            food_eaten: 0,
            ghosts_killed: 0,
            pacmen_killed: 0,
            ghosts_respawned: 0,
        }
    }

    fn record(&mut self, resolution: Resolution) {
        self.food_eaten += usize::from(resolution.food_eaten);
        self.ghosts_killed += resolution.ghosts_killed;
        self.pacmen_killed += resolution.pacmen_killed;
    }
}

/// Score of a game after `elapsed` ticks.
///
/// A lost game always scores zero.
pub fn compute_score(
    config: &GameConfig,
    elapsed: u64,
    food_eaten: usize,
    ghosts_killed: usize,
    status: GameStatus,
) -> i64 {
    if status == GameStatus::Lose {
        return 0;
    }
    // Counts on a map always fit in i64.
    -(elapsed as i64)
        + food_eaten as i64 * config.food_reward
        + ghosts_killed as i64 * config.ghost_kill_reward
}

/// Owns the grid, the agents and the counters of one game.
pub struct GameState {
    grid: Grid<GridCell>,
    agents: Vec<AgentState>,
    controllers: Vec<Box<dyn Controller>>,
    pacmen: Vec<EntityId>,
    ghosts: Vec<EntityId>,
    config: GameConfig,
    status: GameStatus,
    elapsed_ticks: u64,
    original_food: usize,
    remaining_food: usize,
    ghosts_killed: usize,
    score: i64,
    previous_score: i64,
}

impl fmt::Debug for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameState")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("agents", &self.agents)
            .field("status", &self.status)
            .field("elapsed_ticks", &self.elapsed_ticks)
            .field("remaining_food", &self.remaining_food)
            .field("score", &self.score)
            .finish_non_exhaustive()
    }
}

impl GameState {
    /// Builds a game from the row-major map symbols of a `width` x `height` level.
    pub fn new(
        width: usize,
        height: usize,
        symbols: &str,
        players: PlayerSetup,
        config: GameConfig,
    ) -> Result<Self> {
        let expected = width * height;
        let actual = symbols.chars().count();
        if expected != actual {
            return Err(PacmanError::MapSizeMismatch { expected, actual });
        }
        if expected == 0 {
            return Err(PacmanError::EmptyMap);
        }

        let parsed = symbols
            .chars()
            .enumerate()
            .map(|(k, symbol)| MapSymbol::parse(symbol, k % width, k / width))
            .collect::<Result<Vec<_>>>()?;

        let mut grid = Grid::from_generator(width, height, GridCell::new);
        let mut agents: Vec<AgentState> = Vec::new();
        let mut food = 0;

        for (k, symbol) in parsed.into_iter().enumerate() {
            let position = Position::new(k % width, k / width);
            let id = agents.len();
            let agent = match symbol {
                MapSymbol::PacmanSpawn => Some(AgentState::pacman(id, position, players.pacman)),
                MapSymbol::GhostSpawn => {
                    let first = !agents.iter().any(AgentState::is_ghost);
                    let player = if first {
                        players.ghost
                    } else {
                        PlayerNumber::Random
                    };
                    Some(AgentState::ghost(id, position, player))
                }
                _ => None,
            };
            if let Some(agent) = agent {
                grid[position].add(agent.occupant());
                agents.push(agent);
            }
            if let Some(occupant) = Occupant::from_symbol(symbol) {
                food += usize::from(occupant == Occupant::Food);
                grid[position].add(occupant);
            }
        }

        let controllers = agents
            .iter()
            .map(|agent| {
                let seed = config.seed.map(|seed| seed.wrapping_add(agent.id as u64));
                controller_for(agent.player, seed)
            })
            .collect();
        let pacmen = agents.iter().filter(|a| a.is_pacman()).map(|a| a.id).collect();
        let ghosts = agents.iter().filter(|a| a.is_ghost()).map(|a| a.id).collect();

        debug!(width, height, agents = agents.len(), food, "game state loaded");

        Ok(Self {
            grid,
            agents,
            controllers,
            pacmen,
            ghosts,
            config,
            status: GameStatus::Ongoing,
            elapsed_ticks: 0,
            original_food: food,
            remaining_food: food,
            ghosts_killed: 0,
            score: 0,
            previous_score: 0,
        })
    }

    pub fn from_level(level: &Level, players: PlayerSetup, config: GameConfig) -> Result<Self> {
        Self::new(level.width, level.height, &level.symbols, players, config)
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn grid(&self) -> &Grid<GridCell> {
        &self.grid
    }

    pub fn agents(&self) -> &[AgentState] {
        &self.agents
    }

    pub fn agent(&self, id: EntityId) -> Result<&AgentState> {
        self.agents.get(id).ok_or(PacmanError::UnknownAgent(id))
    }

    pub fn pacman_ids(&self) -> &[EntityId] {
        &self.pacmen
    }

    pub fn ghost_ids(&self) -> &[EntityId] {
        &self.ghosts
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn is_game_over(&self) -> bool {
        self.status != GameStatus::Ongoing
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    /// Score change produced by the last tick.
    pub fn reward(&self) -> i64 {
        self.score - self.previous_score
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.elapsed_ticks
    }

    pub fn original_food(&self) -> usize {
        self.original_food
    }

    pub fn remaining_food(&self) -> usize {
        self.remaining_food
    }

    pub fn food_eaten(&self) -> usize {
        self.original_food - self.remaining_food
    }

    pub fn ghosts_killed(&self) -> usize {
        self.ghosts_killed
    }

    pub fn is_pacman_invulnerable(&self) -> bool {
        self.pacmen.iter().any(|&id| self.agents[id].is_invulnerable())
    }

    /// Longest invulnerability left among the pacmen.
    pub fn pacman_invulnerable_time(&self) -> u32 {
        self.pacmen
            .iter()
            .map(|&id| self.agents[id].invulnerable_time())
            .max()
            .unwrap_or(0)
    }

    fn directions_from(&self, position: Position) -> Vec<Direction> {
        Direction::CARDINAL
            .into_iter()
            .filter(|&direction| {
                position
                    .step(direction)
                    .and_then(|target| self.grid.get(target))
                    .is_some_and(|cell| !cell.has_wall())
            })
            .collect()
    }

    /// Cardinal directions the agent could move in right now.
    pub fn available_directions(&self, id: EntityId) -> Result<Vec<Direction>> {
        let agent = self.agent(id)?;
        Ok(self.directions_from(agent.position))
    }

    /// Sets the action a learned-control agent applies on the next ticks.
    pub fn set_injected_action(&mut self, id: EntityId, direction: Direction) -> Result<()> {
        let agent = self.agents.get_mut(id).ok_or(PacmanError::UnknownAgent(id))?;
        agent.injected = Some(direction);
        Ok(())
    }

    /// Canonical snapshot of the current state.
    pub fn snapshot(&self) -> StateRepr {
        let key = StateKey {
            occupancy: self.grid.iter().map(GridCell::code).collect(),
            pacman_invulnerable: self.is_pacman_invulnerable(),
        };
        let actions = |id: Option<&EntityId>| match id.map(|&id| &self.agents[id]) {
            Some(agent) if agent.alive && !self.is_game_over() => {
                self.directions_from(agent.position)
            }
            _ => Vec::new(),
        };
        StateRepr::new(key, actions(self.pacmen.first()), actions(self.ghosts.first()))
    }

    /// Advances the game by one tick. Does nothing once the game is over.
    pub fn tick(&mut self, input: &mut InputQueue) -> TickOutcome {
        if self.is_game_over() {
            return TickOutcome::idle(self.status);
        }

        let ctx = ResolveContext {
            tick: self.elapsed_ticks + 1,
            powerup_time: self.config.powerup_time,
            respawn_time: self.config.respawn_time,
        };
        let mut outcome = TickOutcome::idle(self.status);
        self.previous_score = self.score;

        // Pacmen act first so they get to eat before ghosts close in.
        for index in 0..self.pacmen.len() {
            let id = self.pacmen[index];
            if self.agents[id].alive {
                let resolution = self.update_agent(id, input, ctx);
                outcome.record(resolution);
                self.agents[id].wear_off();
            }
        }
        self.update_status();

        if !self.is_game_over() {
            for index in 0..self.ghosts.len() {
                let id = self.ghosts[index];
                if self.agents[id].alive {
                    let resolution = self.update_agent(id, input, ctx);
                    outcome.record(resolution);
                } else if self.agents[id].respawn_due(ctx.tick) {
                    self.respawn_ghost(id);
                    outcome.ghosts_respawned += 1;
                }
            }
            self.update_status();
        }

        self.elapsed_ticks = ctx.tick;
        self.score = compute_score(
            &self.config,
            self.elapsed_ticks,
            self.food_eaten(),
            self.ghosts_killed,
            self.status,
        );

        debug_assert!(self.check_invariants(), "occupancy invariant violated");

        outcome.reward = self.reward();
        outcome.status = self.status;
        outcome
    }

    /// Decides, moves and resolves one live agent.
    fn update_agent(
        &mut self,
        id: EntityId,
        input: &mut InputQueue,
        ctx: ResolveContext,
    ) -> Resolution {
        let available = self.directions_from(self.agents[id].position);
        let view = AgentView {
            agent: &self.agents[id],
            available: &available,
        };
        let direction = self.controllers[id].choose_direction(&view, input);
        self.agents[id].direction = direction;

        let destination = self.move_agent(id, direction);
        let resolution = self.grid[destination].resolve(&mut self.agents, ctx);

        self.remaining_food -= usize::from(resolution.food_eaten);
        self.ghosts_killed += resolution.ghosts_killed;
        resolution
    }

    /// Moves an agent one step unless a wall or the map edge is in the way,
    /// and returns where it ends up.
    fn move_agent(&mut self, id: EntityId, direction: Direction) -> Position {
        let agent = &self.agents[id];
        let from = agent.position;
        let target = from
            .step(direction)
            .filter(|&to| to != from)
            .filter(|&to| self.grid.get(to).is_some_and(|cell| !cell.has_wall()));
        let Some(to) = target else {
            return from;
        };

        let occupant = agent.occupant();
        let removed = self.grid[from].remove(occupant);
        debug_assert!(removed, "agent {id} missing from its cell");
        self.grid[to].add(occupant);
        self.agents[id].position = to;
        to
    }

    fn respawn_ghost(&mut self, id: EntityId) {
        if let Some(spawn) = self.agents[id].respawn() {
            self.grid[spawn].add(Occupant::Ghost(id));
            debug!(ghost = id, x = spawn.x, y = spawn.y, "ghost respawned");
        }
    }

    fn update_status(&mut self) {
        let status = if self.pacmen.iter().all(|&id| !self.agents[id].alive) {
            GameStatus::Lose
        } else if self.remaining_food == 0 {
            GameStatus::Win
        } else {
            GameStatus::Ongoing
        };
        if status != self.status {
            debug!(?status, tick = self.elapsed_ticks + 1, "game status changed");
            self.status = status;
        }
    }

    /// Verifies that every live agent is listed by exactly the cell at its
    /// position, that dead agents are listed nowhere, and that the food count
    /// matches the grid.
    pub fn check_invariants(&self) -> bool {
        let mut listed = vec![0usize; self.agents.len()];
        let mut food = 0;
        for (position, cell) in self.grid.enumerate() {
            for &occupant in cell.occupants() {
                match occupant {
                    Occupant::Pacman(id) | Occupant::Ghost(id) => {
                        let Some(agent) = self.agents.get(id) else {
                            return false;
                        };
                        let misplaced = agent.position != position || agent.occupant() != occupant;
                        if !agent.alive || misplaced {
                            return false;
                        }
                        listed[id] += 1;
                    }
                    Occupant::Food => food += 1,
                    Occupant::Wall | Occupant::Powerup => {}
                }
            }
        }
        food == self.remaining_food
            && self.remaining_food <= self.original_food
            && self
                .agents
                .iter()
                .all(|agent| listed[agent.id] == usize::from(agent.alive))
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in self.grid.rows() {
            let line: String = row.iter().map(GridCell::symbol).collect();
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game(rows: &[&str], players: PlayerSetup) -> GameState {
        let width = rows[0].len();
        GameState::new(
            width,
            rows.len(),
            &rows.concat(),
            players,
            GameConfig::seeded(11),
        )
        .unwrap()
    }

    fn both_learned() -> PlayerSetup {
        PlayerSetup {
            pacman: PlayerNumber::Learned,
            ghost: PlayerNumber::Learned,
        }
    }

    #[test]
    fn test_load_counts_and_roster() {
        let state = game(&["#####", "#P*M#", "#@* #", "#####"], PlayerSetup::default());
        assert_eq!(state.original_food(), 2);
        assert_eq!(state.remaining_food(), 2);
        assert_eq!(state.pacman_ids(), &[0]);
        assert_eq!(state.ghost_ids(), &[1]);
        assert_eq!(state.status(), GameStatus::Ongoing);
        assert!(state.check_invariants());
        assert_eq!(state.to_string(), "#####\n#P*M#\n#@* #\n#####\n");
    }

    #[test]
    fn test_only_first_ghost_takes_ghost_player() {
        let state = game(&["#####", "#PMM#", "#*  #", "#####"], both_learned());
        assert_eq!(state.agents()[1].player, PlayerNumber::Learned);
        assert_eq!(state.agents()[2].player, PlayerNumber::Random);
    }

    #[test]
    fn test_invalid_symbol_fails_load() {
        let err = GameState::new(3, 1, "#x#", PlayerSetup::default(), GameConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PacmanError::InvalidMapSymbol {
                symbol: 'x',
                x: 1,
                y: 0
            }
        ));
    }

    #[test]
    fn test_size_mismatch_fails_load() {
        let err = GameState::new(3, 2, "#P*", PlayerSetup::default(), GameConfig::default())
            .unwrap_err();
        assert!(matches!(
            err,
            PacmanError::MapSizeMismatch {
                expected: 6,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_available_directions_exclude_walls() {
        let state = game(&["#####", "#P  #", "# ###", "#####"], PlayerSetup::default());
        assert_eq!(
            state.available_directions(0).unwrap(),
            vec![Direction::Down, Direction::Right]
        );
        assert!(matches!(
            state.available_directions(9),
            Err(PacmanError::UnknownAgent(9))
        ));
    }

    #[test]
    fn test_score_formula() {
        let config = GameConfig::default();
        assert_eq!(compute_score(&config, 5, 3, 1, GameStatus::Ongoing), 225);
        assert_eq!(compute_score(&config, 5, 3, 1, GameStatus::Win), 225);
        assert_eq!(compute_score(&config, 5, 3, 1, GameStatus::Lose), 0);
    }

    #[test]
    fn test_eating_and_winning() {
        let rows = ["######", "#P*@*#", "######", "##M###", "######"];
        let mut state = game(&rows, PlayerSetup::learner());
        let mut input = InputQueue::new();
        state.set_injected_action(0, Direction::Right).unwrap();

        let first = state.tick(&mut input);
        assert_eq!(first.food_eaten, 1);
        assert_eq!(first.reward, 9);
        assert_eq!(state.score(), 9);

        let second = state.tick(&mut input);
        assert_eq!(second.reward, -1);
        assert!(state.is_pacman_invulnerable());
        assert_eq!(state.pacman_invulnerable_time(), 39);

        let third = state.tick(&mut input);
        assert_eq!(third.status, GameStatus::Win);
        assert_eq!(state.remaining_food(), 0);
        assert_eq!(state.score(), -3 + 20);
        assert!(state.check_invariants());
    }

    #[test]
    fn test_finished_game_ignores_ticks() {
        let rows = ["#####", "#P*##", "#####", "##M##", "#####"];
        let mut state = game(&rows, PlayerSetup::learner());
        let mut input = InputQueue::new();
        state.set_injected_action(0, Direction::Right).unwrap();
        state.tick(&mut input);
        assert_eq!(state.status(), GameStatus::Win);
        let score = state.score();

        let outcome = state.tick(&mut input);
        assert_eq!(outcome.reward, 0);
        assert_eq!(state.elapsed_ticks(), 1);
        assert_eq!(state.score(), score);
        assert_eq!(state.status(), GameStatus::Win);
    }

    #[test]
    fn test_ghost_catches_pacman_and_score_drops_to_zero() {
        let mut state = game(&["#####", "#P M#", "#*###", "#####"], PlayerSetup::learner());
        let mut input = InputQueue::new();
        state.set_injected_action(0, Direction::Right).unwrap();

        let outcome = state.tick(&mut input);

        assert_eq!(outcome.pacmen_killed, 1);
        assert_eq!(outcome.status, GameStatus::Lose);
        assert_eq!(state.score(), 0);
        assert!(!state.agents()[0].alive);
        assert!(state.agents()[1].alive);
        assert_eq!(state.agents()[1].position, Position::new(2, 1));
        assert_eq!(state.ghosts_killed(), 0);
        assert!(state.check_invariants());
        assert!(state.snapshot().pacman_actions().is_empty());
    }

    #[test]
    fn test_eaten_ghost_respawns_after_delay() {
        let mut state = game(&["######", "#P@ M#", "#*####", "######"], both_learned());
        let mut input = InputQueue::new();
        state.set_injected_action(0, Direction::Right).unwrap();
        state.set_injected_action(1, Direction::Left).unwrap();

        state.tick(&mut input);
        assert_eq!(state.agents()[1].position, Position::new(3, 1));

        let outcome = state.tick(&mut input);
        assert_eq!(outcome.ghosts_killed, 1);
        assert_eq!(state.score(), -2 + 200);
        assert!(!state.agents()[1].alive);
        let death_tick = state.elapsed_ticks();

        state.set_injected_action(0, Direction::None).unwrap();
        while state.elapsed_ticks() < death_tick + 29 {
            state.tick(&mut input);
            assert!(!state.agents()[1].alive);
        }

        let outcome = state.tick(&mut input);
        assert_eq!(state.elapsed_ticks(), death_tick + 30);
        assert_eq!(outcome.ghosts_respawned, 1);
        assert!(state.agents()[1].alive);
        assert_eq!(state.agents()[1].position, Position::new(4, 1));
        assert!(state.check_invariants());
    }

    #[test]
    fn test_ghosts_hold_still_when_pacman_walks_into_one() {
        let rows = ["#######", "#PM   #", "#*##M #", "#######"];
        let mut state = game(&rows, PlayerSetup::learner());
        let mut input = InputQueue::new();
        assert_eq!(state.agents()[2].player, PlayerNumber::Random);
        assert!(!state.available_directions(2).unwrap().is_empty());
        state.set_injected_action(0, Direction::Right).unwrap();

        let outcome = state.tick(&mut input);

        assert_eq!(outcome.pacmen_killed, 1);
        assert_eq!(outcome.status, GameStatus::Lose);
        assert_eq!(state.score(), 0);
        assert_eq!(state.elapsed_ticks(), 1);
        assert_eq!(state.agents()[1].position, Position::new(2, 1));
        assert_eq!(state.agents()[2].position, Position::new(4, 2));
        assert!(state.check_invariants());
    }

    #[test]
    fn test_snapshot_encodes_cells() {
        let state = game(&["####", "#P*#", "####"], PlayerSetup::default());
        let snapshot = state.snapshot();
        assert_eq!(
            snapshot.key().occupancy,
            vec![1, 1, 1, 1, 1, 8, 2, 1, 1, 1, 1, 1]
        );
        assert!(!snapshot.is_pacman_invulnerable());
        assert_eq!(snapshot.pacman_actions(), &[Direction::Right]);
        assert!(snapshot.ghost_actions().is_empty());
    }

    #[test]
    fn test_blocked_injected_action_stays_in_place() {
        let mut state = game(&["#####", "#P*M#", "#####"], both_learned());
        let mut input = InputQueue::new();
        state.set_injected_action(0, Direction::Up).unwrap();
        state.set_injected_action(1, Direction::Down).unwrap();
        state.tick(&mut input);
        assert_eq!(state.agents()[0].position, Position::new(1, 1));
        assert_eq!(state.agents()[1].position, Position::new(3, 1));
        assert_eq!(state.reward(), -1);
    }
}
