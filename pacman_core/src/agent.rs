use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};

use crate::{Direction, EntityId, PacmanError, Position, cell::Occupant, input::InputQueue};

/// Selects how an agent is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerNumber {
    Random,
    HumanOne,
    HumanTwo,
    Learned,
}

impl PlayerNumber {
    /// Input slot (1 or 2) for human players.
    pub fn human_slot(self) -> Option<u8> {
        match self {
            PlayerNumber::HumanOne => Some(1),
            PlayerNumber::HumanTwo => Some(2),
            _ => None,
        }
    }
}

impl TryFrom<u8> for PlayerNumber {
    type Error = PacmanError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PlayerNumber::Random),
            1 => Ok(PlayerNumber::HumanOne),
            2 => Ok(PlayerNumber::HumanTwo),
            3 => Ok(PlayerNumber::Learned),
            other => Err(PacmanError::InvalidPlayerNumber(other)),
        }
    }
}

/// Kind-specific agent state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentKind {
    Pacman {
        /// Remaining ticks of invulnerability
        invulnerable_timer: u32,
    },
    Ghost {
        spawn: Position,
        /// Tick number at which a dead ghost comes back
        respawn_at: Option<u64>,
    },
}

/// Holds the state of one pacman or ghost.
///
/// The position always names the grid cell that lists this agent, as long as
/// the agent is alive. Only `GameState` moves agents between cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: EntityId,
    pub position: Position,
    /// Last direction the agent decided on
    pub direction: Direction,
    pub alive: bool,
    pub player: PlayerNumber,
    /// Most recent action injected by the learning driver
    pub injected: Option<Direction>,
    pub kind: AgentKind,
}

impl AgentState {
    pub fn pacman(id: EntityId, position: Position, player: PlayerNumber) -> Self {
        Self::new(id, position, player, AgentKind::Pacman {
            invulnerable_timer: 0,
        })
    }

    pub fn ghost(id: EntityId, position: Position, player: PlayerNumber) -> Self {
        Self::new(id, position, player, AgentKind::Ghost {
            spawn: position,
            respawn_at: None,
        })
    }

    fn new(id: EntityId, position: Position, player: PlayerNumber, kind: AgentKind) -> Self {
        Self {
            id,
            position,
            direction: Direction::None,
            alive: true,
            player,
            injected: None,
            kind,
        }
    }

    pub fn is_pacman(&self) -> bool {
        matches!(self.kind, AgentKind::Pacman { .. })
    }

    pub fn is_ghost(&self) -> bool {
        matches!(self.kind, AgentKind::Ghost { .. })
    }

    /// The occupant entry this agent has in its cell.
    pub fn occupant(&self) -> Occupant {
        match self.kind {
            AgentKind::Pacman { .. } => Occupant::Pacman(self.id),
            AgentKind::Ghost { .. } => Occupant::Ghost(self.id),
        }
    }

    pub fn is_invulnerable(&self) -> bool {
        matches!(self.kind, AgentKind::Pacman { invulnerable_timer } if invulnerable_timer > 0)
    }

    pub fn invulnerable_time(&self) -> u32 {
        match self.kind {
            AgentKind::Pacman { invulnerable_timer } => invulnerable_timer,
            AgentKind::Ghost { .. } => 0,
        }
    }

    /// Grants invulnerability for `duration` ticks. Ghosts ignore powerups.
    pub fn power_up(&mut self, duration: u32) {
        if let AgentKind::Pacman { invulnerable_timer } = &mut self.kind {
            *invulnerable_timer = duration;
        }
    }

    /// Counts invulnerability down by one tick.
    pub fn wear_off(&mut self) {
        if let AgentKind::Pacman { invulnerable_timer } = &mut self.kind {
            *invulnerable_timer = invulnerable_timer.saturating_sub(1);
        }
    }

    /// Marks the agent dead. Ghosts are scheduled to return `respawn_time`
    /// ticks after `tick`. The caller removes the agent from its cell.
    pub fn kill(&mut self, tick: u64, respawn_time: u32) {
        self.alive = false;
        if let AgentKind::Ghost { respawn_at, .. } = &mut self.kind {
            *respawn_at = Some(tick + u64::from(respawn_time));
        }
    }

    /// True for a dead ghost whose respawn tick has arrived.
    pub fn respawn_due(&self, tick: u64) -> bool {
        match self.kind {
            AgentKind::Ghost {
                respawn_at: Some(at),
                ..
            } => !self.alive && tick >= at,
            _ => false,
        }
    }

    /// Ticks left before a dead ghost returns.
    pub fn respawn_remaining(&self, tick: u64) -> Option<u64> {
        match self.kind {
            AgentKind::Ghost {
                respawn_at: Some(at),
                ..
            } if !self.alive => Some(at.saturating_sub(tick)),
            _ => None,
        }
    }

    /// Brings a dead ghost back at its spawn and returns that position.
    /// The caller adds the agent to the spawn cell.
    pub fn respawn(&mut self) -> Option<Position> {
        let AgentKind::Ghost { spawn, respawn_at } = &mut self.kind else {
            return None;
        };
        *respawn_at = None;
        self.alive = true;
        self.position = *spawn;
        self.direction = Direction::None;
        Some(*spawn)
    }
}

/// Read-only view of the world handed to a controller.
#[derive(Debug)]
pub struct AgentView<'a> {
    pub agent: &'a AgentState,
    /// Cardinal directions not blocked by a wall
    pub available: &'a [Direction],
}

/// Strategy deciding the direction an agent attempts each tick.
pub trait Controller {
    /// `&mut self` lets a controller keep its own state (e.g. an RNG).
    fn choose_direction(&mut self, view: &AgentView, input: &mut InputQueue) -> Direction;
}

/// Builds the controller matching an agent's player number.
pub fn controller_for(player: PlayerNumber, seed: Option<u64>) -> Box<dyn Controller> {
    match player {
        PlayerNumber::Random => Box::new(match seed {
            Some(seed) => RandomWalker::new(seed),
            None => RandomWalker::from_os_rng(),
        }),
        PlayerNumber::HumanOne | PlayerNumber::HumanTwo => Box::new(HumanControl),
        PlayerNumber::Learned => Box::new(LearnedControl),
    }
}

/// Wanders randomly, avoiding turning straight back.
#[derive(Debug)]
pub struct RandomWalker {
    rng: StdRng,
}

impl RandomWalker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Controller for RandomWalker {
    fn choose_direction(&mut self, view: &AgentView, _input: &mut InputQueue) -> Direction {
        let reverse = view.agent.direction.opposite();
        let forward: Vec<Direction> = view
            .available
            .iter()
            .copied()
            .filter(|direction| *direction != reverse)
            .collect();
        let candidates = if forward.is_empty() {
            view.available
        } else {
            &forward[..]
        };
        candidates
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Direction::None)
    }
}

/// Follows keyboard commands from the agent's input slot.
#[derive(Debug, Default)]
pub struct HumanControl;

impl Controller for HumanControl {
    fn choose_direction(&mut self, view: &AgentView, input: &mut InputQueue) -> Direction {
        match input.take(view.agent.player) {
            Some(command)
                if command == Direction::None || view.available.contains(&command) =>
            {
                command
            }
            // Blocked or missing commands keep the current heading.
            _ => view.agent.direction,
        }
    }
}

/// Replays the action injected by the learning driver.
#[derive(Debug, Default)]
pub struct LearnedControl;

impl Controller for LearnedControl {
    fn choose_direction(&mut self, view: &AgentView, _input: &mut InputQueue) -> Direction {
        view.agent.injected.unwrap_or(Direction::None)
    }
}
