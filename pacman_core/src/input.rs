use std::collections::VecDeque;

use crate::{Direction, PacmanError, Result, agent::PlayerNumber};

/// Pending keyboard commands for the two human player slots of one session.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    slots: [VecDeque<Direction>; 2],
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(player: u8) -> Result<usize> {
        match player {
            1 | 2 => Ok(usize::from(player - 1)),
            other => Err(PacmanError::InvalidPlayerNumber(other)),
        }
    }

    /// Queues a command for human player 1 or 2.
    pub fn push(&mut self, player: u8, direction: Direction) -> Result<()> {
        let slot = Self::slot(player)?;
        self.slots[slot].push_back(direction);
        Ok(())
    }

    /// Consumes the oldest command queued for `player`.
    ///
    /// Non-human players never have commands.
    pub fn take(&mut self, player: PlayerNumber) -> Option<Direction> {
        let slot = Self::slot(player.human_slot()?).ok()?;
        self.slots[slot].pop_front()
    }

    pub fn pending(&self, player: u8) -> Result<usize> {
        Ok(self.slots[Self::slot(player)?].len())
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(VecDeque::clear);
    }
}
