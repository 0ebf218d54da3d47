use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{EntityId, Position, agent::AgentState, map::MapSymbol};

/// Anything that can sit in a grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occupant {
    Wall,
    Food,
    Powerup,
    Pacman(EntityId),
    Ghost(EntityId),
}

impl Occupant {
    /// Bit flag of this occupant in a cell code.
    pub fn code(self) -> u8 {
        match self {
            Occupant::Wall => 1,
            Occupant::Food => 2,
            Occupant::Powerup => 4,
            Occupant::Pacman(_) => 8,
            Occupant::Ghost(_) => 16,
        }
    }

    /// Static occupant placed by a map symbol. Spawn symbols place agents,
    /// which the game state adds separately.
    pub fn from_symbol(symbol: MapSymbol) -> Option<Occupant> {
        match symbol {
            MapSymbol::Wall => Some(Occupant::Wall),
            MapSymbol::Food => Some(Occupant::Food),
            MapSymbol::Powerup => Some(Occupant::Powerup),
            MapSymbol::Floor | MapSymbol::PacmanSpawn | MapSymbol::GhostSpawn => None,
        }
    }
}

/// What happened when a cell resolved its occupants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resolution {
    pub ghosts_killed: usize,
    pub pacmen_killed: usize,
    pub food_eaten: bool,
    pub powerup_taken: bool,
}

/// Parameters a cell needs to apply interactions.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext {
    /// Number of the tick being processed
    pub tick: u64,
    pub powerup_time: u32,
    pub respawn_time: u32,
}

/// One map cell and its occupants, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    position: Position,
    occupants: Vec<Occupant>,
}

impl GridCell {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            occupants: Vec::new(),
        }
    }

    pub fn occupants(&self) -> &[Occupant] {
        &self.occupants
    }

    pub fn add(&mut self, occupant: Occupant) {
        self.occupants.push(occupant);
    }

    /// Removes one instance of `occupant`; returns whether it was present.
    pub fn remove(&mut self, occupant: Occupant) -> bool {
        match self.occupants.iter().position(|o| *o == occupant) {
            Some(index) => {
                self.occupants.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, occupant: Occupant) -> bool {
        self.occupants.contains(&occupant)
    }

    pub fn has_wall(&self) -> bool {
        self.contains(Occupant::Wall)
    }

    pub fn has_food(&self) -> bool {
        self.contains(Occupant::Food)
    }

    pub fn has_powerup(&self) -> bool {
        self.contains(Occupant::Powerup)
    }

    pub fn pacmen(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.occupants.iter().filter_map(|o| match o {
            Occupant::Pacman(id) => Some(*id),
            _ => None,
        })
    }

    pub fn ghosts(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.occupants.iter().filter_map(|o| match o {
            Occupant::Ghost(id) => Some(*id),
            _ => None,
        })
    }

    pub fn has_pacman(&self) -> bool {
        self.pacmen().next().is_some()
    }

    pub fn has_ghost(&self) -> bool {
        self.ghosts().next().is_some()
    }

    /// Compact occupancy code: OR of the flags of every occupant kind present.
    pub fn code(&self) -> u8 {
        self.occupants.iter().fold(0, |code, o| code | o.code())
    }

    /// Map character drawn for this cell; agents hide items beneath them.
    pub fn symbol(&self) -> char {
        let symbol = if self.has_pacman() {
            MapSymbol::PacmanSpawn
        } else if self.has_ghost() {
            MapSymbol::GhostSpawn
        } else if self.has_wall() {
            MapSymbol::Wall
        } else if self.has_powerup() {
            MapSymbol::Powerup
        } else if self.has_food() {
            MapSymbol::Food
        } else {
            MapSymbol::Floor
        };
        symbol.as_char()
    }

    /// Applies same-cell interactions: predation, then food, then powerups.
    ///
    /// `agents` is the full roster, indexed by agent id. Agents killed here
    /// are marked dead and removed from this cell.
    pub fn resolve(&mut self, agents: &mut [AgentState], ctx: ResolveContext) -> Resolution {
        let mut resolution = Resolution::default();
        let pacmen: Vec<EntityId> = self.pacmen().collect();
        let ghosts: Vec<EntityId> = self.ghosts().collect();

        if !pacmen.is_empty() && !ghosts.is_empty() {
            if pacmen.iter().any(|&id| agents[id].is_invulnerable()) {
                for id in ghosts {
                    agents[id].kill(ctx.tick, ctx.respawn_time);
                    self.remove(Occupant::Ghost(id));
                    resolution.ghosts_killed += 1;
                    debug!(ghost = id, x = self.position.x, y = self.position.y, "ghost eaten");
                }
            } else {
                for id in pacmen {
                    agents[id].kill(ctx.tick, ctx.respawn_time);
                    self.remove(Occupant::Pacman(id));
                    resolution.pacmen_killed += 1;
                    debug!(pacman = id, x = self.position.x, y = self.position.y, "pacman caught");
                }
            }
        }

        if self.has_pacman() && self.remove(Occupant::Food) {
            resolution.food_eaten = true;
        }

        if self.has_pacman() && self.remove(Occupant::Powerup) {
            resolution.powerup_taken = true;
            for id in self.pacmen() {
                agents[id].power_up(ctx.powerup_time);
            }
        }

        resolution
    }
}
