//! Error types for the simulation core

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading levels, configuring players, or persisting models.
///
/// Simulation ticks never return errors: violated occupancy invariants are
/// programming errors and are caught by debug assertions instead.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PacmanError {
    #[error("invalid map symbol '{symbol}' at ({x}, {y})")]
    InvalidMapSymbol { symbol: char, x: usize, y: usize },

    #[error("map is empty")]
    EmptyMap,

    #[error("map has {actual} symbols but its dimensions require {expected}")]
    MapSizeMismatch { expected: usize, actual: usize },

    #[error("no saved model for map '{map_id}' at {path:?}")]
    ModelNotFound { map_id: String, path: PathBuf },

    #[error("invalid player number: {0}")]
    InvalidPlayerNumber(u8),

    #[error("no agent with index {0}")]
    UnknownAgent(usize),

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to {operation}: {message}")]
    Serialization { operation: String, message: String },
}

impl PacmanError {
    /// True for conditions a caller can reasonably recover from.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PacmanError::ModelNotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, PacmanError>;
