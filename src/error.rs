use std::path::PathBuf;
use thiserror::Error;

use crate::driver::Role;

// =============================================================================
// Configuration errors
// =============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("buffer capacity must be at least 1, got 0")]
    ZeroCapacity,

    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {message}")]
    Parse { message: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse {
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Buffer operation errors
// =============================================================================

/// Failure to place a value into the buffer. The value is handed back.
#[derive(Error, PartialEq, Eq)]
pub enum ProduceError<T> {
    #[error("produce cancelled while waiting for a free slot")]
    Cancelled(T),

    #[error("buffer is full")]
    Full(T),

    #[error("buffer closed: the consumer has finished")]
    Closed(T),
}

impl<T> ProduceError<T> {
    pub fn into_inner(self) -> T {
        match self {
            ProduceError::Cancelled(value)
            | ProduceError::Full(value)
            | ProduceError::Closed(value) => value,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProduceError::Cancelled(_))
    }
}

// Manual impl so `T` does not need to be `Debug`.
impl<T> std::fmt::Debug for ProduceError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProduceError::Cancelled(_) => f.write_str("Cancelled(..)"),
            ProduceError::Full(_) => f.write_str("Full(..)"),
            ProduceError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeError {
    #[error("consume cancelled while waiting for an item")]
    Cancelled,

    #[error("buffer is empty")]
    Empty,

    #[error("buffer closed and drained: the producer has finished")]
    Closed,
}

/// Returned by [`CancelToken::sleep`](crate::CancelToken::sleep) when the
/// token fires before the delay elapses.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("sleep interrupted by cancellation")]
pub struct Cancelled;

// =============================================================================
// Session errors
// =============================================================================

#[derive(Error, Debug)]
pub enum HandoffError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn {role} thread: {source}")]
    Spawn {
        role: Role,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} thread panicked")]
    DriverPanicked { role: Role },
}

pub type Result<T, E = HandoffError> = std::result::Result<T, E>;
