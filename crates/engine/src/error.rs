//! Error types for the rotation engine.

use std::io;

use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, SinkError>;

/// Errors surfaced by the sink facades.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Invalid options or data directory, rejected at open.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The artifact factory failed. At open this aborts construction; on
    /// rotation it stays sticky on the sink until `close`.
    #[error("artifact factory failed for generation {generation}")]
    Factory {
        generation: u64,
        #[source]
        source: io::Error,
    },

    /// The underlying artifact rejected a write. Surfaced per call; the
    /// sink stays usable.
    #[error("write failed on generation {generation}")]
    Write {
        generation: u64,
        #[source]
        source: io::Error,
    },

    /// Flushing or closing the artifact failed. The first error wins; any
    /// later closer errors are logged.
    #[error("close failed")]
    Close(#[source] io::Error),

    /// The sink was already closed.
    #[error("sink already closed")]
    AlreadyClosed,
}

impl SinkError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// A factory failure that persists until the sink is closed.
///
/// `io::Error` is not `Clone`, so the fault keeps the rendered message and
/// rebuilds an error for every write that trips over it.
#[derive(Debug, Clone)]
pub(crate) struct StickyFault {
    pub generation: u64,
    pub message: String,
}

impl StickyFault {
    pub(crate) fn new(generation: u64, source: &io::Error) -> Self {
        Self {
            generation,
            message: source.to_string(),
        }
    }

    pub(crate) fn to_error(&self) -> SinkError {
        SinkError::Factory {
            generation: self.generation,
            source: io::Error::other(self.message.clone()),
        }
    }
}
