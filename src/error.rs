use std::io;

use thiserror::Error;

/// Unified error type for table construction and reading.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected (CRC mismatch, bad format, size mismatch, etc).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// A table writer received a key that does not sort after the previous one.
    #[error("Keys must be added in strictly increasing order: {previous:?} >= {current:?}")]
    KeysNotSorted { previous: Vec<u8>, current: Vec<u8> },

    /// Invalid configuration or argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation attempted on a writer or file that was already finished or closed.
    #[error("Closed: {0}")]
    Closed(&'static str),
}

// Iterators hand out their deferred status more than once, so the error
// must be cloneable. io::Error is not; rebuild it from kind and message.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
            Error::Corruption(msg) => Error::Corruption(msg.clone()),
            Error::KeysNotSorted { previous, current } => Error::KeysNotSorted {
                previous: previous.clone(),
                current: current.clone(),
            },
            Error::InvalidArgument(msg) => Error::InvalidArgument(msg.clone()),
            Error::Closed(what) => Error::Closed(what),
        }
    }
}

impl Error {
    /// Whether this error reports corrupted on-disk or in-stream data.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
