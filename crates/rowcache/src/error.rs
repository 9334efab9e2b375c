//! Error types for rowcache

use std::fmt;

/// Result type alias for rowcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
///
/// A missing key is not an error: lookups return `Option` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No usable slot could be found in the key's row (degenerate table)
    TableFull,

    /// The scheduler's request queue has been closed
    QueueClosed,

    /// Construction-time configuration was rejected
    InvalidConfig(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TableFull => write!(f, "Hash index row has no usable slot"),
            Error::QueueClosed => write!(f, "Request queue is closed"),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
