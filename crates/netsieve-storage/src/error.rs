//! Object log error types.

use thiserror::Error;

/// Errors that can occur while appending to or reading from the object log.
#[derive(Debug, Error)]
pub enum LogError {
    /// IO error from the backing store.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record at `offset` is structurally invalid.
    #[error("Invalid record at offset {offset}: {reason}")]
    Decode { offset: u64, reason: String },

    /// Record at `offset` carries a type tag outside the known set.
    #[error("Unknown object type {value} at offset {offset}")]
    UnknownObjectType { offset: u64, value: i32 },

    /// Record at `offset` runs past the end of the log.
    #[error("Truncated record at offset {offset}")]
    Truncated { offset: u64 },

    /// Object has a stream or stream count too large for the record format.
    #[error("Object too large for the log record format")]
    TooLarge,
}

/// Result type for log operations.
pub type Result<T> = std::result::Result<T, LogError>;
