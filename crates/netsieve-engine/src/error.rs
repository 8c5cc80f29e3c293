//! Error types for the filter engine.

use thiserror::Error;

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Inspection or object model error.
    #[error("Filter error: {0}")]
    Filter(#[from] netsieve_core::FilterError),

    /// Object log error.
    #[error("Log error: {0}")]
    Log(#[from] netsieve_storage::LogError),

    /// The collaborator failed to put an object on the wire.
    #[error("Failed to post object on connection {connection_id}: {reason}")]
    Post { connection_id: u64, reason: String },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
