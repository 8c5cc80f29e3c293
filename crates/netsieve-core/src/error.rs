//! Error types for the object model and inspection rules.

use thiserror::Error;

/// Errors raised while reading, rewriting, or inspecting protocol objects.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Stream index is outside the object's declared stream count.
    #[error("stream index {index} out of range (object has {count} streams)")]
    StreamIndex {
        /// Requested index.
        index: usize,
        /// Number of streams the object carries.
        count: usize,
    },

    /// Attempted to mutate a read-only object.
    #[error("object is read-only")]
    ReadOnly,

    /// Malformed or short stream data.
    #[error("decode error: {0}")]
    Decode(String),

    /// IO error from a stream or decompressor.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, FilterError>;
