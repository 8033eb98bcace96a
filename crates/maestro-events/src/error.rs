//! Error types for maestro-events

use thiserror::Error;

/// Event subsystem error
#[derive(Debug, Error)]
pub enum Error {
    /// Version conflict or listener-limit violation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Aggregate or snapshot not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backing store failure
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
