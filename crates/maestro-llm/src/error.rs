//! Error types for maestro-llm

use thiserror::Error;

/// Provider error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// API error
    #[error("api error: {0}")]
    Api(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimit,

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Invalid generation options
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// Duplicate provider registration
    #[error("provider already registered: {0}")]
    Duplicate(String),
}

impl Error {
    /// Whether the retry loop may absorb this error
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
