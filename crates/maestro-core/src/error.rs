//! Error types for maestro-core
//!
//! One closed taxonomy covers the whole orchestrator. Every error carries a
//! kind so callers can branch on category without string matching, and the
//! retry loop can ask `is_retryable` directly.

use maestro_llm::CostMicros;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of an orchestrator error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Input or result failed a schema or rule
    Validation,
    /// Unknown task, mode, or project
    NotFound,
    /// Duplicate version or registration, or a switch in progress
    Conflict,
    /// Cyclic or missing agent dependency
    Unresolvable,
    /// Provider rate limit or network fault
    Transient,
    /// Wall-clock budget exceeded
    Timeout,
    /// User-requested or cascaded cancellation
    Cancelled,
    /// Cost cap reached
    CostExceeded,
    /// Provider returned an error finish
    Provider,
    /// Invariant violated
    Internal,
}

impl ErrorKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Unresolvable => "unresolvable",
            Self::Transient => "transient",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::CostExceeded => "cost_exceeded",
            Self::Provider => "provider",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Input or result failed a schema or rule
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown task, mode, or project
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate registration/version, or an operation already in progress
    #[error("conflict: {0}")]
    Conflict(String),

    /// Cyclic or missing agent dependency
    #[error("unresolvable dependency: {0}")]
    Unresolvable(String),

    /// Transient provider or network fault
    #[error("transient error: {0}")]
    Transient(String),

    /// Wall-clock budget exceeded
    #[error("timeout after {0}ms")]
    Timeout(u64),

    /// User-requested or cascaded cancellation
    #[error("cancelled")]
    Cancelled,

    /// Cumulative cost crossed the cap
    #[error("cost limit exceeded: {spent} over {limit}")]
    CostExceeded {
        /// Cost accumulated so far
        spent: CostMicros,
        /// The configured cap
        limit: CostMicros,
    },

    /// Provider returned an error
    #[error("provider error: {0}")]
    Provider(String),

    /// Invariant violated; always logged with full context
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Category of this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unresolvable(_) => ErrorKind::Unresolvable,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::CostExceeded { .. } => ErrorKind::CostExceeded,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the retry loop may absorb this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Provider(_))
    }
}

impl From<maestro_llm::Error> for Error {
    fn from(e: maestro_llm::Error) -> Self {
        match e {
            maestro_llm::Error::RateLimit | maestro_llm::Error::Network(_) => {
                Self::Transient(e.to_string())
            }
            maestro_llm::Error::Timeout(ms) => Self::Timeout(ms),
            maestro_llm::Error::InvalidOptions(msg) => Self::Validation(msg),
            other => Self::Provider(other.to_string()),
        }
    }
}

impl From<maestro_events::Error> for Error {
    fn from(e: maestro_events::Error) -> Self {
        match e {
            maestro_events::Error::Conflict(msg) => Self::Conflict(msg),
            maestro_events::Error::NotFound(msg) => Self::NotFound(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// One terminal failure recorded on a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    /// Error category
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
    /// Phase number where the failure happened, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<u32>,
    /// Agent type that failed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl TaskError {
    /// Build a record from an error with its location
    #[must_use]
    pub fn from_error(error: &Error, phase: Option<u32>, agent: Option<String>) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            phase,
            agent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Transient("rate limit".into()).is_retryable());
        assert!(Error::Provider("bad finish".into()).is_retryable());
        assert!(!Error::Validation("empty".into()).is_retryable());
        assert!(!Error::Cancelled.is_retryable());
        assert!(!Error::Timeout(1000).is_retryable());
        assert!(!Error::CostExceeded {
            spent: CostMicros::from_micros(2),
            limit: CostMicros::from_micros(1),
        }
        .is_retryable());
    }

    #[test]
    fn test_llm_error_mapping() {
        assert_eq!(
            Error::from(maestro_llm::Error::RateLimit).kind(),
            ErrorKind::Transient
        );
        assert_eq!(
            Error::from(maestro_llm::Error::Api("boom".into())).kind(),
            ErrorKind::Provider
        );
        assert_eq!(
            Error::from(maestro_llm::Error::Timeout(5)).kind(),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn test_task_error_serialization() {
        let record = TaskError {
            kind: ErrorKind::Provider,
            message: "api error".into(),
            phase: Some(4),
            agent: Some("test".into()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "provider");
        assert_eq!(json["phase"], 4);
        assert_eq!(json["agent"], "test");
    }
}
