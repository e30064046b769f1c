//! Error types for trace construction and delivery.
//!
//! None of these ever reach a tracer's caller: delivery failures are absorbed
//! by the sender once retries run out.

use thiserror::Error;

/// Result type alias for trace operations.
pub type Result<T> = std::result::Result<T, TraceError>;

/// Errors that can occur while building or delivering traces.
#[derive(Debug, Error)]
pub enum TraceError {
    /// Malformed trace record or configuration, rejected before any network attempt.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Connection, DNS or timeout failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The collector answered with a status other than the expected one.
    #[error("Unexpected status: {status}")]
    UnexpectedStatus { status: u16 },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid sender configuration (e.g. a header value that is not valid HTTP).
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for TraceError {
    fn from(e: reqwest::Error) -> Self {
        TraceError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(e: serde_json::Error) -> Self {
        TraceError::Serialization(e.to_string())
    }
}
