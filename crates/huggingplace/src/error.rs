//! Error types for the HuggingPlace client.

use huggingplace_trace::TraceError;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, HuggingPlaceError>;

/// Errors surfaced by the interaction-logging API.
///
/// Trace delivery never produces these: the trace sender absorbs its own
/// failures.
#[derive(Debug, Error)]
pub enum HuggingPlaceError {
    /// The credential was rejected (HTTP 401).
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Invalid configuration or request (including HTTP 400).
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Connection, DNS or timeout failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Too many requests (HTTP 429).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// HTTP 500, 502, 503 or 504.
    #[error("Server error: {0}")]
    Server(String),

    /// Any other non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl HuggingPlaceError {
    /// Map a non-success HTTP status and server message onto the taxonomy.
    pub fn from_response(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => HuggingPlaceError::Authentication(message),
            400 => HuggingPlaceError::Validation(message),
            429 => HuggingPlaceError::RateLimit(message),
            500 | 502 | 503 | 504 => HuggingPlaceError::Server(message),
            _ => HuggingPlaceError::Api { status, message },
        }
    }
}

impl From<reqwest::Error> for HuggingPlaceError {
    fn from(e: reqwest::Error) -> Self {
        HuggingPlaceError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for HuggingPlaceError {
    fn from(e: serde_json::Error) -> Self {
        HuggingPlaceError::Serialization(e.to_string())
    }
}

impl From<TraceError> for HuggingPlaceError {
    fn from(e: TraceError) -> Self {
        match e {
            TraceError::Validation(msg) | TraceError::Config(msg) => {
                HuggingPlaceError::Validation(msg)
            }
            TraceError::Transport(msg) => HuggingPlaceError::Network(msg),
            TraceError::UnexpectedStatus { status } => {
                HuggingPlaceError::from_response(status, "unexpected status")
            }
            TraceError::Serialization(msg) => HuggingPlaceError::Serialization(msg),
        }
    }
}

/// Failure of [`HuggingPlace::log_with_timing`](crate::HuggingPlace::log_with_timing).
#[derive(Debug, Error)]
pub enum TimedLogError<E> {
    /// The timed work itself failed. Returned even if logging the failure also failed.
    #[error("{0}")]
    Work(E),

    /// The work succeeded but the interaction could not be logged.
    #[error(transparent)]
    Log(HuggingPlaceError),
}
