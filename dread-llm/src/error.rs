//! Inference error types.

use thiserror::Error;

/// Errors that can occur while talking to a generation backend.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP request failed.
    #[error("inference request failed: {0}")]
    RequestFailed(String),

    /// The provider answered with something that is not its documented shape.
    #[error("failed to parse provider response: {0}")]
    ParseError(String),

    /// Request timed out.
    #[error("inference request timed out after {0}ms")]
    Timeout(u64),

    /// Provider is unreachable or not configured.
    #[error("inference provider unavailable: {0}")]
    Unavailable(String),

    /// All retry attempts exhausted.
    #[error("all inference attempts exhausted after {attempts} tries: {last_error}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        last_error: String,
    },

    /// The provider answered, but with no text.
    #[error("provider returned an empty response")]
    EmptyResponse,

    /// Configuration error.
    #[error("inference configuration error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Whether the failure was at the transport level rather than content.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_)
                | Self::Timeout(_)
                | Self::Unavailable(_)
                | Self::RetriesExhausted { .. }
        )
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }
}
