//! Engine error types.

use dread_core::CoreError;
use dread_llm::LlmError;
use thiserror::Error;

/// Errors surfaced by turn processing and the session store.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A generation call failed or returned nothing.
    #[error("inference failed during {phase}: {source}")]
    Inference {
        /// Which call failed ("simulation", "narration", ...).
        phase: &'static str,
        /// Underlying error.
        #[source]
        source: LlmError,
    },

    /// Core state, persistence or config failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The session has not been initialized or restored.
    #[error("session not initialized")]
    NotInitialized,

    /// The turn counter has reached zero.
    #[error("session complete: no turns remain")]
    SessionComplete,
}

impl EngineError {
    /// Wrap an inference error with the phase it happened in.
    #[must_use]
    pub fn inference(phase: &'static str, source: LlmError) -> Self {
        Self::Inference { phase, source }
    }

    /// The terse, in-fiction line shown to the player. Causes go to the log.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Inference { .. } => {
                "The connection failed. Something in the dark swallowed the signal. Try again."
            }
            Self::Core(_) => "The world stutters and holds still. Try again.",
            Self::NotInitialized => "Nothing has begun yet.",
            Self::SessionComplete => "It is over. There are no more turns.",
        }
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, EngineError>;
