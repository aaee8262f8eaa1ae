//! Backend seams. The engine only ever talks to these traits, so tests and
//! alternative providers can stand in for the HTTP clients.

use async_trait::async_trait;

use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse};

/// Anything that turns a prompt into text.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Run one completion.
    ///
    /// # Errors
    /// Transport, provider or configuration failures. An empty completion is
    /// [`LlmError::EmptyResponse`].
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Whether a real provider is behind this backend.
    fn is_available(&self) -> bool {
        true
    }
}

/// Anything that turns a scene description into an image.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Generate one image and return it as a `data:` URI.
    ///
    /// # Errors
    /// Transport or provider failures.
    async fn generate_image(&self, prompt: &str) -> Result<String, LlmError>;
}
