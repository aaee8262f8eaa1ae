//! Illustration client for OpenAI-compatible image APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::backend::ImageBackend;
use crate::error::LlmError;

/// Calls `POST {base_url}/v1/images/generations` and returns a data URI.
#[derive(Debug, Clone)]
pub struct ImageClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    size: String,
    timeout_ms: u64,
}

impl ImageClient {
    /// Create a new image client.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        size: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            size: size.into(),
            timeout_ms,
        }
    }
}

/// Pull an image out of an images API response body.
///
/// Accepts `b64_json` (wrapped into a PNG data URI) or a plain `url`.
///
/// # Errors
/// [`LlmError::ParseError`] if neither is present.
pub fn image_from_response(body: &Value) -> Result<String, LlmError> {
    let first = &body["data"][0];
    if let Some(b64) = first["b64_json"].as_str().filter(|s| !s.is_empty()) {
        return Ok(format!("data:image/png;base64,{b64}"));
    }
    if let Some(url) = first["url"].as_str().filter(|s| !s.is_empty()) {
        return Ok(url.to_string());
    }
    Err(LlmError::ParseError("image response carried no data".into()))
}

#[async_trait]
impl ImageBackend for ImageClient {
    async fn generate_image(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/images/generations", self.base_url);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "n": 1,
            "size": self.size,
            "response_format": "b64_json",
        });

        let mut builder = self
            .http
            .post(&url)
            .json(&body)
            .timeout(Duration::from_millis(self.timeout_ms));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            warn!(%url, %status, "image provider returned error");
            return Err(LlmError::RequestFailed(format!("HTTP {status}")));
        }
        let json: Value = resp.json().await.map_err(|e| LlmError::ParseError(e.to_string()))?;
        let image = image_from_response(&json)?;
        debug!(bytes = image.len(), "illustration generated");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn b64_payload_becomes_data_uri() {
        let body = json!({"data": [{"b64_json": "iVBORw0KGgo="}]});
        assert_eq!(
            image_from_response(&body).expect("image"),
            "data:image/png;base64,iVBORw0KGgo="
        );
    }

    #[test]
    fn url_payload_is_passed_through() {
        let body = json!({"data": [{"url": "https://img.example/1.png"}]});
        assert_eq!(image_from_response(&body).expect("image"), "https://img.example/1.png");
    }

    #[test]
    fn empty_payload_is_error() {
        assert!(image_from_response(&json!({"data": []})).is_err());
    }
}
