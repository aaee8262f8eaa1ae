//! HTTP inference client for Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::backend::InferenceBackend;
use crate::error::LlmError;
use crate::types::{LlmRequest, LlmResponse, ModelRole};

/// Provider backend for inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally.
    Ollama {
        /// e.g. `http://localhost:11434`.
        base_url: String,
    },
    /// OpenAI-compatible chat completions API.
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend; every call fails with [`LlmError::Unavailable`].
    None,
}

impl LlmProvider {
    /// Build a provider from its config label.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] for an unknown label.
    pub fn from_label(
        label: &str,
        base_url: &str,
        api_key: Option<String>,
    ) -> Result<Self, LlmError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        match label.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama { base_url }),
            "openai" | "openai-compatible" | "openai_compatible" => Ok(Self::OpenAiCompatible {
                base_url,
                api_key: api_key.unwrap_or_default(),
            }),
            "none" | "" => Ok(Self::None),
            other => Err(LlmError::ConfigError(format!("unknown provider '{other}'"))),
        }
    }
}

/// Model name per [`ModelRole`].
#[derive(Debug, Clone, Default)]
pub struct RoleModels {
    /// Model for the simulation phase.
    pub simulation: String,
    /// Model for the narration phase.
    pub narration: String,
    /// Model for bookkeeping calls.
    pub utility: String,
}

impl RoleModels {
    fn for_role(&self, role: ModelRole) -> &str {
        match role {
            ModelRole::Simulation => &self.simulation,
            ModelRole::Narration => &self.narration,
            ModelRole::Utility => &self.utility,
        }
    }
}

/// Routes requests to the configured provider, with retries.
#[derive(Debug, Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    models: RoleModels,
    max_retries: u32,
    /// Ceiling on every request's own timeout.
    timeout_cap_ms: Option<u64>,
}

impl LlmClient {
    /// Create a new client.
    #[must_use]
    pub fn new(provider: LlmProvider, models: RoleModels, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            models,
            max_retries,
            timeout_cap_ms: None,
        }
    }

    /// Never let a single call run longer than `timeout_ms`, whatever the
    /// request asks for.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_cap_ms = Some(timeout_ms);
        self
    }

    fn timeout_for(&self, request: &LlmRequest) -> Duration {
        let ms = self
            .timeout_cap_ms
            .map_or(request.timeout_ms, |cap| cap.min(request.timeout_ms));
        Duration::from_millis(ms)
    }

    /// A client with no backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, RoleModels::default(), 0)
    }

    /// Generate a completion.
    ///
    /// # Errors
    /// [`LlmError::Unavailable`] without a provider, otherwise the last
    /// transport error once retries are spent.
    pub async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let model = self.models.for_role(request.role);
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable(
                "no inference provider configured".into(),
            )),
            LlmProvider::Ollama { base_url } => {
                let url = format!("{base_url}/api/generate");
                let mut body = json!({
                    "model": model,
                    "system": request.system,
                    "prompt": request.user,
                    "stream": false,
                    "options": {
                        "temperature": request.temperature,
                        "num_predict": request.max_tokens,
                    }
                });
                if request.json_mode {
                    body["format"] = json!("json");
                }
                self.send_with_retries(&url, None, &body, request, model, |json| {
                    let text = json["response"].as_str().unwrap_or_default().to_string();
                    (text, json["eval_count"].as_u64().unwrap_or(0))
                })
                .await
            }
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                let url = format!("{base_url}/v1/chat/completions");
                let mut body = json!({
                    "model": model,
                    "messages": [
                        { "role": "system", "content": request.system },
                        { "role": "user", "content": request.user },
                    ],
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                });
                if request.json_mode {
                    body["response_format"] = json!({ "type": "json_object" });
                }
                self.send_with_retries(&url, Some(api_key), &body, request, model, |json| {
                    let text = json["choices"][0]["message"]["content"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    (text, json["usage"]["completion_tokens"].as_u64().unwrap_or(0))
                })
                .await
            }
        }
    }

    async fn send_with_retries(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
        request: &LlmRequest,
        model: &str,
        read: impl Fn(&Value) -> (String, u64),
    ) -> Result<LlmResponse, LlmError> {
        let timeout = self.timeout_for(request);
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(
                    attempt = attempt + 1,
                    of = self.max_retries + 1,
                    role = ?request.role,
                    "retrying inference call"
                );
            }

            let start = Instant::now();
            let mut builder = self
                .http
                .post(url)
                .json(body)
                .timeout(timeout);
            if let Some(key) = api_key {
                builder = builder.bearer_auth(key);
            }
            let result = builder.send().await;
            let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::ParseError(e.to_string()))?;
                    let (text, tokens) = read(&json);
                    if text.trim().is_empty() {
                        return Err(LlmError::EmptyResponse);
                    }
                    debug!(
                        role = ?request.role,
                        model,
                        latency_ms,
                        tokens,
                        "inference call completed"
                    );
                    return Ok(LlmResponse {
                        text,
                        tokens_generated: u32::try_from(tokens).unwrap_or(u32::MAX),
                        latency_ms,
                        model: model.to_string(),
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    last_error = format!("HTTP {status}: {body}");
                    warn!(%url, error = %last_error, "provider returned error");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(timeout_ms = timeout.as_millis(), "inference request timed out");
                    } else {
                        warn!(error = %last_error, "inference request failed");
                    }
                }
            }
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Whether a provider is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }
}

#[async_trait]
impl InferenceBackend for LlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.generate(request).await
    }

    fn is_available(&self) -> bool {
        LlmClient::is_available(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_labels_parse() {
        assert!(matches!(
            LlmProvider::from_label("Ollama", "http://localhost:11434/", None),
            Ok(LlmProvider::Ollama { base_url }) if base_url == "http://localhost:11434"
        ));
        assert!(matches!(
            LlmProvider::from_label("openai", "https://api.example.com", Some("k".into())),
            Ok(LlmProvider::OpenAiCompatible { .. })
        ));
        assert!(matches!(LlmProvider::from_label("none", "", None), Ok(LlmProvider::None)));
        assert!(LlmProvider::from_label("carrier-pigeon", "", None).is_err());
    }

    #[tokio::test]
    async fn none_provider_is_unavailable() {
        let client = LlmClient::none();
        assert!(!client.is_available());
        let err = client
            .complete(&LlmRequest::utility("sys", "user"))
            .await
            .expect_err("no provider");
        assert!(matches!(err, LlmError::Unavailable(_)));
    }

    #[test]
    fn configured_timeout_caps_request_timeout() {
        let client = LlmClient::none();
        let request = LlmRequest::simulation("sys", "user");
        assert_eq!(client.timeout_for(&request), Duration::from_millis(60_000));

        let client = client.with_request_timeout(15_000);
        assert_eq!(client.timeout_for(&request), Duration::from_millis(15_000));
        let quick = LlmRequest::utility("sys", "user").with_timeout(5_000);
        assert_eq!(client.timeout_for(&quick), Duration::from_millis(5_000));
    }

    #[test]
    fn role_models_route_by_role() {
        let models = RoleModels {
            simulation: "sim".into(),
            narration: "nar".into(),
            utility: "util".into(),
        };
        assert_eq!(models.for_role(ModelRole::Narration), "nar");
        assert_eq!(models.for_role(ModelRole::Utility), "util");
    }
}
