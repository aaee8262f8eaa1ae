//! Request and response types shared by every backend.

use serde::{Deserialize, Serialize};

/// Which model a request is meant for.
///
/// | Role         | Used for                                  | Temperature |
/// |--------------|-------------------------------------------|-------------|
/// | `Simulation` | state deltas, must be valid JSON          | low         |
/// | `Narration`  | prose plus corrective patch               | high        |
/// | `Utility`    | summaries, autopilot actions, hydration   | medium      |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Deterministic state simulation.
    Simulation,
    /// Story prose.
    Narration,
    /// Small bookkeeping calls.
    Utility,
}

/// A request to a text-generation backend.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System prompt (rules, manifests, persona).
    pub system: String,
    /// User prompt (state, action, instructions).
    pub user: String,
    /// Which model to route to.
    pub role: ModelRole,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Ask the provider for JSON-only output where supported.
    pub json_mode: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// A simulation-phase request: JSON mode, low temperature.
    #[must_use]
    pub fn simulation(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            role: ModelRole::Simulation,
            max_tokens: 1200,
            temperature: 0.3,
            json_mode: true,
            timeout_ms: 60_000,
        }
    }

    /// A narration-phase request.
    #[must_use]
    pub fn narration(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            role: ModelRole::Narration,
            max_tokens: 900,
            temperature: 0.85,
            json_mode: false,
            timeout_ms: 60_000,
        }
    }

    /// A small bookkeeping request.
    #[must_use]
    pub fn utility(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            role: ModelRole::Utility,
            max_tokens: 300,
            temperature: 0.6,
            json_mode: false,
            timeout_ms: 30_000,
        }
    }

    /// Override token budget and temperature, e.g. from a prompt template.
    #[must_use]
    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Force JSON mode on or off.
    #[must_use]
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A response from a text-generation backend.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}

impl LlmResponse {
    /// A response with only text, for in-process backends.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_generated: 0,
            latency_ms: 0,
            model: String::new(),
        }
    }
}
