//! Shared fixtures: a scripted inference backend and session builders.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use dread_core::bootstrap::SessionConfig;
use dread_core::config::{HistoryConfig, MemoryConfig};
use dread_llm::{
    ImageBackend, InferenceBackend, LlmError, LlmRequest, LlmResponse, ModelRole, PromptEngine,
};
use dread_engine::{GameSession, TurnOrchestrator};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};
use tokio::sync::Notify;

/// Answers requests from a FIFO script, in order, whatever the prompt.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, text: impl Into<String>) {
        self.script.lock().push_back(Ok(text.into()));
    }

    pub fn push_err(&self, error: LlmError) {
        self.script.lock().push_back(Err(error));
    }

    /// The next call blocks until the returned handle is notified.
    pub fn hold_next(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold.lock() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn roles(&self) -> Vec<ModelRole> {
        self.requests.lock().iter().map(|r| r.role).collect()
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().push(request.clone());
        let gate = self.hold.lock().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(text)) => Ok(LlmResponse::text(text)),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::Unavailable("script exhausted".into())),
        }
    }
}

/// Always returns the same tiny image.
pub struct StaticImages;

pub const IMAGE_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

#[async_trait]
impl ImageBackend for StaticImages {
    async fn generate_image(&self, _prompt: &str) -> Result<String, LlmError> {
        Ok(IMAGE_URI.to_string())
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn orchestrator(backend: &Arc<ScriptedBackend>) -> TurnOrchestrator {
    TurnOrchestrator::new(backend.clone(), PromptEngine::builtin(), MemoryConfig::default())
}

/// Initialized session with a seeded roster and 50 turns.
pub fn session(backend: &Arc<ScriptedBackend>) -> GameSession {
    let session = GameSession::builder(orchestrator(backend))
        .history(HistoryConfig::default())
        .build();
    session.initialize_with_rng(&SessionConfig::default(), &mut StdRng::seed_from_u64(7));
    session
}

/// Like [`session`] with illustrations enabled.
pub fn illustrated_session(backend: &Arc<ScriptedBackend>) -> GameSession {
    let session = GameSession::builder(orchestrator(backend))
        .images(Arc::new(StaticImages))
        .build();
    session.initialize_with_rng(&SessionConfig::default(), &mut StdRng::seed_from_u64(7));
    session
}

// ---------------------------------------------------------------------------
// Canned model output
// ---------------------------------------------------------------------------

pub fn simulation(patch: Value) -> String {
    json!({ "isMeta": false, "statePatch": patch, "illustrationRequest": null }).to_string()
}

pub fn narration(story: &str) -> String {
    json!({ "storyText": story, "statePatch": {}, "illustrationRequest": null }).to_string()
}

pub fn illustrated_narration(story: &str, scene: &str) -> String {
    json!({ "storyText": story, "illustrationRequest": scene }).to_string()
}

/// Script one ordinary turn.
pub fn script_turn(backend: &ScriptedBackend, story: &str) {
    backend.push(simulation(json!({ "suggestedActions": ["Listen", "Run"] })));
    backend.push(narration(story));
}
