//! Two-phase turn pipeline.
//!
//! ```text
//!            ┌────────── OOC? ──────────► OocReply ─► unchanged state
//! action ────┤
//!            └─► Simulation ─► extract ─► apply_patch ─► advance_turn
//!                     │ isMeta ─► OocReply
//!                     ▼
//!                 Narration ─► extract ─► apply_patch (corrective) ─► TurnOutcome
//! ```
//!
//! Nothing here touches the session. The orchestrator takes a state by
//! reference and hands back a new one; any inference failure aborts the
//! whole turn with no partial result.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;

use dread_core::config::MemoryConfig;
use dread_core::delta::{StatePatch, apply_patch};
use dread_core::extract::{Extractable, extract_detailed, prose_outside_json};
use dread_core::types::GameState;
use dread_llm::{InferenceBackend, LlmError, PromptEngine, PromptId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::manifest;
use crate::ooc::is_out_of_character;

/// Something the player handed over with their action (a note, a photo
/// caption, a pasted document).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Short label, e.g. a file name.
    pub label: String,
    /// Text content or description.
    pub content: String,
}

impl Attachment {
    /// New attachment.
    #[must_use]
    pub fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

/// Result of one processed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// State to commit. Equal to the input state for OOC turns.
    pub new_state: GameState,
    /// Text shown to the player.
    pub story_text: String,
    /// Scene to illustrate, if either phase asked for one.
    pub image_prompt: Option<String>,
    /// Whether the input was answered outside the fiction.
    pub out_of_character: bool,
    /// Patch parts that were refused.
    pub rejected: Vec<String>,
}

// ---------------------------------------------------------------------------
// Model output shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SimulationOutput {
    is_meta: bool,
    state_patch: StatePatch,
    illustration_request: Option<String>,
}

impl Extractable for SimulationOutput {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct NarrationOutput {
    story_text: String,
    state_patch: StatePatch,
    illustration_request: Option<String>,
}

impl Extractable for NarrationOutput {}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Runs simulation then narration against an inference backend.
#[derive(Clone)]
pub struct TurnOrchestrator {
    backend: Arc<dyn InferenceBackend>,
    prompts: PromptEngine,
    memory: MemoryConfig,
}

impl std::fmt::Debug for TurnOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnOrchestrator")
            .field("prompts", &self.prompts.len())
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

impl TurnOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        prompts: PromptEngine,
        memory: MemoryConfig,
    ) -> Self {
        Self {
            backend,
            prompts,
            memory,
        }
    }

    /// The backend used for every call.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    /// The prompt templates.
    #[must_use]
    pub fn prompts(&self) -> &PromptEngine {
        &self.prompts
    }

    /// Dialogue memory caps applied to every character.
    #[must_use]
    pub fn memory(&self) -> &MemoryConfig {
        &self.memory
    }

    /// Process one player action.
    ///
    /// # Errors
    /// [`EngineError::Inference`] if any generation call fails. The caller's
    /// state is untouched in that case.
    pub async fn process_turn(
        &self,
        state: &GameState,
        action: &str,
        attachments: &[Attachment],
    ) -> Result<TurnOutcome> {
        let started = Instant::now();

        if is_out_of_character(action) {
            debug!(action, "out-of-character input");
            return self.answer_out_of_character(state, action).await;
        }

        // --- Simulation ---
        let location = manifest::location_manifest(state);
        let villain = manifest::villain_manifest(state);
        let npcs = manifest::npc_manifest(state);
        let state_json = manifest::state_json(state);
        let mode = state.meta.mode.to_string();
        let attachment_block = render_attachments(attachments);

        let raw = self
            .call(
                "simulation",
                PromptId::Simulation,
                &[
                    ("mode", mode.as_str()),
                    ("cluster", state.meta.active_cluster.as_str()),
                    ("intensity", state.meta.intensity.as_str()),
                    ("state_json", state_json.as_str()),
                    ("location_manifest", location.as_str()),
                    ("villain_manifest", villain.as_str()),
                    ("npc_manifest", npcs.as_str()),
                    ("attachments", attachment_block.as_str()),
                    ("action", action),
                ],
            )
            .await?;
        let extraction = extract_detailed(&raw, &SimulationOutput::default());
        if extraction.is_fallback() {
            warn!("simulation output unusable, applying empty patch");
        }
        let simulation = extraction.into_inner();

        if simulation.is_meta {
            debug!(action, "simulation flagged input as meta");
            return self.answer_out_of_character(state, action).await;
        }

        // An illustration request only counts for the turn that made it.
        let mut base = state.clone();
        base.narrative.illustration_request = None;
        let simulated = apply_patch(&base, &simulation.state_patch, &self.memory);
        let mut next = simulated.state;
        next.advance_turn();
        let mut rejected = simulated.rejected;

        // --- Narration ---
        let delta_json = serde_json::to_string(&simulation.state_patch)
            .unwrap_or_else(|_| "{}".to_string());
        let perspective = next.meta.perspective.to_string();
        let location = manifest::location_manifest(&next);
        let npcs = manifest::npc_manifest(&next);
        let state_json = manifest::state_json(&next);

        let raw = self
            .call(
                "narration",
                PromptId::Narration,
                &[
                    ("mode", mode.as_str()),
                    ("cluster", next.meta.active_cluster.as_str()),
                    ("intensity", next.meta.intensity.as_str()),
                    ("perspective", perspective.as_str()),
                    ("past_summary", next.narrative.past_summary.as_str()),
                    ("state_json", state_json.as_str()),
                    ("delta_json", delta_json.as_str()),
                    ("location_manifest", location.as_str()),
                    ("npc_manifest", npcs.as_str()),
                    ("action", action),
                ],
            )
            .await?;
        let mut narration = extract_narration(&raw);
        if narration.story_text.trim().is_empty() {
            narration.story_text = prose_outside_json(&raw);
        }
        if narration.story_text.trim().is_empty() {
            return Err(EngineError::inference("narration", LlmError::EmptyResponse));
        }

        if !narration.state_patch.is_empty() {
            let corrected = apply_patch(&next, &narration.state_patch, &self.memory);
            next = corrected.state;
            rejected.extend(corrected.rejected);
        }

        let image_prompt = non_blank(narration.illustration_request)
            .or_else(|| non_blank(simulation.illustration_request))
            .or_else(|| non_blank(next.narrative.illustration_request.clone()));
        next.narrative.illustration_request.clone_from(&image_prompt);

        info!(
            turn = next.meta.turn,
            rejected = rejected.len(),
            illustrated = image_prompt.is_some(),
            elapsed_ms = started.elapsed().as_millis(),
            "turn processed"
        );

        Ok(TurnOutcome {
            new_state: next,
            story_text: narration.story_text.trim().to_string(),
            image_prompt,
            out_of_character: false,
            rejected,
        })
    }

    async fn answer_out_of_character(
        &self,
        state: &GameState,
        question: &str,
    ) -> Result<TurnOutcome> {
        let state_json = manifest::state_json(state);
        let raw = self
            .call(
                "ooc",
                PromptId::OocReply,
                &[("question", question), ("state_json", state_json.as_str())],
            )
            .await?;
        let mut reply = prose_outside_json(&raw);
        if reply.is_empty() {
            reply = raw.trim().to_string();
        }
        Ok(TurnOutcome {
            new_state: state.clone(),
            story_text: reply,
            image_prompt: None,
            out_of_character: true,
            rejected: Vec::new(),
        })
    }

    async fn call(
        &self,
        phase: &'static str,
        id: PromptId,
        vars: &[(&str, &str)],
    ) -> Result<String> {
        generate(self.backend.as_ref(), &self.prompts, phase, id, vars).await
    }
}

/// Render `id`, send it, and return the raw text. Blank completions count
/// as failures.
pub(crate) async fn generate(
    backend: &dyn InferenceBackend,
    prompts: &PromptEngine,
    phase: &'static str,
    id: PromptId,
    vars: &[(&str, &str)],
) -> Result<String> {
    let request = prompts
        .request(id, vars)
        .map_err(|e| EngineError::inference(phase, e))?;
    let response = backend
        .complete(&request)
        .await
        .map_err(|e| EngineError::inference(phase, e))?;
    debug!(
        phase,
        tokens = response.tokens_generated,
        latency_ms = response.latency_ms,
        "generation complete"
    );
    if response.text.trim().is_empty() {
        return Err(EngineError::inference(phase, LlmError::EmptyResponse));
    }
    Ok(response.text)
}

fn extract_narration(raw: &str) -> NarrationOutput {
    let extraction = extract_detailed(raw, &NarrationOutput::default());
    if extraction.is_fallback() {
        debug!("narration returned no usable JSON, treating as prose");
    }
    extraction.into_inner()
}

fn render_attachments(attachments: &[Attachment]) -> String {
    if attachments.is_empty() {
        return "none".to_string();
    }
    let mut out = String::new();
    for a in attachments {
        let _ = writeln!(out, "- {}: {}", a.label, a.content);
    }
    out
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
