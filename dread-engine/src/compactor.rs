//! Rolling history compaction.
//!
//! When the chat log grows past the threshold, the oldest segment is cut off
//! synchronously and summarized in the background. The summary is appended to
//! `narrative.pastSummary` once it arrives; a failed summary is logged and
//! forgotten.

use std::sync::Arc;

use dread_core::config::HistoryConfig;
use dread_core::history::{CompactionPlan, ChatMessage, plan_compaction, render_transcript};
use dread_llm::{InferenceBackend, PromptEngine, PromptId};

use crate::error::Result;
use crate::orchestrator::generate;

/// Summarizes pruned history through the utility model.
#[derive(Clone)]
pub struct RollingCompactor {
    backend: Arc<dyn InferenceBackend>,
    prompts: PromptEngine,
    config: HistoryConfig,
}

impl std::fmt::Debug for RollingCompactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingCompactor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RollingCompactor {
    /// Create a compactor.
    #[must_use]
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        prompts: PromptEngine,
        config: HistoryConfig,
    ) -> Self {
        Self {
            backend,
            prompts,
            config,
        }
    }

    /// Split `history` if it is over the threshold.
    #[must_use]
    pub fn plan(&self, history: &[ChatMessage]) -> Option<CompactionPlan> {
        plan_compaction(history, &self.config)
    }

    /// Summarize `pruned` as a continuation of `existing`.
    ///
    /// # Errors
    /// [`crate::EngineError::Inference`] if the call fails or comes back blank.
    pub async fn summarize(&self, existing: &str, pruned: &[ChatMessage]) -> Result<String> {
        let transcript = render_transcript(pruned);
        let existing = if existing.trim().is_empty() { "(none)" } else { existing };
        let text = generate(
            self.backend.as_ref(),
            &self.prompts,
            "summary",
            PromptId::HistorySummary,
            &[("existing_summary", existing), ("transcript", transcript.as_str())],
        )
        .await?;
        Ok(text.trim().to_string())
    }
}

/// `existing` followed by `addition`, separated by a blank line.
#[must_use]
pub fn append_summary(existing: &str, addition: &str) -> String {
    let addition = addition.trim();
    match (existing.trim().is_empty(), addition.is_empty()) {
        (_, true) => existing.to_string(),
        (true, false) => addition.to_string(),
        (false, false) => format!("{}\n\n{addition}", existing.trim_end()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_prior_summary() {
        assert_eq!(append_summary("", "Tess fled."), "Tess fled.");
        assert_eq!(append_summary("A.", "  "), "A.");
        assert_eq!(append_summary("A.\n", "B."), "A.\n\nB.");
    }
}
