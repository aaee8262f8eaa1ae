//! Character hydration: free-text description to a full character sheet.

use dread_core::extract::extract_detailed;
use dread_core::psyche::voice_signatures;
use dread_core::types::NpcState;
use tracing::{debug, warn};

use crate::error::Result;
use crate::orchestrator::{TurnOrchestrator, generate};

/// Ask the utility model to flesh out `description` for `cluster`.
///
/// A response that cannot be read yields a plain character named after the
/// first words of the description, so the roster never comes back empty.
/// Whatever memory the model invents is trimmed to the configured caps.
///
/// # Errors
/// [`crate::EngineError::Inference`] if the call itself fails.
pub async fn hydrate_npc(
    orchestrator: &TurnOrchestrator,
    description: &str,
    cluster: &str,
) -> Result<NpcState> {
    let voices = voice_signatures().join("|");
    let raw = generate(
        orchestrator.backend().as_ref(),
        orchestrator.prompts(),
        "hydration",
        dread_llm::PromptId::NpcHydration,
        &[
            ("cluster", cluster),
            ("voices", voices.as_str()),
            ("description", description),
        ],
    )
    .await?;

    let fallback = NpcState::new(fallback_name(description), "stranger");
    let extraction = extract_detailed(&raw, &fallback);
    if extraction.is_fallback() {
        warn!(description, "hydration output unusable; using a plain character");
    }
    let mut npc = extraction.into_inner();
    npc.normalize();
    npc.dialogue_state.memory.enforce_caps(orchestrator.memory());
    debug!(name = %npc.name, role = %npc.role, "character hydrated");
    Ok(npc)
}

/// Hydrate several descriptions in order, skipping any whose call fails.
pub async fn hydrate_roster(
    orchestrator: &TurnOrchestrator,
    descriptions: &[String],
    cluster: &str,
) -> Vec<NpcState> {
    let mut roster = Vec::with_capacity(descriptions.len());
    for description in descriptions {
        match hydrate_npc(orchestrator, description, cluster).await {
            Ok(npc) => roster.push(npc),
            Err(e) => warn!(error = %e, description = %description, "character skipped"),
        }
    }
    roster
}

fn fallback_name(description: &str) -> String {
    let name: Vec<&str> = description.split_whitespace().take(3).collect();
    if name.is_empty() {
        "Stranger".to_string()
    } else {
        name.join(" ")
    }
}
