//! Character hydration through the scripted backend.

mod common;

use common::ScriptedBackend;
use dread_core::config::MemoryConfig;
use dread_core::types::Instinct;
use dread_engine::roster::{hydrate_npc, hydrate_roster};
use dread_llm::LlmError;
use serde_json::json;

#[tokio::test]
async fn description_becomes_a_character_sheet() {
    let backend = ScriptedBackend::new();
    let orchestrator = common::orchestrator(&backend);
    backend.push(format!(
        "Sure! ```json\n{}\n```",
        json!({
            "name": "Brother Aled",
            "role": "altar boy",
            "psychology": { "stressLevel": 140, "dominantInstinct": "fight" },
            "dialogueState": { "voiceSignature": "whisper" }
        })
    ));

    let npc = hydrate_npc(&orchestrator, "A nervous altar boy who saw the ritual", "folk")
        .await
        .expect("hydrated");

    assert_eq!(npc.name, "Brother Aled");
    assert_eq!(npc.psychology.dominant_instinct, Instinct::Fight);
    assert!((npc.psychology.stress_level - 100.0).abs() < f32::EPSILON);
    assert_eq!(npc.dialogue_state.voice_signature, "whisper");
}

#[tokio::test]
async fn invented_memory_is_trimmed_to_caps() {
    let backend = ScriptedBackend::new();
    let orchestrator = common::orchestrator(&backend);
    let lines: Vec<_> = (0..30)
        .map(|i| json!({ "speaker": "player", "text": format!("line {i}") }))
        .collect();
    backend.push(
        json!({
            "name": "Marta",
            "role": "lighthouse keeper",
            "dialogueState": { "memory": { "shortTermBuffer": lines } }
        })
        .to_string(),
    );

    let npc = hydrate_npc(&orchestrator, "A keeper who talks too much", "signal")
        .await
        .expect("hydrated");

    let memory = &npc.dialogue_state.memory;
    assert_eq!(memory.short_term_buffer.len(), MemoryConfig::default().short_term_capacity);
    assert_eq!(
        memory.short_term_buffer.back().map(|u| u.text.as_str()),
        Some("line 29")
    );
}

#[tokio::test]
async fn unreadable_sheet_falls_back_to_a_named_stranger() {
    let backend = ScriptedBackend::new();
    let orchestrator = common::orchestrator(&backend);
    backend.push("I'm sorry, I can't help with that.");

    let npc = hydrate_npc(&orchestrator, "Old Marrow the ferryman", "folk")
        .await
        .expect("hydrated");

    assert_eq!(npc.name, "Old Marrow the");
    assert_eq!(npc.role, "stranger");
}

#[tokio::test]
async fn failed_calls_are_skipped_in_a_roster() {
    let backend = ScriptedBackend::new();
    let orchestrator = common::orchestrator(&backend);
    backend.push(json!({ "name": "Ines", "role": "paramedic" }).to_string());
    backend.push_err(LlmError::Timeout(30_000));

    let roster = hydrate_roster(
        &orchestrator,
        &["a paramedic".to_string(), "a priest".to_string()],
        "gothic",
    )
    .await;

    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0].name, "Ines");
}
