//! Manifests: the text blocks that describe the world to a generation call.
//!
//! | Manifest  | Contents                                                   |
//! |-----------|------------------------------------------------------------|
//! | NPC       | stance + directive, voice, vitals, recent lines, facts     |
//! | villain   | name, archetype, threat, tactic                            |
//! | location  | `dread_core::location::get_manifest`                       |
//! | state     | compact JSON: memory and room map stripped                 |

use std::fmt::Write as _;

use dread_core::location;
use dread_core::psyche::{compute_stance, voice_profile};
use dread_core::types::{GameState, NpcState};
use serde_json::Value;

/// Lines of recent dialogue shown per character.
const RECENT_LINES: usize = 3;

/// Every character, with the acting directive the narrator should follow.
#[must_use]
pub fn npc_manifest(state: &GameState) -> String {
    if state.npc_states.is_empty() {
        return "none\n".to_string();
    }
    let mut out = String::new();
    for npc in &state.npc_states {
        write_npc(&mut out, npc);
    }
    out
}

fn write_npc(out: &mut String, npc: &NpcState) {
    let _ = writeln!(
        out,
        "- {} ({}) [{:?}, fracture {}/4]",
        npc.name, npc.role, npc.consciousness, npc.fracture_state
    );
    if !npc.is_active() {
        return;
    }

    let stance = compute_stance(npc);
    let voice = voice_profile(&npc.dialogue_state.voice_signature);
    let _ = writeln!(out, "  stance: {}. {}", stance.intent, stance.directive);
    let _ = writeln!(out, "  voice: {} ({})", voice.signature, voice.describe());
    let _ = writeln!(
        out,
        "  stress {:.0}, sanity {:.0}, trust {:.0}, fear {:.0}, goal: {} ({:.0}%)",
        npc.psychology.stress_level,
        npc.psychology.sanity_percentage,
        npc.relationship_state.trust,
        npc.relationship_state.fear,
        if npc.current_goal.is_empty() { "none" } else { &npc.current_goal },
        npc.goal_progress,
    );
    if !npc.active_injuries.is_empty() {
        let injuries: Vec<String> = npc
            .active_injuries
            .iter()
            .map(|i| format!("{:?} {}", i.severity, i.location).to_lowercase())
            .collect();
        let _ = writeln!(out, "  injuries: {}", injuries.join(", "));
    }
    let recent: Vec<String> = npc
        .dialogue_state
        .memory
        .recent(RECENT_LINES)
        .map(|u| format!("{}: \"{}\"", u.speaker, u.text))
        .collect();
    if !recent.is_empty() {
        let _ = writeln!(out, "  recent: {}", recent.join(" / "));
    }
    let facts = &npc.dialogue_state.memory.known_facts;
    if !facts.is_empty() {
        let _ = writeln!(out, "  knows: {}", facts.join("; "));
    }
}

/// The antagonist in one line.
#[must_use]
pub fn villain_manifest(state: &GameState) -> String {
    let v = &state.villain_state;
    format!(
        "{} ({}), threat {}/10, wants: {}, now: {}",
        if v.name.is_empty() { "unknown" } else { &v.name },
        v.archetype,
        v.threat_level,
        v.primary_goal,
        v.current_tactic
    )
}

/// Location block for the current room.
#[must_use]
pub fn location_manifest(state: &GameState) -> String {
    location::get_manifest(&state.location_state)
}

/// Compact state JSON for prompts.
///
/// Character memory (shown in the NPC manifest), the room map (shown in the
/// location manifest) and the rolling summary (passed separately) are left
/// out.
#[must_use]
pub fn state_json(state: &GameState) -> String {
    let Ok(mut doc) = serde_json::to_value(state) else {
        return "{}".to_string();
    };
    if let Some(npcs) = doc.get_mut("npcStates").and_then(Value::as_array_mut) {
        for npc in npcs {
            if let Some(dialogue) = npc.get_mut("dialogueState").and_then(Value::as_object_mut) {
                dialogue.remove("memory");
            }
        }
    }
    if let Some(location) = doc.get_mut("locationState").and_then(Value::as_object_mut) {
        location.remove("roomMap");
    }
    if let Some(narrative) = doc.get_mut("narrative").and_then(Value::as_object_mut) {
        narrative.remove("pastSummary");
    }
    doc.to_string()
}

/// Short situation line for autopilot prompts.
#[must_use]
pub fn state_brief(state: &GameState) -> String {
    let room = state
        .location_state
        .current_room()
        .map_or("somewhere", |r| r.name.as_str());
    let active: Vec<&str> = state
        .npc_states
        .iter()
        .filter(|n| n.is_active())
        .map(|n| n.name.as_str())
        .collect();
    format!(
        "{} turns left. In {room}. With: {}. Threat {}/10.",
        state.meta.turn,
        if active.is_empty() { "nobody".to_string() } else { active.join(", ") },
        state.villain_state.threat_level
    )
}
