//! Roster export: a read-only rendering of every character.

use std::fmt::Write as _;

use crate::error::Result;
use crate::psyche::compute_stance;
use crate::types::{GameState, NpcState};

/// Markdown dossier of the whole cast.
#[must_use]
pub fn export_roster_markdown(state: &GameState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Roster\n");
    let _ = writeln!(
        out,
        "_{} characters, {} turns left, cluster: {}_\n",
        state.npc_states.len(),
        state.meta.turn,
        state.meta.active_cluster
    );
    for npc in &state.npc_states {
        write_npc(&mut out, npc);
    }
    out
}

/// The roster as pretty JSON, in the same shape the engine stores it.
///
/// # Errors
/// Serialization failure.
pub fn export_roster_json(state: &GameState) -> Result<String> {
    Ok(serde_json::to_string_pretty(&state.npc_states)?)
}

fn write_npc(out: &mut String, npc: &NpcState) {
    let stance = compute_stance(npc);
    let _ = writeln!(out, "## {} ({})\n", npc.name, npc.role);
    if !npc.origin.is_empty() {
        let _ = writeln!(out, "- Origin: {}", npc.origin);
    }
    let _ = writeln!(
        out,
        "- Condition: {:?}, fracture {}/4",
        npc.consciousness, npc.fracture_state
    );
    let _ = writeln!(
        out,
        "- Stress {:.0}, sanity {:.0}%, instinct {:?}",
        npc.psychology.stress_level,
        npc.psychology.sanity_percentage,
        npc.psychology.dominant_instinct
    );
    let _ = writeln!(
        out,
        "- Trust {:.0}, fear {:.0}{}",
        npc.relationship_state.trust,
        npc.relationship_state.fear,
        if npc.relationship_state.has_secret_knowledge { ", hiding something" } else { "" }
    );
    let _ = writeln!(out, "- Stance: {}", stance.intent);
    if !npc.psychology.trauma_profile.core_fear.is_empty() {
        let _ = writeln!(out, "- Core fear: {}", npc.psychology.trauma_profile.core_fear);
    }
    for injury in &npc.active_injuries {
        let _ = writeln!(
            out,
            "- Injury ({:?}): {} {}",
            injury.severity, injury.location, injury.description
        );
    }
    if !npc.resources_held.is_empty() {
        let _ = writeln!(out, "- Carrying: {}", npc.resources_held.join(", "));
    }
    let facts = &npc.dialogue_state.memory.known_facts;
    if !facts.is_empty() {
        let _ = writeln!(out, "- Knows: {}", facts.join("; "));
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> GameState {
        let mut state = GameState::default();
        let mut ivo = NpcState::new("Ivo", "porter");
        ivo.resources_held = vec!["lantern".to_string()];
        state.npc_states.push(ivo);
        state.npc_states.push(NpcState::new("Marta", "cook"));
        state
    }

    #[test]
    fn markdown_lists_every_character() {
        let md = export_roster_markdown(&state());
        assert!(md.contains("## Ivo (porter)"));
        assert!(md.contains("## Marta (cook)"));
        assert!(md.contains("Carrying: lantern"));
    }

    #[test]
    fn json_parses_back_to_roster() {
        let json = export_roster_json(&state()).expect("export");
        let back: Vec<NpcState> = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, state().npc_states);
    }
}
