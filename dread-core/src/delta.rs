//! State patches: the only way generated output changes a [`GameState`].
//!
//! A [`StatePatch`] is what the simulation and narration phases return. It is
//! applied with [`apply_patch`], which merges it into a copy of the state:
//!
//! | Section           | Merge rule                                           |
//! |-------------------|------------------------------------------------------|
//! | `meta`            | intensity / cluster only; the turn is engine-owned   |
//! | `villainState`    | deep merge (objects recurse, arrays replace)         |
//! | `npcStates`       | merged by name; unknown names create characters      |
//! | `npcEvents`       | appended to the character's episodic log             |
//! | `dialogue`        | recorded through [`record_utterance`]                |
//! | `location`        | exit traversal / move, checked against the graph     |
//! | `narrative`       | motif and illustration request; never the summary    |
//! | `suggestedActions`| replaced wholesale                                   |
//!
//! Characters are never removed. A part of the patch that cannot be applied
//! is reported in [`PatchOutcome::rejected`] and the rest still applies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::extract::Extractable;
use crate::location::{self, LocationError, LocationState, RoomDraft};
use crate::psyche::record_utterance;
use crate::types::{GameState, NpcState, VillainState};

/// Highest villain threat level.
pub const MAX_THREAT: u8 = 10;
/// Highest environmental severity.
pub const MAX_SEVERITY: u8 = 5;

/// Partial update to a [`GameState`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatePatch {
    /// Mood changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaPatch>,
    /// Partial villain document, deep-merged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub villain_state: Option<Map<String, Value>>,
    /// Partial character documents keyed by `name`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub npc_states: Vec<Map<String, Value>>,
    /// Movement and ambient changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationDelta>,
    /// Story-level changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<NarrativePatch>,
    /// Replacement list of suggested actions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_actions: Option<Vec<String>>,
    /// Things that happened to specific characters this turn.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub npc_events: Vec<NpcEvent>,
    /// Lines exchanged with specific characters this turn.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dialogue: Vec<DialogueLine>,
}

impl StatePatch {
    /// Whether applying this patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl Extractable for StatePatch {}

/// Mood fields a patch may change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaPatch {
    /// New intensity label.
    pub intensity: Option<String>,
    /// New thematic cluster.
    pub active_cluster: Option<String>,
}

/// Movement and ambient changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationDelta {
    /// Label of the exit the player walked through.
    pub moved_via: Option<String>,
    /// Text for the room behind that exit, if it is new.
    pub arrived_room: Option<RoomDraft>,
    /// Direct move to an already known room id.
    pub current_room_id: Option<String>,
    /// New description for the current room (after any move).
    pub description_update: Option<String>,
    /// Weather label.
    pub weather: Option<String>,
    /// Time-of-day label.
    pub time_of_day: Option<String>,
    /// Spatial-logic label.
    pub spatial_logic: Option<String>,
    /// Severity, clamped to 0..=5.
    pub severity: Option<u8>,
}

/// Story-level fields a patch may change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NarrativePatch {
    /// New visual motif.
    pub visual_motif: Option<String>,
    /// Scene to illustrate.
    pub illustration_request: Option<String>,
}

/// An episode for one character's log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NpcEvent {
    /// Character name.
    pub npc: String,
    /// What happened.
    pub event: String,
}

/// One line heard or spoken by a character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueLine {
    /// Character whose memory records the line.
    pub npc: String,
    /// Who said it.
    pub speaker: String,
    /// What was said.
    pub text: String,
}

/// Result of [`apply_patch`].
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// The patched state.
    pub state: GameState,
    /// Parts of the patch that were refused, with reasons.
    pub rejected: Vec<String>,
}

/// Merge `patch` into a copy of `state`.
#[must_use]
pub fn apply_patch(state: &GameState, patch: &StatePatch, memory: &MemoryConfig) -> PatchOutcome {
    let mut next = state.clone();
    let mut rejected = Vec::new();

    if let Some(meta) = &patch.meta {
        if let Some(intensity) = non_blank(meta.intensity.as_deref()) {
            next.meta.intensity = intensity;
        }
        if let Some(cluster) = non_blank(meta.active_cluster.as_deref()) {
            next.meta.active_cluster = cluster;
        }
    }

    if let Some(villain) = &patch.villain_state {
        match merge_villain(&next.villain_state, villain) {
            Ok(merged) => next.villain_state = merged,
            Err(reason) => rejected.push(format!("villainState: {reason}")),
        }
    }

    let turn = next.meta.turn;
    for (i, npc_patch) in patch.npc_states.iter().enumerate() {
        if let Err(reason) = merge_npc(&mut next, npc_patch, memory) {
            rejected.push(format!("npcStates[{i}]: {reason}"));
        }
    }

    for event in &patch.npc_events {
        match next.npc_index(&event.npc) {
            Some(idx) => next.npc_states[idx].dialogue_state.memory.log_episode(
                turn,
                event.event.trim(),
                memory.episodic_capacity,
            ),
            None => rejected.push(format!("npcEvents: unknown character '{}'", event.npc)),
        }
    }

    for line in &patch.dialogue {
        match next.npc_index(&line.npc) {
            Some(idx) if !line.text.trim().is_empty() => {
                let speaker = if line.speaker.trim().is_empty() {
                    "player"
                } else {
                    line.speaker.as_str()
                };
                next.npc_states[idx] =
                    record_utterance(&next.npc_states[idx], speaker, &line.text, memory);
            }
            Some(_) => {}
            None => rejected.push(format!("dialogue: unknown character '{}'", line.npc)),
        }
    }

    if let Some(delta) = &patch.location {
        match apply_location_delta(&next.location_state, delta) {
            Ok(location) => next.location_state = location,
            Err(e) => {
                warn!(error = %e, "location delta rejected; keeping previous location");
                rejected.push(format!("location: {e}"));
            }
        }
    }

    if let Some(narrative) = &patch.narrative {
        if let Some(motif) = non_blank(narrative.visual_motif.as_deref()) {
            next.narrative.visual_motif = motif;
        }
        if let Some(request) = non_blank(narrative.illustration_request.as_deref()) {
            next.narrative.illustration_request = Some(request);
        }
    }

    if let Some(actions) = &patch.suggested_actions {
        let actions: Vec<String> = actions
            .iter()
            .filter_map(|a| non_blank(Some(a.as_str())))
            .collect();
        if !actions.is_empty() {
            next.suggested_actions = actions;
        }
    }

    if !rejected.is_empty() {
        debug!(rejected = ?rejected, "patch applied partially");
    }
    PatchOutcome { state: next, rejected }
}

/// Apply a [`LocationDelta`] to the graph.
///
/// An exit the model names but the room does not list is opened first, so
/// the graph grows by insert-if-absent on the exit label.
///
/// # Errors
/// Any location invariant the transition would break.
pub fn apply_location_delta(
    state: &LocationState,
    delta: &LocationDelta,
) -> Result<LocationState, LocationError> {
    let mut next = state.clone();

    if let Some(direction) = non_blank(delta.moved_via.as_deref()) {
        next = location::open_exit(&next, &direction)?;
        next = location::traverse(&next, &direction, delta.arrived_room.as_ref())?;
    } else if let Some(room_id) = non_blank(delta.current_room_id.as_deref()) {
        next = location::move_to(&next, &room_id)?;
    }

    if let Some(description) = non_blank(delta.description_update.as_deref()) {
        let current = next.current_room_id.clone();
        next = location::describe_room(&next, &current, &description)?;
    }
    if let Some(weather) = non_blank(delta.weather.as_deref()) {
        next.weather = weather;
    }
    if let Some(time) = non_blank(delta.time_of_day.as_deref()) {
        next.time_of_day = time;
    }
    if let Some(logic) = non_blank(delta.spatial_logic.as_deref()) {
        next.spatial_logic = logic;
    }
    if let Some(severity) = delta.severity {
        next.severity = severity.min(MAX_SEVERITY);
    }

    location::validate(&next)?;
    Ok(next)
}

/// Recursively merge `patch` into `base`. Objects merge key by key, every
/// other value (arrays included) replaces; `null` leaves the base alone.
pub fn deep_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (_, Value::Null) => {}
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        if !value.is_null() {
                            base.insert(key, value);
                        }
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

// ---------------------------------------------------------------------------
// Section helpers
// ---------------------------------------------------------------------------

fn merge_villain(
    current: &VillainState,
    patch: &Map<String, Value>,
) -> Result<VillainState, String> {
    let mut doc = serde_json::to_value(current).map_err(|e| e.to_string())?;
    deep_merge(&mut doc, Value::Object(patch.clone()));
    let mut merged: VillainState = serde_json::from_value(doc).map_err(|e| e.to_string())?;
    merged.threat_level = merged.threat_level.min(MAX_THREAT);
    Ok(merged)
}

fn merge_npc(
    state: &mut GameState,
    patch: &Map<String, Value>,
    memory: &MemoryConfig,
) -> Result<(), String> {
    let name = patch
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| "missing name".to_string())?
        .to_string();

    let mut patch = patch.clone();
    // memory is engine-owned; the model only adds to it through these keys
    if let Some(dialogue) = patch.get_mut("dialogueState").and_then(Value::as_object_mut) {
        dialogue.remove("memory");
    }
    let facts: Vec<String> = patch
        .remove("newFacts")
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let episode = patch
        .remove("memoryEvent")
        .and_then(|v| v.as_str().map(str::to_string));

    let mut npc = match state.npc_index(&name) {
        Some(idx) => {
            let existing = &state.npc_states[idx];
            let mut doc = serde_json::to_value(existing).map_err(|e| e.to_string())?;
            deep_merge(&mut doc, Value::Object(patch));
            let mut merged: NpcState = serde_json::from_value(doc).map_err(|e| e.to_string())?;
            merged.name.clone_from(&existing.name);
            merged
        }
        None => {
            let created: NpcState =
                serde_json::from_value(Value::Object(patch)).map_err(|e| e.to_string())?;
            debug!(npc = %name, "new character introduced by patch");
            created
        }
    };

    npc.normalize();
    for fact in &facts {
        npc.dialogue_state.memory.learn_fact(fact, memory.known_facts_capacity);
    }
    if let Some(event) = episode {
        npc.dialogue_state.memory.log_episode(state.meta.turn, event, memory.episodic_capacity);
    }
    npc.dialogue_state.memory.enforce_caps(memory);

    match state.npc_index(&npc.name) {
        Some(idx) => state.npc_states[idx] = npc,
        None => state.npc_states.push(npc),
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{Exit, RoomNode};
    use crate::types::{Consciousness, Instinct};
    use serde_json::json;

    fn state() -> GameState {
        let mut state = GameState::default();
        state.location_state = LocationState::new(RoomNode {
            id: "ward".to_string(),
            name: "Ward B".to_string(),
            description: String::new(),
            exits: vec![Exit::unexplored("corridor")],
        });
        let mut nurse = NpcState::new("Tess", "night nurse");
        nurse.psychology.dominant_instinct = Instinct::Fawn;
        state.npc_states.push(nurse);
        state
    }

    fn patch(value: serde_json::Value) -> StatePatch {
        serde_json::from_value(value).expect("patch parses")
    }

    #[test]
    fn npc_fields_merge_by_name_and_clamp() {
        let p = patch(json!({
            "npcStates": [{"name": "tess", "psychology": {"stressLevel": 140}, "fractureState": 2}]
        }));
        let out = apply_patch(&state(), &p, &MemoryConfig::default());
        assert!(out.rejected.is_empty());
        let tess = out.state.npc("Tess").expect("tess");
        assert!((tess.psychology.stress_level - 100.0).abs() < f32::EPSILON);
        assert_eq!(tess.psychology.dominant_instinct, Instinct::Fawn);
        assert_eq!(tess.fracture_state, 2);
        assert_eq!(tess.name, "Tess");
    }

    #[test]
    fn unknown_name_creates_character_and_nobody_is_removed() {
        let p = patch(json!({
            "npcStates": [{"name": "Orderly Vane", "role": "orderly", "consciousness": "dead"}]
        }));
        let out = apply_patch(&state(), &p, &MemoryConfig::default());
        assert_eq!(out.state.npc_states.len(), 2);
        assert_eq!(
            out.state.npc("orderly vane").map(|n| n.consciousness),
            Some(Consciousness::Deceased)
        );
    }

    #[test]
    fn nameless_npc_patch_is_rejected() {
        let p = patch(json!({"npcStates": [{"role": "ghost"}]}));
        let out = apply_patch(&state(), &p, &MemoryConfig::default());
        assert_eq!(out.state.npc_states.len(), 1);
        assert_eq!(out.rejected.len(), 1);
    }

    #[test]
    fn memory_is_not_overwritten_but_facts_are_learned() {
        let mut base = state();
        base.npc_states[0].dialogue_state.memory.append_summary("Knows the ward.");
        let p = patch(json!({
            "npcStates": [{
                "name": "Tess",
                "dialogueState": {"memory": {"longTermSummary": ""}, "voiceSignature": "whisper"},
                "newFacts": ["The player has a key"],
                "memoryEvent": "Saw the lights die"
            }]
        }));
        let out = apply_patch(&base, &p, &MemoryConfig::default());
        let memory = &out.state.npc("Tess").expect("tess").dialogue_state.memory;
        assert_eq!(memory.long_term_summary, "Knows the ward.");
        assert_eq!(memory.known_facts, vec!["The player has a key".to_string()]);
        assert_eq!(memory.episodic_logs.len(), 1);
        assert_eq!(out.state.npc_states[0].dialogue_state.voice_signature, "whisper");
    }

    #[test]
    fn move_through_new_exit_builds_room() {
        let p = patch(json!({
            "location": {
                "movedVia": "corridor",
                "arrivedRoom": {
                    "name": "Dark Corridor",
                    "description": "Wet tiles.",
                    "exits": ["stairwell"]
                },
                "weather": "storm"
            }
        }));
        let out = apply_patch(&state(), &p, &MemoryConfig::default());
        let room = out.state.location_state.current_room().expect("room");
        assert_eq!(room.name, "Dark Corridor");
        assert_eq!(out.state.location_state.weather, "storm");
        assert!(out.state.validate().is_ok());
    }

    #[test]
    fn move_to_unknown_room_keeps_previous_location() {
        let p = patch(json!({
            "location": {"currentRoomId": "room-nowhere", "weather": "fog"},
            "suggestedActions": ["Hide under the bed"]
        }));
        let base = state();
        let out = apply_patch(&base, &p, &MemoryConfig::default());
        assert_eq!(out.state.location_state, base.location_state);
        assert_eq!(out.state.suggested_actions, vec!["Hide under the bed".to_string()]);
        assert_eq!(out.rejected.len(), 1);
    }

    #[test]
    fn villain_deep_merge_keeps_untouched_fields() {
        let mut base = state();
        base.villain_state.name = "The Matron".to_string();
        base.villain_state.weaknesses = vec!["salt".to_string()];
        let p = patch(json!({"villainState": {"threatLevel": 40, "currentTactic": "stalking"}}));
        let out = apply_patch(&base, &p, &MemoryConfig::default());
        assert_eq!(out.state.villain_state.name, "The Matron");
        assert_eq!(out.state.villain_state.threat_level, MAX_THREAT);
        assert_eq!(out.state.villain_state.current_tactic, "stalking");
        assert_eq!(out.state.villain_state.weaknesses, vec!["salt".to_string()]);
    }

    #[test]
    fn dialogue_lines_update_stance() {
        let p = patch(json!({
            "dialogue": [{"npc": "Tess", "speaker": "player", "text": "Who else is here?"}]
        }));
        let out = apply_patch(&state(), &p, &MemoryConfig::default());
        let tess = out.state.npc("Tess").expect("tess");
        assert_eq!(tess.dialogue_state.memory.short_term_buffer.len(), 1);
        assert!(tess.dialogue_state.current_social_intent.is_some());
    }

    #[test]
    fn turn_is_never_patched() {
        let base = state();
        let p = patch(json!({"meta": {"intensity": "harrowing", "turn": 3}}));
        let out = apply_patch(&base, &p, &MemoryConfig::default());
        assert_eq!(out.state.meta.turn, base.meta.turn);
        assert_eq!(out.state.meta.intensity, "harrowing");
    }

    #[test]
    fn deep_merge_replaces_arrays_and_ignores_null() {
        let mut base = json!({"a": {"b": 1, "c": [1, 2]}, "d": "keep"});
        deep_merge(&mut base, json!({"a": {"c": [3]}, "d": null}));
        assert_eq!(base, json!({"a": {"b": 1, "c": [3]}, "d": "keep"}));
    }
}
