//! Property-based tests for the dread core.
//!
//! Invariants checked under random input:
//!   - the extractor never panics and round-trips rendered values
//!   - the location graph stays consistent under any transition sequence
//!   - stance selection is a pure function of character state
//!   - dialogue memory never exceeds its caps

use proptest::prelude::*;

use dread_core::config::MemoryConfig;
use dread_core::delta::{LocationDelta, StatePatch, apply_location_delta, apply_patch};
use dread_core::extract::{Extraction, extract, extract_detailed};
use dread_core::location::{self, Exit, LocationState, RoomDraft, RoomNode};
use dread_core::memory::Utterance;
use dread_core::psyche::{compute_stance, record_utterance};
use dread_core::types::{GameState, Instinct, NpcState};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

fn arb_instinct() -> impl Strategy<Value = Instinct> {
    prop_oneof![
        Just(Instinct::Fight),
        Just(Instinct::Flight),
        Just(Instinct::Fawn),
        Just(Instinct::Submit),
    ]
}

prop_compose! {
    fn arb_npc()(
        name in "[A-Z][a-z]{2,8}",
        stress in 0.0..100.0f32,
        trust in 0.0..100.0f32,
        fear in 0.0..100.0f32,
        fracture in 0..=4u8,
        instinct in arb_instinct(),
    ) -> NpcState {
        let mut npc = NpcState::new(name, "stranger");
        npc.psychology.stress_level = stress;
        npc.psychology.dominant_instinct = instinct;
        npc.relationship_state.trust = trust;
        npc.relationship_state.fear = fear;
        npc.fracture_state = fracture;
        npc
    }
}

#[derive(Debug, Clone)]
enum Op {
    Traverse(usize),
    MoveTo(usize),
    MoveToBogus,
    Open(String),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..6usize).prop_map(Op::Traverse),
        (0..16usize).prop_map(Op::MoveTo),
        Just(Op::MoveToBogus),
        "[a-z]{1,6}".prop_map(Op::Open),
    ]
}

fn start() -> LocationState {
    LocationState::new(RoomNode {
        id: "start".to_string(),
        name: "Start".to_string(),
        description: String::new(),
        exits: vec![Exit::unexplored("north"), Exit::unexplored("east")],
    })
}

// ---------------------------------------------------------------------------
// Property: the extractor never panics and yields a shape-valid value
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn extractor_never_panics_on_arbitrary_text(raw in ".{0,400}") {
        let patch = extract(&raw, &StatePatch::default());
        // whatever came back must be a patch the engine can apply
        let out = apply_patch(&GameState::default(), &patch, &MemoryConfig::default());
        prop_assert!(out.state.validate().is_ok());
    }

    #[test]
    fn extractor_survives_jsonish_noise(raw in r#"[\{\}\[\]":,a-z0-9 ]{0,200}"#) {
        let npc = extract(&raw, &NpcState::new("Fallback", "none"));
        prop_assert!(serde_json::to_string(&npc).is_ok());
    }
}

// ---------------------------------------------------------------------------
// Property: extract(render(x)) == x
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn extractor_round_trips_rendered_npcs(npc in arb_npc(), prose in "[a-zA-Z .]{0,40}") {
        let rendered = serde_json::to_string(&npc).expect("serialize");
        let fenced = format!("{prose}\n```json\n{rendered}\n```\n{prose}");
        let fallback = NpcState::new("Fallback", "none");
        prop_assert_eq!(extract(&rendered, &fallback), npc.clone());
        match extract_detailed(&fenced, &fallback) {
            Extraction::Valid(v) => prop_assert_eq!(v, npc),
            other => prop_assert!(false, "expected valid extraction, got {:?}", other),
        }
    }
}

// ---------------------------------------------------------------------------
// Property: location invariant after any transition sequence
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn location_invariant_holds(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut state = start();
        for op in ops {
            let result = match op {
                Op::Traverse(i) => {
                    let exits: Vec<String> = state
                        .current_room()
                        .map(|r| r.exits.iter().map(|e| e.direction.clone()).collect())
                        .unwrap_or_default();
                    match exits.get(i % exits.len().max(1)) {
                        Some(dir) => {
                            let draft = RoomDraft {
                                name: format!("Room via {dir}"),
                                description: String::new(),
                                exits: vec!["north".to_string(), "west".to_string()],
                            };
                            location::traverse(&state, dir, Some(&draft))
                        }
                        None => Ok(state.clone()),
                    }
                }
                Op::MoveTo(i) => {
                    let ids: Vec<String> = state.room_map.keys().cloned().collect();
                    location::move_to(&state, &ids[i % ids.len()])
                }
                Op::MoveToBogus => {
                    let before = state.clone();
                    let result = location::move_to(&state, "room-bogus");
                    prop_assert!(result.is_err());
                    prop_assert_eq!(&state, &before);
                    Ok(before)
                }
                Op::Open(label) => location::open_exit(&state, &label),
            };
            if let Ok(next) = result {
                state = next;
            }
            prop_assert!(location::validate(&state).is_ok());
            prop_assert!(state.room_map.contains_key(&state.current_room_id));
        }
    }

    #[test]
    fn location_delta_never_breaks_graph(
        moved_via in proptest::option::of("[a-z]{1,6}"),
        room_id in proptest::option::of("[a-z-]{1,10}"),
        severity in proptest::option::of(0..=255u8),
    ) {
        let delta = LocationDelta {
            moved_via,
            current_room_id: room_id,
            severity,
            ..LocationDelta::default()
        };
        let before = start();
        match apply_location_delta(&before, &delta) {
            Ok(next) => {
                prop_assert!(location::validate(&next).is_ok());
                prop_assert!(next.severity <= 5);
            }
            Err(_) => prop_assert!(location::validate(&before).is_ok()),
        }
    }
}

// ---------------------------------------------------------------------------
// Property: stance is deterministic
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn stance_is_deterministic(npc in arb_npc()) {
        let a = compute_stance(&npc);
        let b = compute_stance(&npc.clone());
        prop_assert_eq!(a, b);
    }

    #[test]
    fn anomalies_always_deny_reality(mut npc in arb_npc()) {
        npc.fracture_state = 4;
        prop_assert_eq!(
            compute_stance(&npc).intent,
            dread_core::psyche::SocialIntent::RealityDenial
        );
    }
}

// ---------------------------------------------------------------------------
// Property: memory bound
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn short_term_buffer_keeps_last_cap_in_order(count in 0..60usize, cap in 1..12usize) {
        let config = MemoryConfig { short_term_capacity: cap, ..MemoryConfig::default() };
        let mut npc = NpcState::new("Ada", "witness");
        for i in 0..count {
            npc = record_utterance(&npc, "player", &format!("line {i}"), &config);
        }
        let buffer: Vec<Utterance> =
            npc.dialogue_state.memory.short_term_buffer.iter().cloned().collect();
        prop_assert_eq!(buffer.len(), count.min(cap));
        let expected: Vec<String> =
            (count.saturating_sub(cap)..count).map(|i| format!("line {i}")).collect();
        let actual: Vec<String> = buffer.into_iter().map(|u| u.text).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn episodic_log_never_exceeds_cap(events in prop::collection::vec("[a-z ]{1,20}", 0..50)) {
        let config = MemoryConfig::default();
        let mut npc = NpcState::new("Ada", "witness");
        for (turn, event) in events.iter().enumerate() {
            npc.dialogue_state.memory.log_episode(
                u32::try_from(turn).unwrap_or(u32::MAX),
                event.as_str(),
                config.episodic_capacity,
            );
        }
        prop_assert!(npc.dialogue_state.memory.episodic_logs.len() <= config.episodic_capacity);
    }
}
