//! Autopilot scheduling on a paused clock.
//!
//! Run with `cargo test -p dread-engine --test autopilot`.

mod common;

use std::time::Duration;

use common::{ScriptedBackend, script_turn};
use dread_core::config::AutopilotConfig;
use dread_engine::{Autopilot, AutopilotState};
use dread_llm::{LlmError, ModelRole};
use serde_json::json;

const PACING_MS: u64 = 1_000;

fn config() -> AutopilotConfig {
    AutopilotConfig {
        pacing_ms: PACING_MS,
        default_cycles: 5,
    }
}

fn script_cycle(backend: &ScriptedBackend, action: &str, story: &str) {
    backend.push(json!({ "action": action }).to_string());
    script_turn(backend, story);
}

/// Let timers and spawned tasks run until `done` holds or the budget runs out.
async fn run_until(autopilot: &Autopilot, done: impl Fn(AutopilotState) -> bool) {
    for _ in 0..100 {
        if done(autopilot.state()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(PACING_MS / 4)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn single_cycle_runs_one_turn_then_switches_off() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    let autopilot = Autopilot::new(&session, &config());
    script_cycle(&backend, "Hide in the linen closet", "The footsteps pass.");

    autopilot.start(1);
    assert!(autopilot.is_armed());
    run_until(&autopilot, |s| !s.active).await;

    assert_eq!(
        autopilot.state(),
        AutopilotState {
            active: false,
            remaining_cycles: 0
        }
    );
    let state = session.state().expect("initialized");
    assert_eq!(state.meta.turn, 49);
    assert_eq!(session.history()[0].text, "Hide in the linen closet");
    assert_eq!(
        backend.roles(),
        vec![ModelRole::Utility, ModelRole::Simulation, ModelRole::Narration]
    );
}

#[tokio::test(start_paused = true)]
async fn cycles_run_back_to_back() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    let autopilot = Autopilot::new(&session, &config());
    script_cycle(&backend, "Listen at the door", "Breathing, on the other side.");
    script_cycle(&backend, "Back away slowly", "The handle turns.");

    autopilot.start(2);
    run_until(&autopilot, |s| !s.active).await;

    assert_eq!(autopilot.state().remaining_cycles, 0);
    assert_eq!(session.state().expect("initialized").meta.turn, 48);
    assert_eq!(backend.calls(), 6);
    assert!(!autopilot.is_armed());
}

#[tokio::test(start_paused = true)]
async fn stop_disarms_the_pending_timer() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    let autopilot = Autopilot::new(&session, &config());
    script_cycle(&backend, "Run", "You run.");

    autopilot.start(3);
    assert!(autopilot.is_armed());
    autopilot.stop();
    assert!(!autopilot.is_armed());

    tokio::time::sleep(Duration::from_millis(PACING_MS * 3)).await;

    assert_eq!(backend.calls(), 0);
    assert_eq!(
        autopilot.state(),
        AutopilotState {
            active: false,
            remaining_cycles: 3
        }
    );
    assert_eq!(session.state().expect("initialized").meta.turn, 50);
}

#[tokio::test(start_paused = true)]
async fn failed_turn_switches_autopilot_off() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    let autopilot = Autopilot::new(&session, &config());
    backend.push(json!({ "action": "Open the cellar" }).to_string());
    backend.push_err(LlmError::Timeout(30_000));

    autopilot.start(3);
    run_until(&autopilot, |s| !s.active).await;

    let state = autopilot.state();
    assert!(!state.active);
    assert_eq!(state.remaining_cycles, 3);
    assert_eq!(session.state().expect("initialized").meta.turn, 50);
    assert_eq!(session.history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_player_turn_switches_autopilot_off() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    let autopilot = Autopilot::new(&session, &config());
    backend.push_err(LlmError::Timeout(30_000));

    autopilot.start(3);
    assert!(autopilot.is_armed());
    let result = session.submit_action("I force the window", &[]).await;
    assert!(result.is_err());
    assert_eq!(session.failed_turns(), 1);

    run_until(&autopilot, |s| !s.active).await;
    tokio::time::sleep(Duration::from_millis(PACING_MS * 3)).await;

    assert_eq!(
        autopilot.state(),
        AutopilotState {
            active: false,
            remaining_cycles: 3
        }
    );
    assert!(!autopilot.is_armed());
    // Only the player's simulation call; the timer never fired.
    assert_eq!(backend.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn earlier_failures_do_not_stop_a_fresh_start() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    backend.push_err(LlmError::Timeout(30_000));
    assert!(session.submit_action("I force the window", &[]).await.is_err());

    let autopilot = Autopilot::new(&session, &config());
    script_cycle(&backend, "Climb out instead", "Glass crunches underfoot.");
    autopilot.start(1);
    run_until(&autopilot, |s| !s.active).await;

    assert_eq!(autopilot.state().remaining_cycles, 0);
    assert_eq!(session.state().expect("initialized").meta.turn, 49);
}

#[tokio::test(start_paused = true)]
async fn unreadable_choice_falls_back_to_first_suggestion() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    let autopilot = Autopilot::new(&session, &config());
    let first = session.state().expect("initialized").suggested_actions[0].clone();
    backend.push("I think you should probably look around.");
    script_turn(&backend, "Dust, and a smell of iron.");

    autopilot.start(1);
    run_until(&autopilot, |s| !s.active).await;

    assert_eq!(session.history()[0].text, first);
}

#[tokio::test(start_paused = true)]
async fn exhausted_autopilot_deactivates_on_settle() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    let autopilot = Autopilot::new(&session, &config());

    autopilot.start(0);

    assert!(!autopilot.state().active);
    assert!(!autopilot.is_armed());
    assert_eq!(backend.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn settling_twice_keeps_a_single_timer() {
    let backend = ScriptedBackend::new();
    let session = common::session(&backend);
    let autopilot = Autopilot::new(&session, &config());
    script_cycle(&backend, "Hold still", "Nothing moves.");

    autopilot.start(1);
    autopilot.settle();
    autopilot.settle();
    run_until(&autopilot, |s| !s.active).await;

    // One fire, one turn: the replaced timers never ran.
    assert_eq!(backend.calls(), 3);
    assert_eq!(session.state().expect("initialized").meta.turn, 49);
}
