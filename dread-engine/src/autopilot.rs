//! Autopilot: plays the protagonist on a timer.
//!
//! Every time the session settles the scheduler re-evaluates:
//!
//! | condition                                   | result                      |
//! |---------------------------------------------|-----------------------------|
//! | a turn failed since the last settle         | deactivate                  |
//! | active, no cycles left                      | deactivate                  |
//! | inactive                                    | disarm                      |
//! | uninitialized, busy, executing              | nothing                     |
//! | otherwise                                   | cancel old timer, arm one   |
//!
//! When the timer fires it asks the utility model for an action, submits it
//! like player input, and decrements the cycle count. Any failed turn,
//! whether the autopilot or the player submitted it, switches the autopilot
//! off. At most one timer is ever pending.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dread_core::config::AutopilotConfig;
use dread_core::extract::{Extractable, extract};
use dread_core::history::Role;
use dread_llm::PromptId;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::manifest;
use crate::orchestrator::generate;
use crate::session::{GameSession, WeakSession};

/// Used when the model offers nothing and no suggestions exist.
const DEFAULT_ACTION: &str = "Look around";

/// Scheduler state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutopilotState {
    /// Whether the autopilot is on.
    pub active: bool,
    /// Turns it may still take.
    pub remaining_cycles: u32,
}

/// Handle to the scheduler. Clones share one scheduler.
#[derive(Clone)]
pub struct Autopilot {
    inner: Arc<AutopilotInner>,
}

struct AutopilotInner {
    session: WeakSession,
    pacing: Duration,
    state: Mutex<AutopilotState>,
    timer: Mutex<Option<Timer>>,
    executing: AtomicBool,
    /// Session failure count already accounted for.
    seen_failures: AtomicU64,
    shutdown: CancellationToken,
}

struct Timer {
    token: CancellationToken,
    // Kept so the task is owned by the slot; never awaited.
    _handle: JoinHandle<()>,
}

impl std::fmt::Debug for Autopilot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autopilot")
            .field("state", &self.state())
            .field("pacing", &self.inner.pacing)
            .field("armed", &self.is_armed())
            .finish()
    }
}

impl Autopilot {
    /// Attach a scheduler to `session`.
    ///
    /// Must be called inside a tokio runtime: a watcher task follows the
    /// session's settle notifications until the autopilot is dropped.
    #[must_use]
    pub fn new(session: &GameSession, config: &AutopilotConfig) -> Self {
        let inner = Arc::new(AutopilotInner {
            session: session.downgrade(),
            pacing: Duration::from_millis(config.pacing_ms),
            state: Mutex::new(AutopilotState::default()),
            timer: Mutex::new(None),
            executing: AtomicBool::new(false),
            seen_failures: AtomicU64::new(session.failed_turns()),
            shutdown: CancellationToken::new(),
        });
        spawn_watcher(Arc::downgrade(&inner), session.subscribe(), inner.shutdown.clone());
        Self { inner }
    }

    /// Turn on for `cycles` turns.
    pub fn start(&self, cycles: u32) {
        if let Some(session) = self.inner.session.upgrade() {
            self.inner
                .seen_failures
                .store(session.failed_turns(), Ordering::Release);
        }
        *self.inner.state.lock() = AutopilotState {
            active: true,
            remaining_cycles: cycles,
        };
        info!(cycles, "autopilot started");
        self.inner.settle();
    }

    /// Turn off and disarm any pending timer.
    pub fn stop(&self) {
        self.inner.state.lock().active = false;
        self.inner.disarm();
        info!("autopilot stopped");
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AutopilotState {
        *self.inner.state.lock()
    }

    /// Whether a timer is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.inner
            .timer
            .lock()
            .as_ref()
            .is_some_and(|t| !t.token.is_cancelled())
    }

    /// Re-evaluate now rather than waiting for the next settle.
    pub fn settle(&self) {
        self.inner.settle();
    }
}

impl AutopilotInner {
    fn settle(self: &Arc<Self>) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        let failures = session.failed_turns();
        if self.seen_failures.swap(failures, Ordering::AcqRel) != failures {
            let was_active = std::mem::replace(&mut self.state.lock().active, false);
            self.disarm();
            if was_active {
                warn!("turn failed; autopilot switched off");
            }
            return;
        }
        {
            let mut state = self.state.lock();
            if state.active && state.remaining_cycles == 0 {
                state.active = false;
                drop(state);
                self.disarm();
                info!("autopilot exhausted");
                return;
            }
            if !state.active {
                drop(state);
                self.disarm();
                return;
            }
        }
        if !session.is_initialized()
            || session.is_busy()
            || self.executing.load(Ordering::Acquire)
        {
            return;
        }
        self.arm();
    }

    fn arm(self: &Arc<Self>) {
        let token = CancellationToken::new();
        let mut slot = self.timer.lock();
        if let Some(previous) = slot.take() {
            previous.token.cancel();
        }
        let weak = Arc::downgrade(self);
        let fire_token = token.clone();
        let pacing = self.pacing;
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = fire_token.cancelled() => {}
                () = tokio::time::sleep(pacing) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.fire(&fire_token).await;
                    }
                }
            }
        });
        *slot = Some(Timer { token, _handle: handle });
        debug!(pacing_ms = pacing.as_millis(), "autopilot armed");
    }

    fn disarm(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.token.cancel();
        }
    }

    fn deactivate(&self) {
        self.state.lock().active = false;
        self.disarm();
    }

    fn is_live(&self, token: &CancellationToken) -> bool {
        let state = self.state.lock();
        !token.is_cancelled() && state.active && state.remaining_cycles > 0
    }

    async fn fire(self: &Arc<Self>, token: &CancellationToken) {
        if !self.is_live(token) {
            return;
        }
        let Some(session) = self.session.upgrade() else {
            return;
        };

        self.executing.store(true, Ordering::Release);
        self.run_cycle(&session, token).await;
        self.executing.store(false, Ordering::Release);

        // The turn's own settle was skipped while executing.
        self.settle();
    }

    async fn run_cycle(&self, session: &GameSession, token: &CancellationToken) {
        let action = match synthesize_action(session).await {
            Ok(action) => action,
            Err(e) => {
                error!(error = %e, "autopilot could not choose an action; stopping");
                self.deactivate();
                return;
            }
        };
        if !self.is_live(token) {
            debug!("autopilot stopped while choosing; action discarded");
            return;
        }

        debug!(action = %action, "autopilot acting");
        match session.submit_action(&action, &[]).await {
            Ok(Some(_)) => {
                let mut state = self.state.lock();
                state.remaining_cycles = state.remaining_cycles.saturating_sub(1);
                if state.remaining_cycles == 0 {
                    state.active = false;
                    info!("autopilot finished its cycles");
                }
            }
            Ok(None) => debug!("autopilot turn dropped: another turn in flight"),
            Err(e) => {
                error!(error = %e, "autopilot turn failed; stopping");
                self.deactivate();
            }
        }
    }
}

impl Drop for AutopilotInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(timer) = self.timer.get_mut().take() {
            timer.token.cancel();
        }
    }
}

fn spawn_watcher(
    weak: Weak<AutopilotInner>,
    mut settled: tokio::sync::watch::Receiver<u64>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                changed = settled.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let Some(inner) = weak.upgrade() else { break };
                    inner.settle();
                }
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Action synthesis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct AutopilotChoice {
    action: String,
}

impl Extractable for AutopilotChoice {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.action.trim().is_empty() {
            return Err("empty action".to_string());
        }
        Ok(())
    }
}

async fn synthesize_action(session: &GameSession) -> Result<String> {
    let state = session.state().ok_or(crate::EngineError::NotInitialized)?;
    let recent_story = session
        .history()
        .iter()
        .rev()
        .find(|m| m.role == Role::Model)
        .map(|m| m.text.clone())
        .unwrap_or_default();
    let suggestions: String = state
        .suggested_actions
        .iter()
        .map(|a| format!("- {a}\n"))
        .collect();
    let brief = manifest::state_brief(&state);

    let orchestrator = session.orchestrator();
    let raw = generate(
        orchestrator.backend().as_ref(),
        orchestrator.prompts(),
        "autopilot",
        PromptId::AutopilotAction,
        &[
            ("state_brief", brief.as_str()),
            ("recent_story", recent_story.as_str()),
            ("suggested_actions", suggestions.as_str()),
        ],
    )
    .await?;

    let fallback = AutopilotChoice {
        action: state
            .suggested_actions
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_ACTION.to_string()),
    };
    Ok(extract(&raw, &fallback).action.trim().to_string())
}
