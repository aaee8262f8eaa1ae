//! The session store: single owner of the canonical state and chat history.
//!
//! `GameSession` is a cheap handle (clone it freely). All mutation goes
//! through it:
//!
//! ```text
//! submit_action ─► in-flight guard ─► orchestrator (no lock held)
//!                                          │
//!                    ┌────── commit ◄──────┘   one lock, one atomic update
//!                    ├─► history += user, model
//!                    ├─► compaction: keep tail now, summarize prefix later
//!                    └─► image: generate later, attach by timestamp
//! guard drop ─► settle counter += 1  (autopilot listens)
//! ```
//!
//! A second `submit_action` while one is running returns `Ok(None)` and
//! changes nothing.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use dread_core::bootstrap::{SessionConfig, initial_state};
use dread_core::config::{HistoryConfig, SessionDefaults};
use dread_core::export::{export_roster_json, export_roster_markdown};
use dread_core::history::{ChatMessage, ImageSlot, next_timestamp};
use dread_core::persistence::SaveRecord;
use dread_core::types::GameState;
use dread_llm::ImageBackend;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::compactor::{RollingCompactor, append_summary};
use crate::error::{EngineError, Result};
use crate::orchestrator::{Attachment, TurnOrchestrator};

/// Output format for [`GameSession::export_roster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterFormat {
    /// Human-readable document.
    Markdown,
    /// Pretty-printed JSON array.
    Json,
}

/// What a committed turn produced.
#[derive(Debug)]
pub struct TurnReport {
    /// Text shown to the player.
    pub story_text: String,
    /// Whether the input was answered outside the fiction.
    pub out_of_character: bool,
    /// Turns left after this one.
    pub turns_left: u32,
    /// Timestamp of the model message.
    pub timestamp: i64,
    /// Patch parts that were refused.
    pub rejected: Vec<String>,
    /// Background image generation, if one was dispatched.
    pub image_task: Option<JoinHandle<()>>,
    /// Background history summary, if compaction ran.
    pub summary_task: Option<JoinHandle<()>>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`GameSession`].
pub struct SessionBuilder {
    orchestrator: TurnOrchestrator,
    history: HistoryConfig,
    defaults: SessionDefaults,
    images: Option<Arc<dyn ImageBackend>>,
}

impl SessionBuilder {
    /// Compaction thresholds.
    #[must_use]
    pub fn history(mut self, config: HistoryConfig) -> Self {
        self.history = config;
        self
    }

    /// Defaults used by [`GameSession::initialize`].
    #[must_use]
    pub fn defaults(mut self, defaults: SessionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Enable illustrations.
    #[must_use]
    pub fn images(mut self, backend: Arc<dyn ImageBackend>) -> Self {
        self.images = Some(backend);
        self
    }

    /// Finish.
    #[must_use]
    pub fn build(self) -> GameSession {
        let compactor = RollingCompactor::new(
            Arc::clone(self.orchestrator.backend()),
            self.orchestrator.prompts().clone(),
            self.history,
        );
        let (settled, _) = watch::channel(0);
        GameSession {
            inner: Arc::new(SessionInner {
                orchestrator: self.orchestrator,
                compactor,
                images: self.images,
                defaults: self.defaults,
                store: Mutex::new(Store::default()),
                in_flight: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                failed_turns: AtomicU64::new(0),
                settled,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Handle to one running story.
#[derive(Clone)]
pub struct GameSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    orchestrator: TurnOrchestrator,
    compactor: RollingCompactor,
    images: Option<Arc<dyn ImageBackend>>,
    defaults: SessionDefaults,
    store: Mutex<Store>,
    in_flight: AtomicBool,
    /// Bumped by `initialize` and `restore`; stale background work checks it.
    epoch: AtomicU64,
    /// Turns aborted by an inference failure, for the autopilot.
    failed_turns: AtomicU64,
    settled: watch::Sender<u64>,
}

#[derive(Default)]
struct Store {
    state: Option<GameState>,
    history: Vec<ChatMessage>,
    last_timestamp: i64,
}

impl Store {
    fn stamp(&mut self) -> i64 {
        self.last_timestamp = next_timestamp(self.last_timestamp, Utc::now().timestamp_millis());
        self.last_timestamp
    }
}

impl std::fmt::Debug for GameSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.inner.store.lock();
        f.debug_struct("GameSession")
            .field("initialized", &store.state.is_some())
            .field("history", &store.history.len())
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

impl GameSession {
    /// Start building a session around `orchestrator`.
    #[must_use]
    pub fn builder(orchestrator: TurnOrchestrator) -> SessionBuilder {
        SessionBuilder {
            orchestrator,
            history: HistoryConfig::default(),
            defaults: SessionDefaults::default(),
            images: None,
        }
    }

    /// Start a new story from `config`, discarding any current one.
    pub fn initialize(&self, config: &SessionConfig) -> GameState {
        self.initialize_with_rng(config, &mut rand::thread_rng())
    }

    /// [`initialize`](Self::initialize) with a caller-supplied RNG.
    pub fn initialize_with_rng<R: Rng + ?Sized>(
        &self,
        config: &SessionConfig,
        rng: &mut R,
    ) -> GameState {
        let state = initial_state(
            config,
            &self.inner.defaults,
            self.inner.orchestrator.memory(),
            rng,
        );
        {
            let mut store = self.inner.store.lock();
            store.state = Some(state.clone());
            store.history.clear();
        }
        let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(epoch, "session store reset");
        self.inner.notify_settled();
        state
    }

    /// Replace the current story with a saved one.
    pub fn restore(&self, record: SaveRecord) {
        {
            let mut store = self.inner.store.lock();
            store.last_timestamp = record.history.iter().map(|m| m.timestamp).max().unwrap_or(0);
            store.history = record.history;
            store.state = Some(record.game_state);
        }
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        info!(save = %record.id, name = %record.name, "session restored");
        self.inner.notify_settled();
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> Option<GameState> {
        self.inner.store.lock().state.clone()
    }

    /// Snapshot of the chat history.
    #[must_use]
    pub fn history(&self) -> Vec<ChatMessage> {
        self.inner.store.lock().history.clone()
    }

    /// Whether a story has been initialized or restored.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.store.lock().state.is_some()
    }

    /// Whether a turn is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// How many turns have been aborted by an inference failure. Bumped
    /// before the failing turn settles.
    #[must_use]
    pub fn failed_turns(&self) -> u64 {
        self.inner.failed_turns.load(Ordering::Acquire)
    }

    /// Receiver bumped every time the session settles (a turn finishes, or
    /// the story is initialized or restored).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.settled.subscribe()
    }

    /// Run one player action through the pipeline and commit the result.
    ///
    /// Returns `Ok(None)` when another turn is already in flight.
    ///
    /// # Errors
    /// - [`EngineError::NotInitialized`] before `initialize`/`restore`.
    /// - [`EngineError::SessionComplete`] when no turns remain.
    /// - [`EngineError::Inference`] when a generation call fails. The state is
    ///   kept, a single failure message is appended to the history and
    ///   [`failed_turns`](Self::failed_turns) goes up. If the story was
    ///   replaced meanwhile, nothing is recorded.
    pub async fn submit_action(
        &self,
        action: &str,
        attachments: &[Attachment],
    ) -> Result<Option<TurnReport>> {
        let Some(_guard) = InFlight::acquire(&self.inner) else {
            debug!(action, "turn already in flight; input dropped");
            return Ok(None);
        };

        let epoch = self.inner.epoch.load(Ordering::Acquire);
        let state = self.state().ok_or(EngineError::NotInitialized)?;
        if state.is_terminal() {
            return Err(EngineError::SessionComplete);
        }

        let processed = self
            .inner
            .orchestrator
            .process_turn(&state, action, attachments)
            .await;
        let outcome = match processed {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, action, "turn aborted");
                if self.inner.epoch.load(Ordering::Acquire) != epoch {
                    return Err(e);
                }
                self.inner.failed_turns.fetch_add(1, Ordering::AcqRel);
                let mut store = self.inner.store.lock();
                let ts = store.stamp();
                store.history.push(ChatMessage::model(e.user_message(), None, ts));
                return Err(e);
            }
        };

        if self.inner.epoch.load(Ordering::Acquire) != epoch {
            warn!("story replaced while the turn ran; result discarded");
            return Ok(None);
        }

        let mut store = self.inner.store.lock();
        let user_ts = store.stamp();
        store.history.push(ChatMessage::user(action, user_ts));

        let model_ts = store.stamp();
        let (snapshot, turns_left) = if outcome.out_of_character {
            (None, state.meta.turn)
        } else {
            let mut next = outcome.new_state;
            // A summary may have landed while the turn ran.
            if let Some(current) = store.state.as_ref() {
                next.narrative.past_summary.clone_from(&current.narrative.past_summary);
            }
            let turns = next.meta.turn;
            store.state = Some(next.clone());
            (Some(next), turns)
        };

        let image_prompt = outcome.image_prompt.filter(|_| self.inner.images.is_some());
        let mut message = ChatMessage::model(outcome.story_text.clone(), snapshot, model_ts);
        if let Some(prompt) = &image_prompt {
            message.image = Some(ImageSlot::Pending { prompt: prompt.clone() });
        }
        store.history.push(message);

        let summary_task = self.inner.compactor.plan(&store.history).map(|plan| {
            let existing = store
                .state
                .as_ref()
                .map(|s| s.narrative.past_summary.clone())
                .unwrap_or_default();
            debug!(pruned = plan.pruned.len(), kept = plan.kept.len(), "history compacted");
            store.history = plan.kept;
            self.spawn_summary(existing, plan.pruned, epoch)
        });
        drop(store);

        let image_task = image_prompt.map(|prompt| self.spawn_image(prompt, model_ts));

        Ok(Some(TurnReport {
            story_text: outcome.story_text,
            out_of_character: outcome.out_of_character,
            turns_left,
            timestamp: model_ts,
            rejected: outcome.rejected,
            image_task,
            summary_task,
        }))
    }

    /// Snapshot the session as a save record.
    ///
    /// # Errors
    /// [`EngineError::NotInitialized`] before `initialize`/`restore`.
    pub fn save_record(&self, name: &str) -> Result<SaveRecord> {
        let store = self.inner.store.lock();
        let state = store.state.clone().ok_or(EngineError::NotInitialized)?;
        Ok(SaveRecord::new(name, state, store.history.clone()))
    }

    /// Export the character roster.
    ///
    /// # Errors
    /// [`EngineError::NotInitialized`] before `initialize`/`restore`, or a
    /// serialization failure for JSON.
    pub fn export_roster(&self, format: RosterFormat) -> Result<String> {
        let state = self.state().ok_or(EngineError::NotInitialized)?;
        match format {
            RosterFormat::Markdown => Ok(export_roster_markdown(&state)),
            RosterFormat::Json => Ok(export_roster_json(&state)?),
        }
    }

    pub(crate) fn orchestrator(&self) -> &TurnOrchestrator {
        &self.inner.orchestrator
    }

    pub(crate) fn downgrade(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.inner))
    }

    // -- background work --------------------------------------------------

    fn spawn_summary(
        &self,
        existing: String,
        pruned: Vec<ChatMessage>,
        epoch: u64,
    ) -> JoinHandle<()> {
        let compactor = self.inner.compactor.clone();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let summary = match compactor.summarize(&existing, &pruned).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(error = %e, pruned = pruned.len(), "history summary failed");
                    return;
                }
            };
            let Some(inner) = weak.upgrade() else { return };
            if inner.epoch.load(Ordering::Acquire) != epoch {
                return;
            }
            let mut store = inner.store.lock();
            if let Some(state) = store.state.as_mut() {
                state.narrative.past_summary =
                    append_summary(&state.narrative.past_summary, &summary);
                debug!(len = state.narrative.past_summary.len(), "past summary extended");
            }
        })
    }

    fn spawn_image(&self, prompt: String, timestamp: i64) -> JoinHandle<()> {
        let images = self.inner.images.clone();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let Some(images) = images else { return };
            let slot = match images.generate_image(&prompt).await {
                Ok(data_uri) => ImageSlot::Ready { data_uri },
                Err(e) => {
                    warn!(error = %e, "illustration failed");
                    ImageSlot::Failed
                }
            };
            let Some(inner) = weak.upgrade() else { return };
            let mut store = inner.store.lock();
            match store.history.iter_mut().find(|m| m.timestamp == timestamp) {
                Some(message) => message.image = Some(slot),
                None => debug!(timestamp, "illustrated message no longer in history"),
            }
        })
    }
}

impl SessionInner {
    fn notify_settled(&self) {
        self.settled.send_modify(|n| *n = n.wrapping_add(1));
    }
}

/// Non-owning session handle for long-lived background tasks.
#[derive(Clone)]
pub(crate) struct WeakSession(Weak<SessionInner>);

impl WeakSession {
    pub(crate) fn upgrade(&self) -> Option<GameSession> {
        self.0.upgrade().map(|inner| GameSession { inner })
    }
}

/// Holds the in-flight flag for the duration of a turn.
struct InFlight<'a> {
    inner: &'a SessionInner,
}

impl<'a> InFlight<'a> {
    fn acquire(inner: &'a SessionInner) -> Option<Self> {
        inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { inner })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.store(false, Ordering::Release);
        self.inner.notify_settled();
    }
}
