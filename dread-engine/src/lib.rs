//! # dread-engine: turn orchestration
//!
//! Wires `dread-core` state and `dread-llm` inference into a playable
//! session:
//!
//! - [`orchestrator`]: simulation then narration, one atomic result per turn
//! - [`session`]: the single owner of state and history
//! - [`compactor`]: keeps history bounded, summarizes in the background
//! - [`autopilot`]: timer-driven protagonist
//! - [`ooc`], [`manifest`], [`roster`]: prompt-side helpers
//!
//! ```text
//! input / autopilot ─► GameSession::submit_action
//!                          └─► TurnOrchestrator::process_turn
//!                                 ├─► Simulation ─► apply_patch
//!                                 └─► Narration  ─► apply_patch
//!                          ◄─ commit ─► compaction, image (deferred)
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod autopilot;
pub mod compactor;
pub mod error;
pub mod manifest;
pub mod ooc;
pub mod orchestrator;
pub mod roster;
pub mod session;
pub mod telemetry;

pub use autopilot::{Autopilot, AutopilotState};
pub use compactor::RollingCompactor;
pub use error::{EngineError, Result};
pub use ooc::is_out_of_character;
pub use orchestrator::{Attachment, TurnOrchestrator, TurnOutcome};
pub use roster::{hydrate_npc, hydrate_roster};
pub use session::{GameSession, RosterFormat, SessionBuilder, TurnReport};
pub use telemetry::init_tracing;
