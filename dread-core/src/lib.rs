//! # dread core library
//!
//! State engine for turn-based survival fiction whose world evolves through
//! calls to a text-generation service. This crate is model-agnostic and does
//! no I/O apart from the save store:
//!
//! - **Game state** ([`GameState`]): the canonical document, mutated only
//!   through [`delta::apply_patch`]
//! - **Extraction** ([`extract`]): raw model text to typed values, never fails
//! - **Psyche** ([`psyche`]): character state to acting directive
//! - **Location graph** ([`location`]): rooms created lazily on first visit
//! - **Dialogue memory** ([`memory`]): bounded per-character recall
//! - **History** ([`history`]): chat log and compaction planning
//!
//! ## Data flow for one turn
//!
//! ```text
//! model text ──► extract::<StatePatch> ──► delta::apply_patch ──► GameState'
//!                                               │
//!                         location::traverse ◄──┤
//!                  psyche::record_utterance  ◄──┘
//! ```

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod bootstrap;
pub mod config;
pub mod delta;
pub mod error;
pub mod export;
pub mod extract;
pub mod history;
pub mod location;
pub mod memory;
pub mod persistence;
pub mod psyche;
pub mod types;

pub use config::DreadConfig;
pub use delta::{PatchOutcome, StatePatch, apply_patch};
pub use error::{CoreError, Result};
pub use extract::{Extractable, Extraction, extract, extract_detailed};
pub use history::{ChatMessage, ImageSlot, Role};
pub use psyche::{SocialIntent, Stance, compute_stance, record_utterance};
pub use types::*;
