//! Conversation history and compaction planning.
//!
//! History is append-only until compaction prunes a prefix. Planning is pure;
//! the engine decides when to run it and summarizes the pruned segment off
//! the turn's critical path.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::config::HistoryConfig;
use crate::types::GameState;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The player (or the autopilot acting for them).
    User,
    /// The engine.
    Model,
}

/// Deferred illustration attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ImageSlot {
    /// Requested, not yet resolved.
    Pending {
        /// Prompt sent to the image backend.
        prompt: String,
    },
    /// Resolved to an inline image.
    Ready {
        /// `data:` URI.
        data_uri: String,
    },
    /// The image call failed; the message keeps its text.
    Failed,
}

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// Text shown to the player.
    pub text: String,
    /// State right after this message, for model messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<GameState>,
    /// Illustration, if one was requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSlot>,
    /// Epoch milliseconds; unique and strictly increasing within a session.
    pub timestamp: i64,
}

impl ChatMessage {
    /// A player message.
    #[must_use]
    pub fn user(text: impl Into<String>, timestamp: i64) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            snapshot: None,
            image: None,
            timestamp,
        }
    }

    /// An engine message, optionally carrying the state it produced.
    #[must_use]
    pub fn model(text: impl Into<String>, snapshot: Option<GameState>, timestamp: i64) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            snapshot,
            image: None,
            timestamp,
        }
    }
}

/// Split of a history into the prefix to summarize and the tail to keep.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionPlan {
    /// Oldest messages, to be summarized.
    pub pruned: Vec<ChatMessage>,
    /// Everything else, in order.
    pub kept: Vec<ChatMessage>,
}

/// Decide whether `history` needs compacting and how.
///
/// Returns `None` while the history is at or under the threshold.
#[must_use]
pub fn plan_compaction(history: &[ChatMessage], config: &HistoryConfig) -> Option<CompactionPlan> {
    if history.len() <= config.compaction_threshold || config.prune_count == 0 {
        return None;
    }
    let split = config.prune_count.min(history.len());
    Some(CompactionPlan {
        pruned: history[..split].to_vec(),
        kept: history[split..].to_vec(),
    })
}

/// Plain-text transcript for summary prompts.
#[must_use]
pub fn render_transcript(messages: &[ChatMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let who = match message.role {
            Role::User => "PLAYER",
            Role::Model => "STORY",
        };
        let _ = writeln!(out, "{who}: {}", message.text.trim());
    }
    out
}

/// Next strictly increasing timestamp after `last`, based on `now_ms`.
#[must_use]
pub fn next_timestamp(last: i64, now_ms: i64) -> i64 {
    now_ms.max(last + 1)
}
