//! Dialogue memory: what a character has heard, lived through and learned.
//!
//! Four stores with different retention rules:
//!
//! | Store              | Retention                          |
//! |--------------------|------------------------------------|
//! | `short_term_buffer`| ring buffer, oldest evicted first  |
//! | `episodic_logs`    | most recent N kept                 |
//! | `long_term_summary`| append-only text                   |
//! | `known_facts`      | deduplicated, most recent N kept   |
//!
//! Capacities come from [`MemoryConfig`]; no store ever exceeds its cap after
//! any method here returns.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::MemoryConfig;

/// One line of dialogue as remembered by a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    /// Who said it ("player" for the user's character).
    pub speaker: String,
    /// What was said.
    pub text: String,
}

/// Something that happened to a character, tagged with the turn it happened on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodicLog {
    /// Turn counter value when the event was logged.
    pub turn: u32,
    /// Short description.
    pub event: String,
}

/// Per-character dialogue memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueMemory {
    /// Most recent utterances, oldest first.
    pub short_term_buffer: VecDeque<Utterance>,
    /// Most recent episodes, oldest first.
    pub episodic_logs: Vec<EpisodicLog>,
    /// Free-text summary; only ever extended.
    pub long_term_summary: String,
    /// Things this character knows to be true.
    pub known_facts: Vec<String>,
}

impl DialogueMemory {
    /// Push an utterance, evicting from the front past `capacity`.
    pub fn push_utterance(&mut self, utterance: Utterance, capacity: usize) {
        self.short_term_buffer.push_back(utterance);
        while self.short_term_buffer.len() > capacity {
            self.short_term_buffer.pop_front();
        }
    }

    /// Log an episode, keeping only the most recent `capacity` entries.
    pub fn log_episode(&mut self, turn: u32, event: impl Into<String>, capacity: usize) {
        let event = event.into();
        if event.trim().is_empty() {
            return;
        }
        self.episodic_logs.push(EpisodicLog { turn, event });
        prune_front(&mut self.episodic_logs, capacity);
    }

    /// Append text to the long-term summary.
    pub fn append_summary(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.long_term_summary.is_empty() {
            self.long_term_summary.push(' ');
        }
        self.long_term_summary.push_str(text);
    }

    /// Record a fact. Returns `false` if it was already known.
    pub fn learn_fact(&mut self, fact: &str, capacity: usize) -> bool {
        let fact = fact.trim();
        if fact.is_empty()
            || self
                .known_facts
                .iter()
                .any(|known| known.eq_ignore_ascii_case(fact))
        {
            return false;
        }
        self.known_facts.push(fact.to_string());
        prune_front(&mut self.known_facts, capacity);
        true
    }

    /// Trim every store back to its configured cap.
    pub fn enforce_caps(&mut self, config: &MemoryConfig) {
        while self.short_term_buffer.len() > config.short_term_capacity {
            self.short_term_buffer.pop_front();
        }
        prune_front(&mut self.episodic_logs, config.episodic_capacity);
        prune_front(&mut self.known_facts, config.known_facts_capacity);
    }

    /// The last `n` utterances, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Utterance> {
        let skip = self.short_term_buffer.len().saturating_sub(n);
        self.short_term_buffer.iter().skip(skip)
    }
}

fn prune_front<T>(items: &mut Vec<T>, capacity: usize) {
    if items.len() > capacity {
        let excess = items.len() - capacity;
        items.drain(..excess);
    }
}
