//! # dread-llm: inference layer for dread
//!
//! One interface for every generation call the engine makes:
//!   - **Ollama** (local, default)
//!   - **OpenAI-compatible API** (chat completions and image generations)
//!   - **None** (every call fails; useful for offline tests)
//!
//! The engine depends only on the [`InferenceBackend`] and [`ImageBackend`]
//! traits. Requests carry a [`ModelRole`] so each phase can run on its own
//! model:
//!
//! ```text
//! Simulation  JSON-mode, low temperature     ─► state patch
//! Narration   free prose, high temperature   ─► story text (+ patch)
//! Utility     small, cheap                   ─► summaries, autopilot, hydration
//! ```

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod client;
pub mod error;
pub mod image;
pub mod prompt;
pub mod types;

pub use backend::{ImageBackend, InferenceBackend};
pub use client::{LlmClient, LlmProvider, RoleModels};
pub use error::LlmError;
pub use image::ImageClient;
pub use prompt::{PromptEngine, PromptId};
pub use types::{LlmRequest, LlmResponse, ModelRole};
