//! Error types for the dread core library.

use thiserror::Error;

use crate::location::LocationError;

/// Top-level error type for all core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A location-graph transition would break the graph invariant.
    #[error("Location invariant violated: {0}")]
    Location(#[from] LocationError),

    /// A state document failed its shape check.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored save record failed its checksum.
    #[error("Save record {id} is corrupt (checksum mismatch)")]
    CorruptSave {
        /// Which save failed.
        id: String,
    },

    /// No save record with the given id.
    #[error("Save record not found: {0}")]
    SaveNotFound(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, CoreError>;
