//! SQLite save slots.
//!
//! A [`SaveRecord`] is the whole session: state plus history. Each record is
//! stored as one JSON blob:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS saves (
//!     id         TEXT PRIMARY KEY,
//!     name       TEXT NOT NULL,
//!     summary    TEXT NOT NULL,
//!     data       BLOB NOT NULL,
//!     created_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! With checksums enabled a CRC-32 of the blob is stored next to it and a
//! mismatch on load is reported as [`CoreError::CorruptSave`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PersistenceConfig;
use crate::error::{CoreError, Result};
use crate::history::ChatMessage;
use crate::types::GameState;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS saves (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    summary    TEXT NOT NULL,
    data       BLOB NOT NULL,
    created_at TEXT NOT NULL,
    checksum   TEXT
);";

/// A complete saved session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    /// Unique id.
    pub id: String,
    /// When it was saved.
    pub timestamp: DateTime<Utc>,
    /// Player-chosen label.
    pub name: String,
    /// One-line description for save lists.
    pub summary: String,
    /// Canonical state at save time.
    pub game_state: GameState,
    /// Conversation at save time.
    pub history: Vec<ChatMessage>,
}

impl SaveRecord {
    /// Snapshot a session under `name`, with a fresh id and timestamp.
    #[must_use]
    pub fn new(name: impl Into<String>, game_state: GameState, history: Vec<ChatMessage>) -> Self {
        let summary = format!(
            "{} turns left, {} in {}",
            game_state.meta.turn,
            game_state.meta.mode,
            game_state
                .location_state
                .current_room()
                .map_or("somewhere", |r| r.name.as_str()),
        );
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            name: name.into(),
            summary,
            game_state,
            history,
        }
    }
}

/// Row of [`SaveStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveSlot {
    /// Record id.
    pub id: String,
    /// Player-chosen label.
    pub name: String,
    /// One-line description.
    pub summary: String,
    /// RFC 3339 save time.
    pub created_at: String,
}

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309), bitwise.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// SaveStore
// ---------------------------------------------------------------------------

/// Handle to the save database.
pub struct SaveStore {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SaveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SaveStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// [`CoreError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "save store opened");
        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// In-memory database, for tests and throwaway sessions.
    ///
    /// # Errors
    /// [`CoreError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Insert or replace a record.
    ///
    /// # Errors
    /// Serialization or database failure.
    pub fn save(&self, record: &SaveRecord) -> Result<()> {
        let json = serde_json::to_vec(record)?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));

        self.conn.execute(
            "INSERT INTO saves (id, name, summary, data, created_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                summary = excluded.summary,
                data = excluded.data,
                created_at = excluded.created_at,
                checksum = excluded.checksum",
            params![
                record.id,
                record.name,
                record.summary,
                json,
                record.timestamp.to_rfc3339(),
                checksum
            ],
        )?;

        debug!(
            id = %record.id,
            bytes = json.len(),
            messages = record.history.len(),
            "saved session"
        );
        Ok(())
    }

    /// Load a record by id.
    ///
    /// # Errors
    /// [`CoreError::SaveNotFound`], [`CoreError::CorruptSave`], or a
    /// database/serialization failure.
    pub fn load(&self, id: &str) -> Result<SaveRecord> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data, checksum FROM saves WHERE id = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored)) = row else {
            return Err(CoreError::SaveNotFound(id.to_string()));
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored {
                let actual = crc32_hex(&data);
                if actual != expected {
                    warn!(id, %expected, %actual, "save checksum mismatch");
                    return Err(CoreError::CorruptSave { id: id.to_string() });
                }
            }
        }

        Ok(serde_json::from_slice(&data)?)
    }

    /// Every slot, newest first.
    ///
    /// # Errors
    /// Database failure.
    pub fn list(&self) -> Result<Vec<SaveSlot>> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, name, summary, created_at FROM saves ORDER BY created_at DESC",
            )?;
        let rows = stmt.query_map([], |row| {
            Ok(SaveSlot {
                id: row.get(0)?,
                name: row.get(1)?,
                summary: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Delete a slot. Returns whether it existed.
    ///
    /// # Errors
    /// Database failure.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM saves WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}
