//! Configuration for the dread turn engine.
//!
//! Maps directly to `dread.toml`. Every section and every field has a serde
//! default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::types::{Mode, Perspective, PlayerProfile};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DreadConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Text inference backend.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Illustration backend.
    #[serde(default)]
    pub image: ImageConfig,
    /// Per-NPC dialogue memory caps.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Rolling history compaction.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Autopilot pacing.
    #[serde(default)]
    pub autopilot: AutopilotConfig,
    /// Session bootstrap settings.
    #[serde(default)]
    pub session: SessionDefaults,
    /// The story to start.
    #[serde(default)]
    pub story: StoryConfig,
    /// Save storage.
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl DreadConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `CoreError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::CoreError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log format: "pretty" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Text-generation backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai", "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL for the API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Environment variable holding the API key (OpenAI-compatible only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model used for the simulation phase.
    #[serde(default = "default_simulation_model")]
    pub simulation_model: String,
    /// Model used for the narration phase.
    #[serde(default = "default_narration_model")]
    pub narration_model: String,
    /// Model used for summaries, autopilot actions and roster hydration.
    #[serde(default = "default_utility_model")]
    pub utility_model: String,
    /// Hard timeout for any single call in milliseconds.
    #[serde(default = "default_60000")]
    pub request_timeout_ms: u64,
    /// Retries before the call is reported as failed.
    #[serde(default = "default_1")]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            api_key_env: "DREAD_API_KEY".to_string(),
            simulation_model: "qwen2.5:7b-instruct".to_string(),
            narration_model: "mistral:7b-instruct".to_string(),
            utility_model: "qwen2.5:1.5b".to_string(),
            request_timeout_ms: 60_000,
            max_retries: 1,
        }
    }
}

/// Illustration backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Whether illustration requests are dispatched at all.
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of an OpenAI-compatible images API.
    #[serde(default = "default_image_url")]
    pub base_url: String,
    /// Image model name.
    #[serde(default = "default_image_model")]
    pub model: String,
    /// Requested image size, e.g. "1024x1024".
    #[serde(default = "default_image_size")]
    pub size: String,
    /// Timeout for one image call in milliseconds.
    #[serde(default = "default_120000")]
    pub request_timeout_ms: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:8080".to_string(),
            model: "sdxl-turbo".to_string(),
            size: "1024x1024".to_string(),
            request_timeout_ms: 120_000,
        }
    }
}

/// Per-character dialogue memory capacity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Ring-buffer size of recent utterances per NPC.
    #[serde(default = "default_8")]
    pub short_term_capacity: usize,
    /// Episodic log entries kept per NPC (most recent win).
    #[serde(default = "default_12")]
    pub episodic_capacity: usize,
    /// Known facts kept per NPC.
    #[serde(default = "default_32")]
    pub known_facts_capacity: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_capacity: 8,
            episodic_capacity: 12,
            known_facts_capacity: 32,
        }
    }
}

/// Rolling history compaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Compaction runs once history grows past this many messages.
    #[serde(default = "default_20")]
    pub compaction_threshold: usize,
    /// How many of the oldest messages are pruned and summarized.
    #[serde(default = "default_10")]
    pub prune_count: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: 20,
            prune_count: 10,
        }
    }
}

/// Autopilot pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopilotConfig {
    /// Delay between autopilot turns in milliseconds.
    #[serde(default = "default_4000")]
    pub pacing_ms: u64,
    /// Cycles granted by `/auto` without an explicit count.
    #[serde(default = "default_5_u32")]
    pub default_cycles: u32,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 4000,
            default_cycles: 5,
        }
    }
}

/// Defaults used when a session is bootstrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Turn budget before the configured offset is applied.
    #[serde(default = "default_50")]
    pub base_turns: u32,
    /// Procedural roster size when no roster is supplied.
    #[serde(default = "default_4")]
    pub procedural_roster_size: usize,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            base_turns: 50,
            procedural_roster_size: 4,
        }
    }
}

/// The player's choices for a new story.
///
/// Character descriptions are free text; they are turned into full
/// character sheets by the utility model before the first turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryConfig {
    /// Narrative point of view.
    #[serde(default)]
    pub perspective: Perspective,
    /// Survivor or villain.
    #[serde(default)]
    pub mode: Mode,
    /// Thematic cluster.
    #[serde(default = "default_cluster")]
    pub cluster: String,
    /// Intensity label.
    #[serde(default = "default_intensity")]
    pub intensity: String,
    /// Added to the base turn budget; may be negative.
    #[serde(default)]
    pub turn_offset: i32,
    /// Character descriptions; empty means a procedural roster.
    #[serde(default)]
    pub characters: Vec<String>,
    /// Player character sheet.
    #[serde(default)]
    pub profile: Option<PlayerProfile>,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            perspective: Perspective::default(),
            mode: Mode::default(),
            cluster: default_cluster(),
            intensity: default_intensity(),
            turn_offset: 0,
            characters: Vec::new(),
            profile: None,
        }
    }
}

/// Save storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite save database.
    #[serde(default = "default_save_path")]
    pub path: String,
    /// Use WAL mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Detect save corruption via checksums.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: "dread_saves.db".to_string(),
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_api_key_env() -> String { "DREAD_API_KEY".to_string() }
fn default_simulation_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_narration_model() -> String { "mistral:7b-instruct".to_string() }
fn default_utility_model() -> String { "qwen2.5:1.5b".to_string() }
fn default_image_url() -> String { "http://localhost:8080".to_string() }
fn default_image_model() -> String { "sdxl-turbo".to_string() }
fn default_image_size() -> String { "1024x1024".to_string() }
fn default_save_path() -> String { "dread_saves.db".to_string() }
fn default_cluster() -> String { "gothic".to_string() }
fn default_intensity() -> String { "unsettling".to_string() }
fn default_1() -> u32 { 1 }
fn default_4() -> usize { 4 }
fn default_5_u32() -> u32 { 5 }
fn default_8() -> usize { 8 }
fn default_10() -> usize { 10 }
fn default_12() -> usize { 12 }
fn default_20() -> usize { 20 }
fn default_32() -> usize { 32 }
fn default_50() -> u32 { 50 }
fn default_4000() -> u64 { 4000 }
fn default_60000() -> u64 { 60_000 }
fn default_120000() -> u64 { 120_000 }
