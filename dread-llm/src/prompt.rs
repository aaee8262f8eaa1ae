//! Prompt templates for every inference call the engine makes.
//!
//! Each template is a system/user pair with `{key}` placeholders plus the
//! sampling settings it was written for. The built-in set is compiled in;
//! a directory of TOML files can override any of them:
//!
//! ```toml
//! [prompt]
//! version = "2"
//! role = "narration"
//! max_tokens = 900
//! temperature = 0.9
//! json_mode = false
//! system = "..."
//! user = "..."
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use crate::error::LlmError;
use crate::types::{LlmRequest, ModelRole};

/// Simulation phase: state + action in, JSON state patch out.
pub const SIMULATION_SYSTEM: &str = r#"You are the simulation engine of a {mode}-mode survival horror story ({cluster}, intensity: {intensity}).
You do not write prose. You decide what the player's action changes in the world, deterministically and fairly.

RULES:
- Consequences follow from the current state: injuries, stress, fear, trust, goals, location.
- Characters act on their own goals. Nobody is ever removed; the dead are marked "consciousness": "deceased".
- Only move the player through an exit listed in the location manifest, or a new exit the action plausibly opens.
- fractureState rises only when a character's trauma triggers are hit; 4 means they have become an anomaly.
- If the input is a question about the game itself rather than an in-story action, set "isMeta": true and leave "statePatch" empty.
- Respond with JSON only."#;

/// User half of the simulation prompt.
pub const SIMULATION_USER: &str = r#"CURRENT STATE:
{state_json}

{location_manifest}
VILLAIN:
{villain_manifest}
CHARACTERS:
{npc_manifest}
ATTACHMENTS:
{attachments}

PLAYER ACTION: {action}

Return JSON:
{"isMeta": false,
 "statePatch": {
   "npcStates": [{"name": "...", "psychology": {"stressLevel": 0-100}, "relationshipState": {"trust": 0-100, "fear": 0-100}, "activeInjuries": [], "consciousness": "alert|impaired|unconscious|deceased", "fractureState": 0-4, "currentGoal": "...", "goalProgress": 0-100, "newFacts": ["..."], "memoryEvent": "..."}],
   "villainState": {"threatLevel": 0-10, "currentTactic": "..."},
   "location": {"movedVia": "exit label or null", "arrivedRoom": {"name": "...", "description": "...", "exits": ["..."]}, "weather": "...", "timeOfDay": "...", "severity": 0-5},
   "npcEvents": [{"npc": "...", "event": "..."}],
   "suggestedActions": ["...", "...", "..."]
 },
 "illustrationRequest": null}"#;

/// Narration phase: post-simulation state in, prose out.
pub const NARRATION_SYSTEM: &str = r#"You are the narrator of a {mode}-mode survival horror story ({cluster}, intensity: {intensity}).
Write in the {perspective}. The simulation has already decided what happened; you make it felt.

RULES:
- Never contradict the state. Never invent deaths, exits or items the state does not have.
- Play every character by their stance directive and voice; do not name the stance.
- Keep it to three short paragraphs. End on something the player can act on.
- You may correct small inconsistencies with a "statePatch" and quote dialogue in "dialogue".
- Return JSON with the prose in "storyText"."#;

/// User half of the narration prompt.
pub const NARRATION_USER: &str = r#"STORY SO FAR: {past_summary}

STATE AFTER SIMULATION:
{state_json}

WHAT CHANGED THIS TURN:
{delta_json}

{location_manifest}
CHARACTERS (stance, directive, voice):
{npc_manifest}

PLAYER ACTION: {action}

Return JSON:
{"storyText": "...",
 "statePatch": {"dialogue": [{"npc": "...", "speaker": "...", "text": "..."}]},
 "illustrationRequest": "one-sentence scene description, or null"}"#;

/// Out-of-character reply: answers the player outside the fiction.
pub const OOC_SYSTEM: &str = r"You are the game master of an interactive horror story, stepping outside the fiction for a moment.
Answer the player's question plainly and briefly. Do not advance the story or change anything.
Mechanics you may explain: turns count down to zero; stress, trust and fear run 0-100; fractureState runs 0 (stable) to 4 (anomaly).";

/// User half of the out-of-character prompt.
pub const OOC_USER: &str = r"PLAYER QUESTION: {question}

CURRENT STATE (for reference only):
{state_json}";

/// History summary: pruned transcript in, a paragraph out.
pub const SUMMARY_SYSTEM: &str = r"You compress the early part of a horror story into a dense, factual summary.
Keep names, injuries, deaths, discoveries, promises and locations. No commentary.";

/// User half of the summary prompt.
pub const SUMMARY_USER: &str = r"SUMMARY SO FAR: {existing_summary}

TRANSCRIPT TO COMPRESS:
{transcript}

Write one paragraph that continues the summary.";

/// Autopilot: choose the player's next action.
pub const AUTOPILOT_SYSTEM: &str = r#"You play the protagonist of a horror story. Choose the next action a frightened but resourceful person would take.
Reply with JSON: {"action": "one short imperative sentence"}"#;

/// User half of the autopilot prompt.
pub const AUTOPILOT_USER: &str = r"SITUATION:
{state_brief}

LAST PASSAGE:
{recent_story}

SUGGESTED ACTIONS:
{suggested_actions}";

/// Character hydration: free-text description in, character JSON out.
pub const HYDRATION_SYSTEM: &str = r#"You turn a short character description into a character sheet for a {cluster} horror story.
Reply with JSON only, using these keys:
{"name": "...", "role": "...", "origin": "...",
 "psychology": {"stressLevel": 0-100, "dominantInstinct": "fight|flight|fawn|submit", "sanityPercentage": 0-100,
                "traumaProfile": {"coreFear": "...", "triggers": ["..."], "copingMechanism": "..."}},
 "dialogueState": {"voiceSignature": "{voices}"},
 "relationshipState": {"trust": 0-100, "fear": 0-100, "hasSecretKnowledge": false},
 "resourcesHeld": ["..."], "currentGoal": "..."}"#;

/// User half of the hydration prompt.
pub const HYDRATION_USER: &str = r"DESCRIPTION: {description}";

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value; unknown placeholders and
/// literal JSON braces are left alone.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        result = result.replace(&format!("{{{key}}}"), value);
    }
    result
}

// ---------------------------------------------------------------------------
// PromptEngine
// ---------------------------------------------------------------------------

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Simulation phase.
    Simulation,
    /// Narration phase.
    Narration,
    /// Out-of-character reply.
    OocReply,
    /// Compaction summary.
    HistorySummary,
    /// Autopilot action synthesis.
    AutopilotAction,
    /// Character sheet from description.
    NpcHydration,
}

impl PromptId {
    /// The TOML filename (without path) for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::Simulation => "simulation.toml",
            Self::Narration => "narration.toml",
            Self::OocReply => "ooc_reply.toml",
            Self::HistorySummary => "history_summary.toml",
            Self::AutopilotAction => "autopilot_action.toml",
            Self::NpcHydration => "npc_hydration.toml",
        }
    }

    /// All prompt ids.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[
            Self::Simulation,
            Self::Narration,
            Self::OocReply,
            Self::HistorySummary,
            Self::AutopilotAction,
            Self::NpcHydration,
        ]
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simulation => "simulation",
            Self::Narration => "narration",
            Self::OocReply => "ooc_reply",
            Self::HistorySummary => "history_summary",
            Self::AutopilotAction => "autopilot_action",
            Self::NpcHydration => "npc_hydration",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulation" => Ok(Self::Simulation),
            "narration" => Ok(Self::Narration),
            "ooc_reply" => Ok(Self::OocReply),
            "history_summary" => Ok(Self::HistorySummary),
            "autopilot_action" => Ok(Self::AutopilotAction),
            "npc_hydration" => Ok(Self::NpcHydration),
            _ => Err(format!("unknown prompt id: '{s}'")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    role: ModelRole,
    max_tokens: u32,
    temperature: f32,
    #[serde(default)]
    json_mode: bool,
    system: String,
    user: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Version string ("builtin" for compiled-in templates).
    pub version: String,
    /// Model the template targets.
    pub role: ModelRole,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Ask for JSON-only output.
    pub json_mode: bool,
    /// System prompt with `{key}` placeholders.
    pub system: String,
    /// User prompt with `{key}` placeholders.
    pub user: String,
}

impl PromptTemplate {
    fn builtin(
        role: ModelRole,
        max_tokens: u32,
        temperature: f32,
        json_mode: bool,
        system: &str,
        user: &str,
    ) -> Self {
        Self {
            version: "builtin".into(),
            role,
            max_tokens,
            temperature,
            json_mode,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Holds the active template set and renders requests from it.
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptEngine {
    /// The compiled-in template set.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(
            PromptId::Simulation,
            PromptTemplate::builtin(
                ModelRole::Simulation,
                1200,
                0.3,
                true,
                SIMULATION_SYSTEM,
                SIMULATION_USER,
            ),
        );
        templates.insert(
            PromptId::Narration,
            PromptTemplate::builtin(
                ModelRole::Narration,
                900,
                0.85,
                false,
                NARRATION_SYSTEM,
                NARRATION_USER,
            ),
        );
        templates.insert(
            PromptId::OocReply,
            PromptTemplate::builtin(ModelRole::Utility, 250, 0.4, false, OOC_SYSTEM, OOC_USER),
        );
        templates.insert(
            PromptId::HistorySummary,
            PromptTemplate::builtin(
                ModelRole::Utility,
                300,
                0.3,
                false,
                SUMMARY_SYSTEM,
                SUMMARY_USER,
            ),
        );
        templates.insert(
            PromptId::AutopilotAction,
            PromptTemplate::builtin(
                ModelRole::Utility,
                80,
                0.9,
                true,
                AUTOPILOT_SYSTEM,
                AUTOPILOT_USER,
            ),
        );
        templates.insert(
            PromptId::NpcHydration,
            PromptTemplate::builtin(
                ModelRole::Utility,
                500,
                0.6,
                true,
                HYDRATION_SYSTEM,
                HYDRATION_USER,
            ),
        );
        Self { templates }
    }

    /// The built-in set with any TOML files found in `dir` layered on top.
    ///
    /// Files are matched by [`PromptId::filename`]; other files are ignored.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] if `dir` is not a directory or a matching
    /// file cannot be read or parsed.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, LlmError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LlmError::ConfigError(format!(
                "prompt directory not found: {}",
                dir.display()
            )));
        }

        let mut engine = Self::builtin();
        for id in PromptId::all() {
            let path = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path).map_err(|e| {
                LlmError::ConfigError(format!("failed to read {}: {e}", path.display()))
            })?;
            let parsed: TomlPromptFile = toml::from_str(&content).map_err(|e| {
                LlmError::ConfigError(format!("failed to parse {}: {e}", path.display()))
            })?;
            let d = parsed.prompt;
            debug!(prompt = %id, version = %d.version, "prompt override loaded");
            engine.templates.insert(
                *id,
                PromptTemplate {
                    version: d.version,
                    role: d.role,
                    max_tokens: d.max_tokens,
                    temperature: d.temperature,
                    json_mode: d.json_mode,
                    system: d.system,
                    user: d.user,
                },
            );
        }
        Ok(engine)
    }

    /// Get a template by id.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render `(system, user)` for a template.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] if the id is not loaded.
    pub fn render(
        &self,
        id: PromptId,
        vars: &[(&str, &str)],
    ) -> Result<(String, String), LlmError> {
        let tpl = self
            .get(id)
            .ok_or_else(|| LlmError::ConfigError(format!("prompt template '{id}' not loaded")))?;
        Ok((render_template(&tpl.system, vars), render_template(&tpl.user, vars)))
    }

    /// Render a template straight into a request with its sampling settings.
    ///
    /// # Errors
    /// [`LlmError::ConfigError`] if the id is not loaded.
    pub fn request(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<LlmRequest, LlmError> {
        let (system, user) = self.render(id, vars)?;
        let tpl = self
            .get(id)
            .ok_or_else(|| LlmError::ConfigError(format!("prompt template '{id}' not loaded")))?;
        let base = match tpl.role {
            ModelRole::Simulation => LlmRequest::simulation(system, user),
            ModelRole::Narration => LlmRequest::narration(system, user),
            ModelRole::Utility => LlmRequest::utility(system, user),
        };
        Ok(base
            .with_sampling(tpl.max_tokens, tpl.temperature)
            .with_json_mode(tpl.json_mode))
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
