//! Core type definitions: the [`GameState`] document and everything in it.
//!
//! Wire names are camelCase because the same JSON is shown to, and parsed
//! back from, generative models. Every struct carries `#[serde(default)]` so
//! a partial document still deserializes; enums parse leniently from labels
//! ("FIGHT", "Fight", "fight" are the same instinct).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::extract::Extractable;
use crate::location::{self, LocationError, LocationState};
use crate::memory::DialogueMemory;
use crate::psyche::SocialIntent;

/// Highest fracture level; the character is no longer a normal person.
pub const FRACTURE_ANOMALY: u8 = 4;

/// Lowercase a label and drop everything that is not alphanumeric.
pub(crate) fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Which side of the story the player is on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Mode {
    /// Player tries to live through it.
    #[default]
    Survivor,
    /// Player is the thing in the dark.
    Villain,
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "survivor" | "survival" | "victim" => Ok(Self::Survivor),
            "villain" | "antagonist" | "killer" => Ok(Self::Villain),
            other => Err(format!("unknown mode: '{other}'")),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Narrative point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Perspective {
    /// "I open the door."
    FirstPerson,
    /// "You open the door."
    #[default]
    SecondPerson,
    /// "She opens the door."
    ThirdPerson,
}

impl FromStr for Perspective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "firstperson" | "first" | "1st" => Ok(Self::FirstPerson),
            "secondperson" | "second" | "2nd" => Ok(Self::SecondPerson),
            "thirdperson" | "third" | "3rd" => Ok(Self::ThirdPerson),
            other => Err(format!("unknown perspective: '{other}'")),
        }
    }
}

impl TryFrom<String> for Perspective {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Perspective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FirstPerson => "first person",
            Self::SecondPerson => "second person",
            Self::ThirdPerson => "third person",
        };
        write!(f, "{label}")
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Survivor => write!(f, "survivor"),
            Self::Villain => write!(f, "villain"),
        }
    }
}

/// What a character does when stress overwhelms them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Instinct {
    /// Lash out.
    Fight,
    /// Get away, change the subject.
    #[default]
    Flight,
    /// Appease the threat.
    Fawn,
    /// Collapse and plead.
    Submit,
}

impl FromStr for Instinct {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "fight" | "aggression" | "attack" => Ok(Self::Fight),
            "flight" | "flee" | "escape" => Ok(Self::Flight),
            "fawn" | "appease" | "please" => Ok(Self::Fawn),
            "submit" | "freeze" | "surrender" => Ok(Self::Submit),
            other => Err(format!("unknown instinct: '{other}'")),
        }
    }
}

impl TryFrom<String> for Instinct {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// How bad an injury is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum InjurySeverity {
    /// Cuts, bruises.
    #[default]
    Minor,
    /// Impairs action.
    Serious,
    /// Life-threatening without help.
    Critical,
    /// Terminal.
    Fatal,
}

impl FromStr for InjurySeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "minor" | "light" | "low" => Ok(Self::Minor),
            "serious" | "moderate" | "medium" => Ok(Self::Serious),
            "critical" | "severe" | "high" => Ok(Self::Critical),
            "fatal" | "mortal" | "lethal" => Ok(Self::Fatal),
            other => Err(format!("unknown injury severity: '{other}'")),
        }
    }
}

impl TryFrom<String> for InjurySeverity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Terminal and non-terminal consciousness states. Characters are never
/// removed from the roster; death is a state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Consciousness {
    /// Awake and responsive.
    #[default]
    Alert,
    /// Dazed, drugged, in shock.
    Impaired,
    /// Out cold.
    Unconscious,
    /// Dead.
    Deceased,
}

impl FromStr for Consciousness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "alert" | "awake" | "conscious" => Ok(Self::Alert),
            "impaired" | "dazed" | "shock" | "shaken" => Ok(Self::Impaired),
            "unconscious" | "knockedout" | "comatose" => Ok(Self::Unconscious),
            "deceased" | "dead" | "killed" => Ok(Self::Deceased),
            other => Err(format!("unknown consciousness state: '{other}'")),
        }
    }
}

impl TryFrom<String> for Consciousness {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// NPC
// ---------------------------------------------------------------------------

/// What broke this character, and what sets them off.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraumaProfile {
    /// The fear underneath everything.
    pub core_fear: String,
    /// Stimuli that push fracture upward.
    pub triggers: Vec<String>,
    /// How they hold themselves together.
    pub coping_mechanism: String,
}

/// Mental state of a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Psychology {
    /// 0 (calm) to 100 (breaking).
    pub stress_level: f32,
    /// Reaction under overwhelming stress.
    pub dominant_instinct: Instinct,
    /// 0 to 100.
    pub sanity_percentage: f32,
    /// Fracture-relevant history.
    pub trauma_profile: TraumaProfile,
}

impl Default for Psychology {
    fn default() -> Self {
        Self {
            stress_level: 20.0,
            dominant_instinct: Instinct::default(),
            sanity_percentage: 100.0,
            trauma_profile: TraumaProfile::default(),
        }
    }
}

/// Voice and conversational state of a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogueState {
    /// Key into the static voice table.
    pub voice_signature: String,
    /// What they remember.
    pub memory: DialogueMemory,
    /// The maneuver used before the current one.
    pub last_social_maneuver: Option<SocialIntent>,
    /// The maneuver they are using now.
    pub current_social_intent: Option<SocialIntent>,
}

impl Default for DialogueState {
    fn default() -> Self {
        Self {
            voice_signature: "plain".to_string(),
            memory: DialogueMemory::default(),
            last_social_maneuver: None,
            current_social_intent: None,
        }
    }
}

/// How a character regards the player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelationshipState {
    /// 0 to 100.
    pub trust: f32,
    /// 0 to 100.
    pub fear: f32,
    /// Whether the character is hiding something that matters.
    pub has_secret_knowledge: bool,
}

impl Default for RelationshipState {
    fn default() -> Self {
        Self {
            trust: 40.0,
            fear: 30.0,
            has_secret_knowledge: false,
        }
    }
}

/// One wound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Injury {
    /// Body location.
    pub location: String,
    /// How bad.
    pub severity: InjurySeverity,
    /// What it looks like.
    pub description: String,
}

/// One simulated character.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NpcState {
    /// Unique display name; the merge key for patches.
    pub name: String,
    /// Occupation or function in the story.
    pub role: String,
    /// Where they come from.
    pub origin: String,
    /// Mental state.
    pub psychology: Psychology,
    /// Voice and memory.
    pub dialogue_state: DialogueState,
    /// Feelings toward the player.
    pub relationship_state: RelationshipState,
    /// Current wounds.
    pub active_injuries: Vec<Injury>,
    /// Awake, out, or dead.
    pub consciousness: Consciousness,
    /// 0 (stable) to 4 (anomaly).
    pub fracture_state: u8,
    /// Items and leverage they carry.
    pub resources_held: Vec<String>,
    /// What they are currently trying to do.
    pub current_goal: String,
    /// 0 to 100.
    pub goal_progress: f32,
}

impl NpcState {
    /// A fresh character with default psychology.
    #[must_use]
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            ..Self::default()
        }
    }

    /// Clamp every bounded scalar into range.
    pub fn normalize(&mut self) {
        self.psychology.stress_level = clamp_percent(self.psychology.stress_level);
        self.psychology.sanity_percentage = clamp_percent(self.psychology.sanity_percentage);
        self.relationship_state.trust = clamp_percent(self.relationship_state.trust);
        self.relationship_state.fear = clamp_percent(self.relationship_state.fear);
        self.goal_progress = clamp_percent(self.goal_progress);
        self.fracture_state = self.fracture_state.min(FRACTURE_ANOMALY);
        self.name = self.name.trim().to_string();
    }

    /// Whether the character can still act.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.consciousness,
            Consciousness::Alert | Consciousness::Impaired
        )
    }
}

impl Extractable for NpcState {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("character has no name".to_string());
        }
        Ok(())
    }
}

fn clamp_percent(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 100.0) }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// The player's character sheet, in survivor or villain mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerProfile {
    /// Character name.
    pub name: String,
    /// Short backstory.
    pub background: String,
    /// Personality or power traits.
    pub traits: Vec<String>,
}

/// Session-level bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Meta {
    /// Turns remaining; 0 is terminal.
    pub turn: u32,
    /// Narrative point of view.
    pub perspective: Perspective,
    /// Survivor or villain.
    pub mode: Mode,
    /// Intensity label ("unsettling", "harrowing", ...).
    pub intensity: String,
    /// Active thematic cluster.
    pub active_cluster: String,
    /// Optional player character sheet.
    pub player_profile: Option<PlayerProfile>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            turn: 50,
            perspective: Perspective::default(),
            mode: Mode::default(),
            intensity: "unsettling".to_string(),
            active_cluster: "gothic".to_string(),
            player_profile: None,
        }
    }
}

/// The antagonist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VillainState {
    /// Name or epithet.
    pub name: String,
    /// Archetype ("the hollow host", "the surgeon", ...).
    pub archetype: String,
    /// 0 (dormant) to 10 (manifest).
    pub threat_level: u8,
    /// What it wants.
    pub primary_goal: String,
    /// What it is doing right now.
    pub current_tactic: String,
    /// Known ways to hurt it.
    pub weaknesses: Vec<String>,
}

/// Story-level state outside the simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NarrativeState {
    /// Recurring visual motif used for illustrations.
    pub visual_motif: String,
    /// Pending illustration prompt, if any.
    pub illustration_request: Option<String>,
    /// Rolling summary of compacted history.
    pub past_summary: String,
}

/// The canonical simulation document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameState {
    /// Session bookkeeping.
    pub meta: Meta,
    /// The antagonist.
    pub villain_state: VillainState,
    /// Every character ever introduced.
    pub npc_states: Vec<NpcState>,
    /// The location graph.
    pub location_state: LocationState,
    /// Story-level state.
    pub narrative: NarrativeState,
    /// Actions offered to the player next.
    pub suggested_actions: Vec<String>,
}

impl GameState {
    /// Check the structural invariants of the document.
    ///
    /// # Errors
    /// The first location invariant that does not hold.
    pub fn validate(&self) -> Result<(), LocationError> {
        location::validate(&self.location_state)
    }

    /// Whether the session has run out of turns.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.meta.turn == 0
    }

    /// Spend one turn. Never goes below zero.
    pub fn advance_turn(&mut self) {
        self.meta.turn = self.meta.turn.saturating_sub(1);
    }

    /// Find a character by name (case-insensitive).
    #[must_use]
    pub fn npc(&self, name: &str) -> Option<&NpcState> {
        self.npc_states
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Index of a character by name (case-insensitive).
    #[must_use]
    pub fn npc_index(&self, name: &str) -> Option<usize> {
        self.npc_states
            .iter()
            .position(|n| n.name.eq_ignore_ascii_case(name.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_parse_leniently() {
        assert_eq!("FIGHT".parse::<Instinct>(), Ok(Instinct::Fight));
        assert_eq!("freeze".parse::<Instinct>(), Ok(Instinct::Submit));
        assert_eq!("Third-Person".parse::<Perspective>(), Ok(Perspective::ThirdPerson));
        assert_eq!("Dead".parse::<Consciousness>(), Ok(Consciousness::Deceased));
        assert!("sideways".parse::<Mode>().is_err());
    }

    #[test]
    fn enums_serialize_to_parseable_labels() {
        let json = serde_json::to_string(&Consciousness::Unconscious).expect("serialize");
        assert_eq!(json, "\"unconscious\"");
        let back: Consciousness = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Consciousness::Unconscious);

        let json = serde_json::to_string(&Perspective::FirstPerson).expect("serialize");
        let back: Perspective = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Perspective::FirstPerson);
    }

    #[test]
    fn partial_npc_json_uses_defaults() {
        let npc: NpcState = serde_json::from_str(
            r#"{"name": "Marta", "psychology": {"dominantInstinct": "FAWN"}}"#,
        )
        .expect("partial npc parses");
        assert_eq!(npc.name, "Marta");
        assert_eq!(npc.psychology.dominant_instinct, Instinct::Fawn);
        assert!((npc.psychology.sanity_percentage - 100.0).abs() < f32::EPSILON);
        assert_eq!(npc.fracture_state, 0);
    }

    #[test]
    fn normalize_clamps_everything() {
        let mut npc = NpcState::new("  Ivo ", "porter");
        npc.psychology.stress_level = 180.0;
        npc.relationship_state.fear = -4.0;
        npc.fracture_state = 9;
        npc.goal_progress = f32::NAN;
        npc.normalize();
        assert_eq!(npc.name, "Ivo");
        assert!((npc.psychology.stress_level - 100.0).abs() < f32::EPSILON);
        assert!(npc.relationship_state.fear.abs() < f32::EPSILON);
        assert_eq!(npc.fracture_state, FRACTURE_ANOMALY);
        assert!(npc.goal_progress.abs() < f32::EPSILON);
    }

    #[test]
    fn advance_turn_saturates_at_zero() {
        let mut state = GameState::default();
        state.meta.turn = 1;
        state.advance_turn();
        assert!(state.is_terminal());
        state.advance_turn();
        assert_eq!(state.meta.turn, 0);
    }

    #[test]
    fn default_state_is_valid() {
        assert!(GameState::default().validate().is_ok());
    }
}
