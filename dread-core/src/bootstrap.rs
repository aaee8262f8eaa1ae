//! Session initialization: configuration in, first [`GameState`] out.
//!
//! Runs once per session before the first turn. A supplied roster is
//! normalized and trimmed to the memory caps, then used as-is; otherwise a
//! procedural roster is drawn from fixed pools with the caller's RNG, so a
//! seeded RNG gives a reproducible cast.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{MemoryConfig, SessionDefaults, StoryConfig};
use crate::location::{Exit, LocationState, RoomNode};
use crate::psyche::voice_signatures;
use crate::types::{
    GameState, Instinct, Meta, Mode, NarrativeState, NpcState, Perspective, PlayerProfile,
    TraumaProfile, VillainState,
};

/// Everything the player chooses before the first turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Narrative point of view.
    pub perspective: Perspective,
    /// Survivor or villain.
    pub mode: Mode,
    /// Thematic cluster ("gothic", "cosmic", "flesh", "folk", "signal").
    pub cluster: String,
    /// Intensity label.
    pub intensity: String,
    /// Added to the base turn budget; may be negative.
    pub turn_offset: i32,
    /// Pre-generated characters; replaces the procedural roster.
    pub roster: Option<Vec<NpcState>>,
    /// Player character sheet.
    pub profile: Option<PlayerProfile>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            perspective: Perspective::default(),
            mode: Mode::default(),
            cluster: "gothic".to_string(),
            intensity: "unsettling".to_string(),
            turn_offset: 0,
            roster: None,
            profile: None,
        }
    }
}

impl SessionConfig {
    /// Choices from a `[story]` config section, with an already hydrated
    /// roster. An empty roster falls back to a procedural one.
    #[must_use]
    pub fn from_story(story: &StoryConfig, roster: Vec<NpcState>) -> Self {
        Self {
            perspective: story.perspective,
            mode: story.mode,
            cluster: story.cluster.clone(),
            intensity: story.intensity.clone(),
            turn_offset: story.turn_offset,
            roster: (!roster.is_empty()).then_some(roster),
            profile: story.profile.clone(),
        }
    }
}

/// Build the opening state.
pub fn initial_state<R: Rng + ?Sized>(
    config: &SessionConfig,
    defaults: &SessionDefaults,
    memory: &MemoryConfig,
    rng: &mut R,
) -> GameState {
    let template = cluster_template(&config.cluster);

    let npc_states = match &config.roster {
        Some(roster) if !roster.is_empty() => roster
            .iter()
            .cloned()
            .map(|mut npc| {
                npc.normalize();
                npc.dialogue_state.memory.enforce_caps(memory);
                npc
            })
            .collect(),
        _ => procedural_roster(defaults.procedural_roster_size, rng),
    };

    let turn = i64::from(defaults.base_turns) + i64::from(config.turn_offset);
    let turn = u32::try_from(turn.max(1)).unwrap_or(u32::MAX);

    let state = GameState {
        meta: Meta {
            turn,
            perspective: config.perspective,
            mode: config.mode,
            intensity: config.intensity.clone(),
            active_cluster: template.cluster.to_string(),
            player_profile: config.profile.clone(),
        },
        villain_state: VillainState {
            name: template.villain.to_string(),
            archetype: template.archetype.to_string(),
            threat_level: 2,
            primary_goal: template.goal.to_string(),
            current_tactic: "watching from a distance".to_string(),
            weaknesses: template.weaknesses.iter().map(ToString::to_string).collect(),
        },
        npc_states,
        location_state: starting_location(&template),
        narrative: NarrativeState {
            visual_motif: template.motif.to_string(),
            illustration_request: None,
            past_summary: String::new(),
        },
        suggested_actions: vec![
            "Look around".to_string(),
            "Call out to anyone nearby".to_string(),
            "Check your pockets".to_string(),
        ],
    };

    info!(
        cluster = template.cluster,
        turns = state.meta.turn,
        npcs = state.npc_states.len(),
        mode = %state.meta.mode,
        "session initialized"
    );
    state
}

// ---------------------------------------------------------------------------
// Procedural roster
// ---------------------------------------------------------------------------

const FIRST_NAMES: &[&str] = &[
    "Ada", "Bram", "Cora", "Dov", "Elke", "Fenn", "Greta", "Hal", "Ines", "Jory", "Katya", "Lem",
    "Mira", "Noor", "Otto", "Pia", "Rook", "Sela", "Tam", "Ulla",
];

const ROLES: &[&str] = &[
    "night nurse", "groundskeeper", "schoolteacher", "trucker", "priest", "paramedic",
    "line cook", "retired surveyor", "teenage runaway", "night-shift guard",
];

const FEARS: &[&str] = &[
    "being buried alive", "losing their mind", "the dark", "being forgotten",
    "their own reflection", "deep water", "being touched",
];

const COPING: &[&str] = &[
    "counts things", "prays under their breath", "cracks bad jokes", "goes very quiet",
    "makes lists", "hums old songs",
];

const INSTINCTS: &[Instinct] = &[
    Instinct::Fight,
    Instinct::Flight,
    Instinct::Fawn,
    Instinct::Submit,
];

/// Draw `size` distinct characters from the pools.
pub fn procedural_roster<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Vec<NpcState> {
    let voices = voice_signatures();
    FIRST_NAMES
        .choose_multiple(rng, size.min(FIRST_NAMES.len()))
        .map(|name| {
            let role = ROLES.choose(rng).copied().unwrap_or("stranger");
            let mut npc = NpcState::new(*name, role);
            npc.origin = "local".to_string();
            npc.psychology.stress_level = rng.gen_range(10.0..45.0);
            npc.psychology.dominant_instinct = INSTINCTS.choose(rng).copied().unwrap_or_default();
            npc.psychology.trauma_profile = TraumaProfile {
                core_fear: FEARS.choose(rng).copied().unwrap_or("the dark").to_string(),
                triggers: Vec::new(),
                coping_mechanism: COPING
                    .choose(rng)
                    .copied()
                    .unwrap_or("goes very quiet")
                    .to_string(),
            };
            npc.dialogue_state.voice_signature =
                voices.choose(rng).copied().unwrap_or("plain").to_string();
            npc.relationship_state.trust = rng.gen_range(20.0..60.0);
            npc.relationship_state.fear = rng.gen_range(10.0..50.0);
            npc.relationship_state.has_secret_knowledge = rng.gen_bool(0.3);
            npc.current_goal = "get out alive".to_string();
            npc
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cluster templates
// ---------------------------------------------------------------------------

struct ClusterTemplate {
    cluster: &'static str,
    villain: &'static str,
    archetype: &'static str,
    goal: &'static str,
    weaknesses: &'static [&'static str],
    motif: &'static str,
    start_room: &'static str,
    start_description: &'static str,
    exits: &'static [&'static str],
}

const TEMPLATES: &[ClusterTemplate] = &[
    ClusterTemplate {
        cluster: "gothic",
        villain: "The Matron",
        archetype: "the hollow host",
        goal: "keep every guest forever",
        weaknesses: &["daylight", "her own portrait"],
        motif: "candle smoke and cracked oil paint",
        start_room: "Entrance Hall",
        start_description: "A stopped clock, dust sheets over the furniture, \
                            and a door that has just closed behind you.",
        exits: &["north", "east", "cellar door"],
    },
    ClusterTemplate {
        cluster: "cosmic",
        villain: "The Choir",
        archetype: "the thing between stars",
        goal: "be heard by everyone at once",
        weaknesses: &["silence", "forgetting"],
        motif: "wrong geometry under sodium light",
        start_room: "Observatory Lobby",
        start_description: "The dome above is open to a sky with too many stars in it.",
        exits: &["up", "west", "service corridor"],
    },
    ClusterTemplate {
        cluster: "flesh",
        villain: "The Surgeon",
        archetype: "the improver",
        goal: "perfect the human form",
        weaknesses: &["fire", "disorder"],
        motif: "surgical steel and wet tile",
        start_room: "Recovery Ward",
        start_description: "Empty beds with restraints. One of them is still warm.",
        exits: &["corridor", "south", "lift"],
    },
    ClusterTemplate {
        cluster: "folk",
        villain: "The Harvest Man",
        archetype: "the old custom",
        goal: "take the tithe the village owes",
        weaknesses: &["iron", "a broken promise"],
        motif: "straw effigies against a red field",
        start_room: "Village Green",
        start_description: "Bunting hangs over an empty square. \
                            Every door is painted with the same mark.",
        exits: &["church path", "east", "fields"],
    },
    ClusterTemplate {
        cluster: "signal",
        villain: "The Dead Air",
        archetype: "the broadcast",
        goal: "replace every voice with its own",
        weaknesses: &["analog noise", "being unplugged"],
        motif: "CRT glow and magnetic tape",
        start_room: "Control Room",
        start_description: "Monitors show rooms in the building you have not been to yet. \
                            In one of them, you are standing.",
        exits: &["north", "stairwell", "archive"],
    },
];

fn cluster_template(cluster: &str) -> &'static ClusterTemplate {
    let key = cluster.trim();
    TEMPLATES
        .iter()
        .find(|t| t.cluster.eq_ignore_ascii_case(key))
        .unwrap_or(&TEMPLATES[0])
}

fn starting_location(template: &ClusterTemplate) -> LocationState {
    LocationState::new(RoomNode {
        id: "room-start".to_string(),
        name: template.start_room.to_string(),
        description: template.start_description.to_string(),
        exits: template.exits.iter().map(|e| Exit::unexplored(*e)).collect(),
    })
}
