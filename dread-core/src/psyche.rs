//! NPC psychological engine: from character state to acting directive.
//!
//! [`compute_stance`] is a fixed, priority-ordered decision table:
//!
//! ```text
//! 1. fracture_state >= 4                 → RealityDenial (overrides all)
//! 2. stress > 85, by dominant instinct:
//!      fight → Attack   flight → Deflect   fawn → Placate   submit → Beg
//! 3. relationship matrix:
//!      trust > 75                        → Confess
//!      fear  > 70                        → Placate
//!      trust < 30 ∧ fear < 50            → Observe
//!      trust < 30 ∧ fear > 50            → Deflect
//! 4. otherwise                           → Bargain
//! ```
//!
//! Same input, same stance. Voice profiles are a static table keyed by the
//! character's voice signature; they only colour the narration prompt.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::MemoryConfig;
use crate::memory::Utterance;
use crate::types::{normalize_label, Instinct, NpcState, FRACTURE_ANOMALY};

/// Stress above this lets instinct take over.
pub const STRESS_BREAKPOINT: f32 = 85.0;

/// The social maneuver a character is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SocialIntent {
    /// Insists the impossible is normal; gaslights.
    RealityDenial,
    /// Hostile, threatening.
    Attack,
    /// Evasive, changes the subject.
    Deflect,
    /// Appeasing, agreeable to a fault.
    Placate,
    /// Pleading.
    Beg,
    /// Opens up, shares secrets.
    Confess,
    /// Guarded, watching.
    Observe,
    /// Transactional.
    Bargain,
}

impl SocialIntent {
    /// The acting directive handed to the narration phase.
    #[must_use]
    pub fn directive(self) -> &'static str {
        match self {
            Self::RealityDenial => {
                "Speaks as if the impossible is ordinary. Denies what the player saw, \
                 contradicts earlier events calmly, and treats fear as the player's confusion."
            }
            Self::Attack => {
                "Hostile and cornered. Threatens, blames, may strike first. Short, sharp sentences."
            }
            Self::Deflect => {
                "Evasive. Answers questions with questions, changes the subject, \
                 edges toward exits."
            }
            Self::Placate => {
                "Eager to please. Agrees too quickly, offers help it may not mean, avoids conflict."
            }
            Self::Beg => {
                "Broken down. Pleads for safety or mercy, offers anything, cannot hold eye contact."
            }
            Self::Confess => {
                "Trusts the player. Lowers their guard and shares something they have been hiding."
            }
            Self::Observe => {
                "Guarded and watchful. Gives little away, studies the player, \
                 tests their intentions."
            }
            Self::Bargain => {
                "Transactional. Nothing is free; trades information or help \
                 for something in return."
            }
        }
    }
}

impl fmt::Display for SocialIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RealityDenial => "reality_denial",
            Self::Attack => "attack",
            Self::Deflect => "deflect",
            Self::Placate => "placate",
            Self::Beg => "beg",
            Self::Confess => "confess",
            Self::Observe => "observe",
            Self::Bargain => "bargain",
        };
        write!(f, "{label}")
    }
}

impl FromStr for SocialIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_label(s).as_str() {
            "realitydenial" | "gaslight" | "denial" => Ok(Self::RealityDenial),
            "attack" | "aggress" | "threaten" => Ok(Self::Attack),
            "deflect" | "evasive" | "evade" => Ok(Self::Deflect),
            "placate" | "appease" => Ok(Self::Placate),
            "beg" | "plead" => Ok(Self::Beg),
            "confess" | "openup" => Ok(Self::Confess),
            "observe" | "guarded" | "guardedobservation" => Ok(Self::Observe),
            "bargain" | "transactional" | "negotiate" => Ok(Self::Bargain),
            other => Err(format!("unknown social intent: '{other}'")),
        }
    }
}

impl TryFrom<String> for SocialIntent {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Output of [`compute_stance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stance {
    /// Chosen maneuver.
    pub intent: SocialIntent,
    /// How to play it.
    pub directive: &'static str,
}

impl From<SocialIntent> for Stance {
    fn from(intent: SocialIntent) -> Self {
        Self {
            intent,
            directive: intent.directive(),
        }
    }
}

/// Evaluate the stance decision table for one character.
#[must_use]
pub fn compute_stance(npc: &NpcState) -> Stance {
    if npc.fracture_state >= FRACTURE_ANOMALY {
        return SocialIntent::RealityDenial.into();
    }

    if npc.psychology.stress_level > STRESS_BREAKPOINT {
        let intent = match npc.psychology.dominant_instinct {
            Instinct::Fight => SocialIntent::Attack,
            Instinct::Flight => SocialIntent::Deflect,
            Instinct::Fawn => SocialIntent::Placate,
            Instinct::Submit => SocialIntent::Beg,
        };
        return intent.into();
    }

    let trust = npc.relationship_state.trust;
    let fear = npc.relationship_state.fear;
    let intent = if trust > 75.0 {
        SocialIntent::Confess
    } else if fear > 70.0 {
        SocialIntent::Placate
    } else if trust < 30.0 && fear < 50.0 {
        SocialIntent::Observe
    } else if trust < 30.0 && fear > 50.0 {
        SocialIntent::Deflect
    } else {
        SocialIntent::Bargain
    };
    intent.into()
}

/// Record a line heard or spoken by `npc` and refresh its stance.
///
/// Returns the updated character; the input is not modified.
#[must_use]
pub fn record_utterance(
    npc: &NpcState,
    speaker: &str,
    text: &str,
    config: &MemoryConfig,
) -> NpcState {
    let mut next = npc.clone();
    next.dialogue_state.memory.push_utterance(
        Utterance {
            speaker: speaker.trim().to_string(),
            text: text.trim().to_string(),
        },
        config.short_term_capacity,
    );
    let stance = compute_stance(&next);
    next.dialogue_state.last_social_maneuver = next.dialogue_state.current_social_intent;
    next.dialogue_state.current_social_intent = Some(stance.intent);
    next
}

// ---------------------------------------------------------------------------
// Voice table
// ---------------------------------------------------------------------------

/// Sentence rhythm of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rhythm {
    /// Short bursts.
    Clipped,
    /// Even, measured.
    Measured,
    /// Long, run-on.
    Rambling,
    /// Broken off, restarting.
    Halting,
}

/// Syntax complexity of a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Fragments, plain words.
    Simple,
    /// Ordinary speech.
    Moderate,
    /// Subordinate clauses, rare vocabulary.
    Ornate,
}

/// Static rendering parameters for a voice signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceProfile {
    /// Table key.
    pub signature: &'static str,
    /// Sentence rhythm.
    pub rhythm: Rhythm,
    /// Syntax complexity.
    pub syntax: Syntax,
    /// Verbal habit to sprinkle in.
    pub tic: &'static str,
}

impl VoiceProfile {
    /// One-line description for prompts.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "{:?} rhythm, {:?} syntax, habit: {}",
            self.rhythm, self.syntax, self.tic
        )
        .to_lowercase()
    }
}

const fn voice(
    signature: &'static str,
    rhythm: Rhythm,
    syntax: Syntax,
    tic: &'static str,
) -> VoiceProfile {
    VoiceProfile {
        signature,
        rhythm,
        syntax,
        tic,
    }
}

const VOICES: &[VoiceProfile] = &[
    voice("plain", Rhythm::Measured, Syntax::Moderate, "none"),
    voice("clipped", Rhythm::Clipped, Syntax::Simple, "drops pronouns"),
    voice("rambling", Rhythm::Rambling, Syntax::Moderate, "circles back to old stories"),
    voice("formal", Rhythm::Measured, Syntax::Ornate, "addresses people by title"),
    voice("whisper", Rhythm::Halting, Syntax::Simple, "trails off mid-sentence"),
    voice("stammer", Rhythm::Halting, Syntax::Moderate, "repeats the first word"),
    voice("street", Rhythm::Clipped, Syntax::Moderate, "slang and nicknames"),
    voice("clinical", Rhythm::Measured, Syntax::Ornate, "names body parts precisely"),
    voice("sing-song", Rhythm::Rambling, Syntax::Simple, "hums between lines"),
];

/// Every known voice signature.
#[must_use]
pub fn voice_signatures() -> Vec<&'static str> {
    VOICES.iter().map(|v| v.signature).collect()
}

/// Look up a voice profile; unknown signatures get the plain voice.
#[must_use]
pub fn voice_profile(signature: &str) -> VoiceProfile {
    let key = normalize_label(signature);
    VOICES
        .iter()
        .find(|v| normalize_label(v.signature) == key)
        .copied()
        .unwrap_or(VOICES[0])
}
