//! Out-of-character detection.
//!
//! Input counts as OOC when it is
//!
//! - wrapped in parentheses or square brackets,
//! - prefixed with "OOC" (any case, optional colon or dash), or
//! - a direct question about the game itself: ends in `?` and mentions a
//!   meta keyword (rules, turns, stats, the narrator, ...).
//!
//! OOC input never reaches the simulation phase.

const META_KEYWORDS: &[&str] = &[
    "game", "rule", "rules", "mechanic", "mechanics", "turn", "turns", "stat", "stats", "system",
    "narrator", "ai", "prompt", "fracturestate", "fracture state", "sanity", "autopilot",
];

/// Whether `input` is addressed to the game rather than the story.
#[must_use]
pub fn is_out_of_character(input: &str) -> bool {
    let text = input.trim();
    if text.is_empty() {
        return false;
    }

    let wrapped = (text.starts_with('(') && text.ends_with(')'))
        || (text.starts_with('[') && text.ends_with(']'));
    if wrapped {
        return true;
    }

    let lower = text.to_ascii_lowercase();
    if let Some(rest) = lower.strip_prefix("ooc") {
        if rest.is_empty() || rest.starts_with([':', '-', ' ', ')']) {
            return true;
        }
    }

    text.ends_with('?') && mentions_meta_keyword(&lower)
}

fn mentions_meta_keyword(lower: &str) -> bool {
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    META_KEYWORDS.iter().any(|kw| {
        if kw.contains(' ') {
            lower.contains(kw)
        } else {
            words.contains(kw)
        }
    })
}
