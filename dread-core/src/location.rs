//! Location graph: a directed graph of rooms that grows as it is explored.
//!
//! Rooms are created lazily: an exit starts out pointing at nothing
//! ("unexplored") and only receives a target when something walks through it.
//! Room descriptions are never computed here; they arrive from generated text
//! as a [`RoomDraft`].
//!
//! Invariants held by every function in this module:
//!
//! - `current_room_id` is a key of `room_map`.
//! - every exit with `Some(target)` names a key of `room_map`.
//!
//! All operations take the state by reference and return a new value; a
//! failed operation leaves the caller's state untouched.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Ways a location transition can break the graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// `current_room_id` does not exist in the room map.
    #[error("current room '{0}' is not in the room map")]
    MissingCurrentRoom(String),
    /// An exit references a room that does not exist.
    #[error("exit '{direction}' of room '{room}' points at unknown room '{target}'")]
    DanglingExit {
        /// Room holding the exit.
        room: String,
        /// Exit label.
        direction: String,
        /// Missing target id.
        target: String,
    },
    /// A room map entry is filed under a key different from its id.
    #[error("room map key '{key}' holds room '{id}'")]
    KeyMismatch {
        /// Map key.
        key: String,
        /// Node id.
        id: String,
    },
    /// A transition named a room that does not exist.
    #[error("room '{0}' does not exist")]
    UnknownRoom(String),
    /// A traversal named an exit the current room does not have.
    #[error("room '{room}' has no exit '{direction}'")]
    UnknownExit {
        /// Current room id.
        room: String,
        /// Requested exit label.
        direction: String,
    },
}

/// One exit out of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exit {
    /// Exit label, e.g. "north" or "cellar stairs".
    pub direction: String,
    /// Target room id; `None` means unexplored.
    #[serde(default)]
    pub target: Option<String>,
}

impl Exit {
    /// An exit nobody has walked through yet.
    #[must_use]
    pub fn unexplored(direction: impl Into<String>) -> Self {
        Self {
            direction: direction.into(),
            target: None,
        }
    }

    fn matches(&self, direction: &str) -> bool {
        self.direction.trim().eq_ignore_ascii_case(direction.trim())
    }
}

/// A node of the location graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomNode {
    /// Unique id, also the key in the room map.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Cached description text supplied by generation.
    #[serde(default)]
    pub description: String,
    /// Exits out of this room.
    #[serde(default)]
    pub exits: Vec<Exit>,
}

impl RoomNode {
    /// Find an exit by label (case-insensitive).
    #[must_use]
    pub fn exit(&self, direction: &str) -> Option<&Exit> {
        self.exits.iter().find(|e| e.matches(direction))
    }
}

/// Externally supplied text for a room that is about to be created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomDraft {
    /// Room name.
    pub name: String,
    /// Room description.
    pub description: String,
    /// Labels of the exits visible from the new room.
    pub exits: Vec<String>,
}

/// Spatial part of the game state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationState {
    /// Where the player currently is.
    pub current_room_id: String,
    /// Every known room by id.
    pub room_map: BTreeMap<String, RoomNode>,
    /// Weather label.
    pub weather: String,
    /// Time-of-day label.
    pub time_of_day: String,
    /// How space behaves here ("euclidean", "looping", "folding", ...).
    pub spatial_logic: String,
    /// Environmental severity, 0 (calm) to 5 (lethal).
    pub severity: u8,
}

impl Default for LocationState {
    fn default() -> Self {
        Self::new(RoomNode {
            id: "room-0".to_string(),
            name: "Nowhere in particular".to_string(),
            description: String::new(),
            exits: Vec::new(),
        })
    }
}

impl LocationState {
    /// A graph holding only `start`, which is also the current room.
    #[must_use]
    pub fn new(start: RoomNode) -> Self {
        let mut room_map = BTreeMap::new();
        let current_room_id = start.id.clone();
        room_map.insert(start.id.clone(), start);
        Self {
            current_room_id,
            room_map,
            weather: "still".to_string(),
            time_of_day: "dusk".to_string(),
            spatial_logic: "euclidean".to_string(),
            severity: 1,
        }
    }

    /// The room the player is in, if the invariant holds.
    #[must_use]
    pub fn current_room(&self) -> Option<&RoomNode> {
        self.room_map.get(&self.current_room_id)
    }
}

/// Render the current room and its exits for a generation request.
///
/// Read-only projection; exits without a target render as `UNEXPLORED`.
#[must_use]
pub fn get_manifest(state: &LocationState) -> String {
    let mut out = String::new();
    let Some(room) = state.current_room() else {
        let _ = writeln!(out, "CURRENT LOCATION: unknown ({})", state.current_room_id);
        return out;
    };

    let _ = writeln!(out, "CURRENT LOCATION: {} [{}]", room.name, room.id);
    if !room.description.is_empty() {
        let _ = writeln!(out, "DESCRIPTION: {}", room.description);
    }
    let _ = writeln!(
        out,
        "AMBIENT: weather={}, time={}, spatial logic={}, severity={}/5",
        state.weather, state.time_of_day, state.spatial_logic, state.severity
    );

    if room.exits.is_empty() {
        let _ = writeln!(out, "EXITS: none");
    } else {
        let _ = writeln!(out, "EXITS:");
        for exit in &room.exits {
            let target = exit
                .target
                .as_deref()
                .and_then(|id| state.room_map.get(id))
                .map_or_else(|| "UNEXPLORED".to_string(), |r| r.name.clone());
            let _ = writeln!(out, "  - {} -> {}", exit.direction, target);
        }
    }
    out
}

/// Make sure the exit `direction` of the current room leads somewhere.
///
/// If the exit is unexplored, a new room with a fresh id is built from
/// `draft`, inserted, and the exit is pointed at it. The new room gets a
/// return exit to the room it was entered from. An exit that already has a
/// target is left alone. Does not move the player.
///
/// # Errors
/// [`LocationError::UnknownExit`] if the current room has no such exit, or
/// any invariant error the input state already carries.
pub fn ensure_node(
    state: &LocationState,
    direction: &str,
    draft: Option<&RoomDraft>,
) -> Result<LocationState, LocationError> {
    validate(state)?;
    let origin_id = state.current_room_id.clone();
    let origin = state
        .room_map
        .get(&origin_id)
        .ok_or_else(|| LocationError::MissingCurrentRoom(origin_id.clone()))?;

    let exit_index = origin
        .exits
        .iter()
        .position(|e| e.matches(direction))
        .ok_or_else(|| LocationError::UnknownExit {
            room: origin_id.clone(),
            direction: direction.to_string(),
        })?;

    if origin.exits[exit_index].target.is_some() {
        return Ok(state.clone());
    }

    let mut next = state.clone();
    let new_id = fresh_room_id(&next);
    let taken = origin.exits[exit_index].direction.clone();
    let node = build_room(&new_id, &origin_id, &taken, draft);

    next.room_map.insert(new_id.clone(), node);
    if let Some(room) = next.room_map.get_mut(&origin_id) {
        room.exits[exit_index].target = Some(new_id);
    }
    Ok(next)
}

/// Give the current room an unexplored exit labelled `direction`, unless it
/// already has one.
///
/// # Errors
/// [`LocationError::MissingCurrentRoom`] if the input is already broken.
pub fn open_exit(state: &LocationState, direction: &str) -> Result<LocationState, LocationError> {
    let mut next = state.clone();
    let current = next.current_room_id.clone();
    let room = next
        .room_map
        .get_mut(&current)
        .ok_or(LocationError::MissingCurrentRoom(current))?;
    let label = direction.trim();
    if !label.is_empty() && room.exit(label).is_none() {
        room.exits.push(Exit::unexplored(label));
    }
    Ok(next)
}

/// Move the player to `room_id`.
///
/// # Errors
/// [`LocationError::UnknownRoom`] if the id is not in the room map; the
/// caller keeps its previous state.
pub fn move_to(state: &LocationState, room_id: &str) -> Result<LocationState, LocationError> {
    if !state.room_map.contains_key(room_id) {
        return Err(LocationError::UnknownRoom(room_id.to_string()));
    }
    let mut next = state.clone();
    next.current_room_id = room_id.to_string();
    validate(&next)?;
    Ok(next)
}

/// Walk through exit `direction`, creating the room behind it if needed.
///
/// # Errors
/// See [`ensure_node`] and [`move_to`].
pub fn traverse(
    state: &LocationState,
    direction: &str,
    draft: Option<&RoomDraft>,
) -> Result<LocationState, LocationError> {
    let grown = ensure_node(state, direction, draft)?;
    let target = grown
        .current_room()
        .and_then(|room| room.exit(direction))
        .and_then(|exit| exit.target.clone())
        .ok_or_else(|| LocationError::UnknownExit {
            room: grown.current_room_id.clone(),
            direction: direction.to_string(),
        })?;
    move_to(&grown, &target)
}

/// Replace the cached description of a room.
///
/// # Errors
/// [`LocationError::UnknownRoom`] if the room does not exist.
pub fn describe_room(
    state: &LocationState,
    room_id: &str,
    description: &str,
) -> Result<LocationState, LocationError> {
    let mut next = state.clone();
    let room = next
        .room_map
        .get_mut(room_id)
        .ok_or_else(|| LocationError::UnknownRoom(room_id.to_string()))?;
    room.description = description.to_string();
    Ok(next)
}

/// Check both graph invariants.
///
/// # Errors
/// The first violation found.
pub fn validate(state: &LocationState) -> Result<(), LocationError> {
    if !state.room_map.contains_key(&state.current_room_id) {
        return Err(LocationError::MissingCurrentRoom(
            state.current_room_id.clone(),
        ));
    }
    for (key, room) in &state.room_map {
        if key != &room.id {
            return Err(LocationError::KeyMismatch {
                key: key.clone(),
                id: room.id.clone(),
            });
        }
        for exit in &room.exits {
            if let Some(target) = &exit.target {
                if !state.room_map.contains_key(target) {
                    return Err(LocationError::DanglingExit {
                        room: room.id.clone(),
                        direction: exit.direction.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn fresh_room_id(state: &LocationState) -> String {
    loop {
        let id = format!("room-{}", &Uuid::new_v4().simple().to_string()[..12]);
        if !state.room_map.contains_key(&id) {
            return id;
        }
    }
}

fn build_room(id: &str, origin_id: &str, taken: &str, draft: Option<&RoomDraft>) -> RoomNode {
    let name = draft
        .map(|d| d.name.trim())
        .filter(|n| !n.is_empty())
        .map_or_else(|| format!("Beyond the {taken}"), str::to_string);
    let description = draft.map(|d| d.description.clone()).unwrap_or_default();

    let back = opposite_direction(taken).unwrap_or("back");
    let mut exits: Vec<Exit> = draft
        .map(|d| {
            d.exits
                .iter()
                .map(|label| label.trim())
                .filter(|label| !label.is_empty())
                .map(Exit::unexplored)
                .collect()
        })
        .unwrap_or_default();

    match exits.iter_mut().find(|e| e.matches(back)) {
        Some(exit) => exit.target = Some(origin_id.to_string()),
        None => exits.push(Exit {
            direction: back.to_string(),
            target: Some(origin_id.to_string()),
        }),
    }

    RoomNode {
        id: id.to_string(),
        name,
        description,
        exits,
    }
}

fn opposite_direction(direction: &str) -> Option<&'static str> {
    match direction.trim().to_ascii_lowercase().as_str() {
        "north" => Some("south"),
        "south" => Some("north"),
        "east" => Some("west"),
        "west" => Some("east"),
        "up" => Some("down"),
        "down" => Some("up"),
        "in" | "inside" => Some("out"),
        "out" | "outside" => Some("in"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> LocationState {
        LocationState::new(RoomNode {
            id: "hall".to_string(),
            name: "Entrance Hall".to_string(),
            description: "Dust and a stopped clock.".to_string(),
            exits: vec![Exit::unexplored("north"), Exit::unexplored("cellar door")],
        })
    }

    #[test]
    fn manifest_marks_unexplored_exits() {
        let manifest = get_manifest(&start());
        assert!(manifest.contains("Entrance Hall"));
        assert!(manifest.contains("north -> UNEXPLORED"));
        assert!(manifest.contains("cellar door -> UNEXPLORED"));
    }

    #[test]
    fn traverse_creates_room_and_links_both_ways() {
        let draft = RoomDraft {
            name: "Gallery".to_string(),
            description: "Portraits with scratched-out eyes.".to_string(),
            exits: vec!["east".to_string()],
        };
        let next = traverse(&start(), "North", Some(&draft)).expect("traverse");

        let gallery = next.current_room().expect("current room exists");
        assert_eq!(gallery.name, "Gallery");
        assert_eq!(gallery.exit("south").and_then(|e| e.target.as_deref()), Some("hall"));
        assert!(gallery.exit("east").is_some_and(|e| e.target.is_none()));

        let hall = &next.room_map["hall"];
        assert_eq!(hall.exit("north").and_then(|e| e.target.clone()), Some(gallery.id.clone()));
        assert!(validate(&next).is_ok());

        let manifest = get_manifest(&move_to(&next, "hall").expect("move back"));
        assert!(manifest.contains("north -> Gallery"));
    }

    #[test]
    fn traversing_explored_exit_reuses_node() {
        let once = traverse(&start(), "north", None).expect("first");
        let new_id = once.current_room_id.clone();
        let back = traverse(&once, "south", None).expect("return");
        assert_eq!(back.current_room_id, "hall");
        let again = traverse(&back, "north", None).expect("second");
        assert_eq!(again.current_room_id, new_id);
        assert_eq!(again.room_map.len(), 2);
    }

    #[test]
    fn unknown_exit_is_rejected() {
        let err = traverse(&start(), "west", None).expect_err("no west exit");
        assert!(matches!(err, LocationError::UnknownExit { .. }));
    }

    #[test]
    fn move_to_missing_room_is_rejected() {
        let err = move_to(&start(), "room-does-not-exist").expect_err("missing room");
        assert_eq!(err, LocationError::UnknownRoom("room-does-not-exist".to_string()));
    }

    #[test]
    fn validate_catches_dangling_exit() {
        let mut state = start();
        if let Some(room) = state.room_map.get_mut("hall") {
            room.exits[0].target = Some("ghost-room".to_string());
        }
        assert!(matches!(validate(&state), Err(LocationError::DanglingExit { .. })));
    }

    #[test]
    fn default_state_is_valid() {
        assert!(validate(&LocationState::default()).is_ok());
    }

    #[test]
    fn open_exit_is_insert_if_absent() {
        let once = open_exit(&start(), "Window").expect("open");
        let twice = open_exit(&once, "window").expect("open again");
        assert_eq!(twice.room_map["hall"].exits.len(), 3);
        assert!(traverse(&twice, "window", None).is_ok());
    }

    #[test]
    fn unnamed_draft_gets_placeholder_name() {
        let next = traverse(&start(), "cellar door", None).expect("traverse");
        let room = next.current_room().expect("room");
        assert_eq!(room.name, "Beyond the cellar door");
        assert!(room.exit("back").is_some());
    }
}
