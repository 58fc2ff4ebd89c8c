//! Domain types that travel in message bodies.
//!
//! Field names follow the counterpart server's JSON (camelCase), so every
//! struct carries `#[serde(rename_all = "camelCase")]`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one client instance in every player-scoped topic.
///
/// The server parses it as a UUID, but the client treats it as an opaque
/// string. `#[serde(transparent)]` keeps it a bare JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

/// Identifies a running game.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(String);

/// Identifies a game proposal announced in the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            /// Wraps a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(PlayerId);
string_id!(GameId);
string_id!(ProposalId);

// ---------------------------------------------------------------------------
// Lobby
// ---------------------------------------------------------------------------

/// A game offer broadcast on the proposals topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameProposal {
    /// The proposal to pass to an accept request.
    pub game_proposal_id: ProposalId,
    /// Who created the proposal. Absent once the server stops echoing it.
    #[serde(default)]
    pub creator_id: Option<PlayerId>,
}

// ---------------------------------------------------------------------------
// Moves
// ---------------------------------------------------------------------------

/// A move from one square to another, e.g. `e2` → `e4`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub from: String,
    pub to: String,
}

impl Move {
    /// Creates a move between two squares.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

// ---------------------------------------------------------------------------
// Game events
// ---------------------------------------------------------------------------

/// Sent on a player's topic once a proposal turned into a game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCreated {
    pub game_id: GameId,
    #[serde(default)]
    pub player1_id: Option<PlayerId>,
    #[serde(default)]
    pub player2_id: Option<PlayerId>,
}

/// Sent on a game's topic after a player moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePlayed {
    pub game_id: GameId,
    #[serde(default)]
    pub player_id: Option<PlayerId>,
    /// The server relays the publish body verbatim, so this arrives either
    /// as an object or as a string holding the encoded object.
    #[serde(rename = "move", deserialize_with = "deserialize_move")]
    pub played: Move,
}

/// A decoded player- or game-topic event.
///
/// Internally tagged by `type`. Tags this client does not understand decode
/// to [`GameEvent::Unknown`] instead of failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GameEvent {
    #[serde(rename = "CREATED")]
    Created(GameCreated),

    #[serde(rename = "MOVE")]
    Move(MovePlayed),

    #[serde(other)]
    Unknown,
}

fn deserialize_move<'de, D>(deserializer: D) -> Result<Move, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Object(Move),
        Encoded(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Object(mv) => Ok(mv),
        Repr::Encoded(raw) => parse_encoded_move(&raw).map_err(serde::de::Error::custom),
    }
}

#[cfg(feature = "json")]
fn parse_encoded_move(raw: &str) -> Result<Move, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid encoded move {raw:?}: {e}"))
}

#[cfg(not(feature = "json"))]
fn parse_encoded_move(raw: &str) -> Result<Move, String> {
    Err(format!("encoded move {raw:?} needs the json feature"))
}

// =========================================================================
// Tests
// =========================================================================
