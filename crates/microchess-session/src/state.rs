//! Session configuration and the matchmaking state machine.

use microchess_protocol::GameId;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// What happens to subscriptions when the broker connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Forget every subscription on disconnect and, on the next connect,
    /// subscribe again to the proposals topic, the player topic (if it was
    /// ever needed) and the active game's topic.
    #[default]
    Resubscribe,

    /// Keep the subscribed flags across reconnects and never subscribe the
    /// same topic twice in the client's lifetime. Only sound if the broker
    /// keeps subscriptions alive across reconnects.
    Retain,
}

/// Configuration for session behavior.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub reconnect_policy: ReconnectPolicy,
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where this client is in the matchmaking flow.
///
/// ```text
///   Idle ──(create / accept request)──→ AwaitingAcceptance
///                                             │
///                                      (CREATED event)
///                                             ▼
///                                      InGame(game_id) ──(CREATED)──→ InGame(game_id')
/// ```
///
/// A new request while in a game moves to `AwaitingAcceptance`, but the
/// session keeps the last game id until another `CREATED` replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No request sent, no game joined.
    #[default]
    Idle,

    /// A create or accept request was published; no `CREATED` yet.
    AwaitingAcceptance,

    /// A `CREATED` event put us in this game.
    InGame(GameId),
}

impl SessionState {
    /// The game this state is playing, if any.
    pub fn game_id(&self) -> Option<&GameId> {
        match self {
            Self::InGame(game_id) => Some(game_id),
            _ => None,
        }
    }
}
