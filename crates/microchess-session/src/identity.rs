//! Player identity.
//!
//! Each client instance picks one random id at construction and keeps it
//! for its lifetime. It correlates player-scoped topics and publishes; it
//! is not a credential.

use microchess_protocol::PlayerId;
use uuid::Uuid;

/// Generates a random RFC 4122 version 4 UUID, hyphenated and lowercase.
///
/// The counterpart server parses player ids as UUIDs.
pub fn generate_player_id() -> PlayerId {
    PlayerId::new(Uuid::new_v4().to_string())
}
