//! Destination names shared with the counterpart server.
//!
//! These strings are the interoperability contract: a typo here means the
//! broker routes nothing to us and nothing from us.

use crate::{GameId, PlayerId, ProposalId};

/// Broadcast topic for newly announced game proposals.
pub const GAME_PROPOSALS_TOPIC: &str = "/topic/game-proposals";

/// Publish destination for creating a proposal. Body: the raw player id.
pub const CREATE_GAME_PROPOSAL_DESTINATION: &str = "/app/create-game-proposal";

/// Topic carrying events addressed to one player.
pub fn player_topic(player_id: &PlayerId) -> String {
    format!("/topic/player/{player_id}")
}

/// Topic carrying events for one game.
pub fn game_topic(game_id: &GameId) -> String {
    format!("/topic/game/{game_id}")
}

/// Publish destination for accepting a proposal. Body: the raw player id.
pub fn accept_proposal_destination(proposal_id: &ProposalId) -> String {
    format!("/app/accept-game-proposal/{proposal_id}")
}

/// Publish destination for a move in `game_id` made by `player_id`.
pub fn move_destination(game_id: &GameId, player_id: &PlayerId) -> String {
    format!("/app/game/{game_id}/{player_id}")
}
