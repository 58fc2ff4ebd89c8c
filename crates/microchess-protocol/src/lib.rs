//! Wire protocol for the microchess client.
//!
//! This crate defines what travels between the client and the broker:
//!
//! - **Frames** ([`Frame`], [`Command`]): STOMP 1.2 framing on top of the
//!   WebSocket.
//! - **Types** ([`GameProposal`], [`GameEvent`], [`Move`], identity
//!   newtypes): the JSON bodies inside those frames.
//! - **Topics** ([`topics`]): the destination names agreed with the
//!   server.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how bodies are converted
//!   to/from bytes.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Frame + body types) → Session (game state)
//! ```

mod codec;
mod error;
mod frame;
pub mod topics;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{Command, Frame, STOMP_VERSION};
pub use types::{
    GameCreated, GameEvent, GameId, GameProposal, Move, MovePlayed, PlayerId, ProposalId,
};
