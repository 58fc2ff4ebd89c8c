//! Error types for the session layer.

use microchess_protocol::ProtocolError;
use microchess_transport::TransportError;

/// Errors that can occur while driving a game session.
///
/// The session swallows most of these at its boundary and only logs them;
/// the `try_*` operations surface them to callers that want strictness.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A move was attempted before any game was created.
    #[error("no active game")]
    NoActiveGame,

    /// The broker refused to subscribe or publish.
    #[error(transparent)]
    Broker(#[from] TransportError),

    /// An inbound or outbound body could not be (de)serialized.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
