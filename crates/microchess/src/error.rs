//! Unified error type for the microchess client.

use microchess_protocol::ProtocolError;
use microchess_session::SessionError;
use microchess_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `microchess` crate you deal with this single error type
/// instead of importing errors from each sub-crate. Sub-crate errors
/// convert with `?`; a [`SessionError`] that only wraps a transport or
/// protocol failure is unwrapped into [`Transport`](Self::Transport) or
/// [`Protocol`](Self::Protocol).
#[derive(Debug, thiserror::Error)]
pub enum MicrochessError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (frame, encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (no active game).
    #[error(transparent)]
    Session(SessionError),

    /// The client task has stopped; the handle can no longer be used.
    #[error("client closed")]
    ClientClosed,
}

impl From<SessionError> for MicrochessError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Broker(e) => Self::Transport(e),
            SessionError::Protocol(e) => Self::Protocol(e),
            other => Self::Session(other),
        }
    }
}
