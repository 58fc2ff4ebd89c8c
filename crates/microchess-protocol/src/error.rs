//! Error types for the protocol layer.
//!
//! Each microchess crate defines its own error enum. A `ProtocolError`
//! always means the bytes were wrong, never the network.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated messages.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A STOMP frame could not be parsed.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
