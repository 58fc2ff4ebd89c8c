//! The boundary to the publish/subscribe broker.
//!
//! The session never does I/O itself. It asks a [`Broker`] to activate,
//! subscribe and publish, and it is told about everything that happens on
//! the wire through [`BrokerEvent`]s fed to
//! [`ChessSession::handle_event`](crate::ChessSession::handle_event).

use std::fmt;

use microchess_transport::TransportError;

/// Identifies one subscription on the broker connection.
///
/// Inbound messages carry the id of the subscription they were delivered
/// for, which is how the session routes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Wraps a raw subscription id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub destination: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Something that happened on the broker connection.
#[derive(Debug)]
pub enum BrokerEvent {
    /// The broker accepted the connection.
    Connected,

    /// The connection is gone, whether requested or not.
    Disconnected,

    /// The socket failed. Informational; a `Disconnected` follows if the
    /// connection is lost.
    TransportError(TransportError),

    /// The broker reported an error frame.
    ProtocolError { message: String, details: String },

    /// A message arrived for one of our subscriptions.
    Message {
        subscription: SubscriptionId,
        destination: String,
        body: Vec<u8>,
    },
}

/// A publish/subscribe messaging client.
///
/// Every method only queues work and returns immediately; the outcome of
/// `activate`/`deactivate` is reported later as a [`BrokerEvent`].
pub trait Broker: Send + 'static {
    /// Starts connecting. Completion is reported as
    /// [`BrokerEvent::Connected`].
    fn activate(&mut self);

    /// Starts disconnecting. Completion is reported as
    /// [`BrokerEvent::Disconnected`].
    fn deactivate(&mut self);

    /// Subscribes to `destination`.
    ///
    /// # Errors
    /// [`TransportError::NotConnected`] while there is no connection.
    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionId, TransportError>;

    /// Publishes a message.
    ///
    /// # Errors
    /// [`TransportError::NotConnected`] while there is no connection.
    fn publish(&mut self, publication: Publication) -> Result<(), TransportError>;
}
