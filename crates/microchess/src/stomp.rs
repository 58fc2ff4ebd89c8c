//! [`Broker`] implementation speaking STOMP 1.2 over a WebSocket.
//!
//! `activate` spawns a connection task (a *link*). The link dials the
//! broker, performs the `CONNECT`/`CONNECTED` handshake and then
//! multiplexes two streams until either side ends:
//!
//! ```text
//!   subscribe / publish ──→ outbound queue ──→ WebSocket
//!   BrokerEvent channel ←── inbound frames ←── WebSocket
//! ```
//!
//! Every link belongs to a generation. `deactivate` retires the current
//! generation and reports [`BrokerEvent::Disconnected`] on its behalf;
//! whatever a retired link still emits is dropped. A link that ends on
//! its own finishes by emitting `Disconnected` itself.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use microchess_protocol::{Command, Frame};
use microchess_session::{Broker, BrokerEvent, Publication, SubscriptionId};
use microchess_transport::{Connection, TransportError, WebSocketConnection};
use tokio::sync::mpsc;

use crate::ClientConfig;

/// Sender half of the broker event channel.
pub type BrokerEventSender = mpsc::UnboundedSender<BrokerEvent>;

/// Receiver half of the broker event channel.
pub type BrokerEventReceiver = mpsc::UnboundedReceiver<BrokerEvent>;

/// A STOMP client over [`WebSocketConnection`].
///
/// Subscription ids are allocated locally (`sub-0`, `sub-1`, ...) and are
/// unique for the lifetime of the broker, across reconnects.
pub struct StompBroker {
    url: String,
    host: String,
    connect_timeout: Duration,
    gate: Arc<EventGate>,
    /// Queue into the current link, if any.
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    next_subscription: u64,
}

impl StompBroker {
    /// Creates an inactive broker and the channel its events arrive on.
    pub fn new(config: &ClientConfig) -> (Self, BrokerEventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let broker = Self {
            url: config.broker_url.clone(),
            host: config.stomp_host(),
            connect_timeout: config.connect_timeout,
            gate: Arc::new(EventGate::new(events)),
            outbound: None,
            next_subscription: 0,
        };
        (broker, rx)
    }

    /// Whether a connection task is running.
    pub fn is_active(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(frame).map_err(|_| TransportError::NotConnected)
    }
}

impl Broker for StompBroker {
    fn activate(&mut self) {
        if self.is_active() {
            tracing::debug!(url = %self.url, "broker already active");
            return;
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.outbound = Some(tx);

        let link = Link {
            url: self.url.clone(),
            host: self.host.clone(),
            connect_timeout: self.connect_timeout,
            generation: self.gate.next_link(),
            gate: Arc::clone(&self.gate),
        };
        tokio::spawn(link.run(rx));
    }

    fn deactivate(&mut self) {
        let Some(tx) = self.outbound.take() else {
            return;
        };
        // A connected link forwards the DISCONNECT; a handshaking link sees
        // it and gives up. Either way the link is silent from here on.
        let _ = tx.send(Frame::disconnect());
        self.gate.retire();
    }

    fn subscribe(&mut self, destination: &str) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId::new(format!("sub-{}", self.next_subscription));
        self.enqueue(Frame::subscribe(id.as_str(), destination))?;
        self.next_subscription += 1;
        Ok(id)
    }

    fn publish(&mut self, publication: Publication) -> Result<(), TransportError> {
        self.enqueue(Frame::send(
            &publication.destination,
            publication.content_type,
            publication.body,
        ))
    }
}

// ---------------------------------------------------------------------------
// Event gate
// ---------------------------------------------------------------------------

struct GateState {
    generation: u64,
    /// The current link may still emit `Disconnected`.
    open: bool,
}

/// Forwards link events to the session, but only from the current link.
///
/// Checking the generation and sending happen under one lock, so a
/// retired link can never slip an event in after the `Disconnected`
/// reported for it.
struct EventGate {
    state: Mutex<GateState>,
    events: BrokerEventSender,
}

impl EventGate {
    fn new(events: BrokerEventSender) -> Self {
        Self {
            state: Mutex::new(GateState {
                generation: 0,
                open: false,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retires the current link and opens a new generation for the next.
    fn next_link(&self) -> u64 {
        let mut state = self.lock();
        self.close(&mut state);
        state.open = true;
        state.generation
    }

    /// Retires the current link, reporting `Disconnected` if it has not.
    fn retire(&self) {
        let mut state = self.lock();
        self.close(&mut state);
    }

    fn close(&self, state: &mut GateState) {
        if state.open {
            state.open = false;
            self.send(BrokerEvent::Disconnected);
        }
        state.generation += 1;
    }

    fn emit(&self, generation: u64, event: BrokerEvent) {
        let mut state = self.lock();
        if state.generation != generation || !state.open {
            tracing::trace!(generation, ?event, "event from retired link dropped");
            return;
        }
        if matches!(event, BrokerEvent::Disconnected) {
            state.open = false;
        }
        self.send(event);
    }

    fn send(&self, event: BrokerEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("broker event receiver gone");
        }
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// How a connection ended, when it was not a socket failure.
enum Ended {
    /// We sent `DISCONNECT` or the broker was dropped.
    Requested,
    /// The broker closed the socket.
    ClosedByBroker,
    /// The broker answered the handshake with `ERROR`.
    Rejected,
}

/// One connection attempt and its lifetime.
struct Link {
    url: String,
    host: String,
    connect_timeout: Duration,
    generation: u64,
    gate: Arc<EventGate>,
}

impl Link {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<Frame>) {
        tracing::info!(url = %self.url, generation = self.generation, "connecting to broker");

        let result = self.session(&mut outbound).await;
        // An `activate` issued after `Disconnected` must see this link closed.
        drop(outbound);

        match result {
            Ok(Ended::Requested) => tracing::info!(url = %self.url, "disconnected"),
            Ok(Ended::ClosedByBroker) => {
                tracing::warn!(url = %self.url, "broker closed the connection");
            }
            Ok(Ended::Rejected) => {
                tracing::warn!(url = %self.url, "broker rejected the connection");
            }
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "broker connection failed");
                self.emit(BrokerEvent::TransportError(e));
            }
        }
        self.emit(BrokerEvent::Disconnected);
    }

    async fn session(
        &self,
        outbound: &mut mpsc::UnboundedReceiver<Frame>,
    ) -> Result<Ended, TransportError> {
        // Frames queued before CONNECTED go out right after it.
        let mut held = Vec::new();

        let conn = tokio::select! {
            conn = WebSocketConnection::connect(&self.url) => conn?,
            () = hold_until_disconnect(outbound, &mut held) => {
                tracing::debug!(url = %self.url, "disconnect requested while dialing");
                return Ok(Ended::Requested);
            }
        };
        let conn_id = conn.id();

        conn.send(&Frame::connect(&self.host).encode()).await?;
        let handshake = tokio::time::timeout(self.connect_timeout, self.await_connected(&conn));
        let outcome = tokio::select! {
            outcome = handshake => outcome,
            () = hold_until_disconnect(outbound, &mut held) => {
                tracing::debug!(%conn_id, "disconnect requested during handshake");
                let _ = conn.close().await;
                return Ok(Ended::Requested);
            }
        };

        let ended = match outcome {
            Ok(Ok(None)) => {
                tracing::info!(%conn_id, "STOMP session established");
                self.emit(BrokerEvent::Connected);
                for frame in held {
                    conn.send(&frame.encode()).await?;
                }
                self.pump(&conn, outbound).await?
            }
            Ok(Ok(Some(ended))) => ended,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let _ = conn.close().await;
                return Err(TransportError::ConnectionClosed(format!(
                    "no CONNECTED frame within {:?}",
                    self.connect_timeout
                )));
            }
        };

        let _ = conn.close().await;
        Ok(ended)
    }

    /// Reads until `CONNECTED`. Returns `Some` if the session ended first.
    async fn await_connected(
        &self,
        conn: &WebSocketConnection,
    ) -> Result<Option<Ended>, TransportError> {
        loop {
            let Some(data) = conn.recv().await? else {
                return Ok(Some(Ended::ClosedByBroker));
            };
            for frame in self.decode(&data) {
                match frame.command {
                    Command::Connected => {
                        tracing::debug!(
                            version = frame.header("version").unwrap_or("?"),
                            server = frame.header("server").unwrap_or("?"),
                            "CONNECTED"
                        );
                        return Ok(None);
                    }
                    Command::Error => {
                        self.emit(error_event(&frame));
                        return Ok(Some(Ended::Rejected));
                    }
                    other => tracing::debug!(command = %other, "frame before CONNECTED ignored"),
                }
            }
        }
    }

    /// Forwards queued frames and inbound frames until either side ends.
    async fn pump(
        &self,
        conn: &WebSocketConnection,
        outbound: &mut mpsc::UnboundedReceiver<Frame>,
    ) -> Result<Ended, TransportError> {
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else {
                        conn.send(&Frame::disconnect().encode()).await?;
                        return Ok(Ended::Requested);
                    };
                    tracing::trace!(command = %frame.command, "sending frame");
                    conn.send(&frame.encode()).await?;
                    if frame.command == Command::Disconnect {
                        return Ok(Ended::Requested);
                    }
                }
                data = conn.recv() => {
                    let Some(data) = data? else {
                        return Ok(Ended::ClosedByBroker);
                    };
                    for frame in self.decode(&data) {
                        if let Some(event) = inbound_event(frame) {
                            self.emit(event);
                        }
                    }
                }
            }
        }
    }

    fn decode(&self, data: &[u8]) -> Vec<Frame> {
        Frame::decode_all(data).unwrap_or_else(|e| {
            tracing::warn!(url = %self.url, error = %e, "dropping undecodable frame");
            Vec::new()
        })
    }

    fn emit(&self, event: BrokerEvent) {
        self.gate.emit(self.generation, event);
    }
}

/// Holds queued frames until `DISCONNECT` is queued or the queue closes.
async fn hold_until_disconnect(
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    held: &mut Vec<Frame>,
) {
    while let Some(frame) = outbound.recv().await {
        if frame.command == Command::Disconnect {
            return;
        }
        held.push(frame);
    }
}

/// Maps a frame received after the handshake to a session event.
fn inbound_event(frame: Frame) -> Option<BrokerEvent> {
    match frame.command {
        Command::Message => {
            let Some(subscription) = frame.header("subscription") else {
                tracing::warn!("MESSAGE without subscription header dropped");
                return None;
            };
            Some(BrokerEvent::Message {
                subscription: SubscriptionId::new(subscription),
                destination: frame.header("destination").unwrap_or_default().to_owned(),
                body: frame.body,
            })
        }
        Command::Error => Some(error_event(&frame)),
        Command::Receipt => {
            tracing::debug!(receipt = frame.header("receipt-id").unwrap_or("?"), "RECEIPT");
            None
        }
        other => {
            tracing::debug!(command = %other, "unexpected frame ignored");
            None
        }
    }
}

fn error_event(frame: &Frame) -> BrokerEvent {
    BrokerEvent::ProtocolError {
        message: frame.header("message").unwrap_or_default().to_owned(),
        details: frame.body_str().unwrap_or_default().to_owned(),
    }
}
