//! Game session layer for the microchess client.
//!
//! This crate is the heart of the client. It keeps a consistent view of
//! connectivity, topic subscriptions and the joined game while broker
//! events arrive asynchronously:
//!
//! 1. **Identity**: one random player id per session ([`generate_player_id`])
//! 2. **Subscriptions**: each topic subscribed once ([`SubscriptionRegistry`])
//! 3. **Observers**: game-accepted and move-played callbacks
//!    ([`CallbackRegistry`])
//! 4. **State**: `Idle → AwaitingAcceptance → InGame` ([`ChessSession`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Client actor (above)  ← owns the session, feeds it broker events
//!     ↕
//! Session Layer (this crate)  ← matchmaking state, routing, fan-out
//!     ↕
//! Broker trait + Protocol Layer (below)  ← topics, frames, JSON bodies
//! ```

mod broker;
mod callbacks;
mod error;
mod identity;
mod session;
mod state;
mod subscriptions;

pub use broker::{Broker, BrokerEvent, Publication, SubscriptionId};
pub use callbacks::{Callback, CallbackRegistry};
pub use error::SessionError;
pub use identity::generate_player_id;
pub use session::ChessSession;
pub use state::{ReconnectPolicy, SessionConfig, SessionState};
pub use subscriptions::{Route, SubscriptionRegistry};
