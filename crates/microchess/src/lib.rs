//! # Microchess
//!
//! Chess matchmaking and move exchange over a STOMP message broker.
//!
//! A client generates a random player id, watches the lobby for game
//! proposals, creates or accepts one, and then exchanges moves with its
//! opponent. All session state lives on one Tokio task; the application
//! drives it through a cloneable [`ClientHandle`] and observes it through
//! `watch` channels and callbacks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use microchess::prelude::*;
//!
//! # async fn demo() -> Result<(), MicrochessError> {
//! let client = ClientBuilder::from_config(ClientConfig::from_env()).build();
//!
//! let on_move: Callback<MovePlayed> =
//!     Arc::new(|played: &MovePlayed| println!("opponent played {}", played.played));
//! client.register_move_played_callback(&on_move).await?;
//!
//! client.connect()?;
//! client.request_create_proposal()?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod stomp;

pub use client::{ChessClient, ClientHandle};
pub use config::{BROKER_URL_ENV, ClientBuilder, ClientConfig, DEFAULT_BROKER_URL};
pub use error::MicrochessError;
pub use stomp::{BrokerEventReceiver, BrokerEventSender, StompBroker};

pub mod prelude {
    pub use crate::{
        ChessClient, ClientBuilder, ClientConfig, ClientHandle, MicrochessError, StompBroker,
    };
    pub use microchess_protocol::{
        GameCreated, GameEvent, GameId, GameProposal, Move, MovePlayed, PlayerId, ProposalId,
    };
    pub use microchess_session::{
        Broker, BrokerEvent, Callback, ReconnectPolicy, SessionConfig, SessionError, SessionState,
    };
}

/// Sub-crates, for callers that need lower layers directly.
pub use microchess_protocol as protocol;
pub use microchess_session as session;
pub use microchess_transport as transport;
