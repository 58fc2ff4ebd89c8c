//! The game session: the single place where broker events change state.
//!
//! [`ChessSession`] owns the broker handle, the subscription registry, the
//! callback registries and the observable state. It is driven from one
//! task: the application calls its methods, and the same task feeds it
//! every [`BrokerEvent`] through [`ChessSession::handle_event`]. Nothing in
//! here blocks or locks.
//!
//! # Failure policy
//!
//! Transport and protocol errors are logged and swallowed; they never
//! reach the caller and never change session state. Malformed inbound
//! bodies are dropped with a warning. A move sent outside a game is a
//! silent no-op ([`ChessSession::try_send_move`] reports it instead).

use microchess_protocol::{
    Codec, GameCreated, GameEvent, GameId, GameProposal, JsonCodec, Move, MovePlayed, PlayerId,
    ProposalId, topics,
};
use tokio::sync::watch;

use crate::callbacks::{Callback, CallbackRegistry};
use crate::identity::generate_player_id;
use crate::subscriptions::{Route, SubscriptionRegistry};
use crate::{
    Broker, BrokerEvent, Publication, ReconnectPolicy, SessionConfig, SessionError,
    SessionState, SubscriptionId,
};

const TEXT_PLAIN: &str = "text/plain";
const APPLICATION_JSON: &str = "application/json";

/// Client-side session for lobby matchmaking and move exchange.
pub struct ChessSession<B: Broker, C: Codec = JsonCodec> {
    player_id: PlayerId,
    broker: B,
    codec: C,
    config: SessionConfig,

    state: SessionState,
    /// Last game announced by a `CREATED` event. Never cleared.
    active_game: Option<GameId>,
    /// Set once a request needed the player topic; drives resubscription.
    wants_player_channel: bool,

    subscriptions: SubscriptionRegistry,
    game_accepted: CallbackRegistry<GameCreated>,
    move_played: CallbackRegistry<MovePlayed>,

    connected: watch::Sender<bool>,
    proposals: watch::Sender<Vec<GameProposal>>,
}

impl<B: Broker> ChessSession<B> {
    /// Creates a session with a fresh player id and the JSON codec.
    pub fn new(broker: B, config: SessionConfig) -> Self {
        Self::with_codec(broker, JsonCodec, config)
    }
}

impl<B: Broker, C: Codec> ChessSession<B, C> {
    /// Creates a session with a fresh player id and a custom body codec.
    pub fn with_codec(broker: B, codec: C, config: SessionConfig) -> Self {
        let player_id = generate_player_id();
        tracing::debug!(%player_id, "generated player identity");
        Self {
            player_id,
            broker,
            codec,
            config,
            state: SessionState::Idle,
            active_game: None,
            wants_player_channel: false,
            subscriptions: SubscriptionRegistry::new(),
            game_accepted: CallbackRegistry::new(),
            move_played: CallbackRegistry::new(),
            connected: watch::channel(false).0,
            proposals: watch::channel(Vec::new()).0,
        }
    }

    // -- Accessors ---------------------------------------------------------

    /// This client's player id.
    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    /// Current matchmaking state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The game moves are sent to, if a `CREATED` event was received.
    pub fn active_game(&self) -> Option<&GameId> {
        self.active_game.as_ref()
    }

    /// Whether the broker connection is up.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Observes connectivity.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    /// Observes the proposals received so far, in arrival order.
    pub fn proposals(&self) -> watch::Receiver<Vec<GameProposal>> {
        self.proposals.subscribe()
    }

    /// The underlying broker.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    // -- Connection --------------------------------------------------------

    /// Starts connecting. Connectivity flips when the broker reports
    /// [`BrokerEvent::Connected`].
    pub fn connect(&mut self) {
        tracing::info!(player_id = %self.player_id, "activating broker connection");
        self.broker.activate();
    }

    /// Starts disconnecting. Connectivity flips when the broker reports
    /// [`BrokerEvent::Disconnected`].
    pub fn disconnect(&mut self) {
        tracing::info!(player_id = %self.player_id, "deactivating broker connection");
        self.broker.deactivate();
    }

    // -- Subscriptions -----------------------------------------------------

    /// Subscribes to the proposals topic unless already subscribed.
    pub fn ensure_game_proposals_subscription(&mut self) {
        self.ensure_subscription(Route::Proposals);
    }

    /// Subscribes to this player's topic unless already subscribed.
    pub fn ensure_player_channel_subscription(&mut self) {
        self.wants_player_channel = true;
        self.ensure_subscription(Route::Player);
    }

    /// Subscribes to `game_id`'s topic unless already subscribed.
    pub fn ensure_game_channel_subscription(&mut self, game_id: &GameId) {
        self.ensure_subscription(Route::Game(game_id.clone()));
    }

    fn ensure_subscription(&mut self, route: Route) {
        let destination = route.destination(&self.player_id);
        let broker = &mut self.broker;
        match self
            .subscriptions
            .ensure(route, || broker.subscribe(&destination))
        {
            Ok(true) => tracing::info!(%destination, "subscribed"),
            Ok(false) => tracing::trace!(%destination, "already subscribed"),
            Err(e) => tracing::warn!(%destination, error = %e, "subscribe failed"),
        }
    }

    // -- Matchmaking -------------------------------------------------------

    /// Announces a new proposal from this player.
    pub fn request_create_proposal(&mut self) {
        self.ensure_player_channel_subscription();
        let publication = Publication {
            destination: topics::CREATE_GAME_PROPOSAL_DESTINATION.to_owned(),
            content_type: TEXT_PLAIN,
            body: self.player_id.as_str().as_bytes().to_vec(),
        };
        if self.publish(publication).is_ok() {
            tracing::info!(player_id = %self.player_id, "requested game proposal");
            self.state = SessionState::AwaitingAcceptance;
        }
    }

    /// Accepts someone else's proposal.
    pub fn request_accept_proposal(&mut self, proposal_id: &ProposalId) {
        self.ensure_player_channel_subscription();
        let publication = Publication {
            destination: topics::accept_proposal_destination(proposal_id),
            content_type: TEXT_PLAIN,
            body: self.player_id.as_str().as_bytes().to_vec(),
        };
        if self.publish(publication).is_ok() {
            tracing::info!(%proposal_id, "accepted game proposal");
            self.state = SessionState::AwaitingAcceptance;
        }
    }

    /// Sends a move to the active game. Does nothing outside a game.
    pub fn send_move(&mut self, mv: &Move) {
        match self.try_send_move(mv) {
            Ok(()) => {}
            Err(SessionError::NoActiveGame) => {
                tracing::debug!(%mv, "no active game, move not sent");
            }
            // Already logged by `publish`.
            Err(_) => {}
        }
    }

    /// Sends a move to the active game.
    ///
    /// # Errors
    /// - [`SessionError::NoActiveGame`] before any `CREATED` event
    /// - [`SessionError::Protocol`] if the move cannot be encoded
    /// - [`SessionError::Broker`] if the broker refused the publish
    pub fn try_send_move(&mut self, mv: &Move) -> Result<(), SessionError> {
        let game_id = self.active_game.as_ref().ok_or(SessionError::NoActiveGame)?;
        let publication = Publication {
            destination: topics::move_destination(game_id, &self.player_id),
            content_type: APPLICATION_JSON,
            body: self.codec.encode(mv)?,
        };
        self.publish(publication)?;
        tracing::info!(%mv, "move sent");
        Ok(())
    }

    fn publish(&mut self, publication: Publication) -> Result<(), SessionError> {
        let destination = publication.destination.clone();
        self.broker.publish(publication).map_err(|e| {
            tracing::warn!(%destination, error = %e, "publish failed");
            SessionError::Broker(e)
        })
    }

    // -- Callbacks ---------------------------------------------------------

    /// Calls `callback` for every game this player joins.
    /// Returns `false` if it was already registered.
    pub fn register_game_accepted_callback(&mut self, callback: &Callback<GameCreated>) -> bool {
        self.game_accepted.register(callback)
    }

    /// Returns whether `callback` was registered.
    pub fn remove_game_accepted_callback(&mut self, callback: &Callback<GameCreated>) -> bool {
        self.game_accepted.remove(callback)
    }

    /// Calls `callback` for every move played in a subscribed game.
    /// Returns `false` if it was already registered.
    pub fn register_move_played_callback(&mut self, callback: &Callback<MovePlayed>) -> bool {
        self.move_played.register(callback)
    }

    /// Returns whether `callback` was registered.
    pub fn remove_move_played_callback(&mut self, callback: &Callback<MovePlayed>) -> bool {
        self.move_played.remove(callback)
    }

    // -- Inbound -----------------------------------------------------------

    /// Applies one broker event.
    pub fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected => self.on_connected(),
            BrokerEvent::Disconnected => self.on_disconnected(),
            BrokerEvent::TransportError(e) => {
                tracing::warn!(error = %e, "transport error");
            }
            BrokerEvent::ProtocolError { message, details } => {
                tracing::error!(%message, %details, "broker reported error");
            }
            BrokerEvent::Message {
                subscription,
                destination,
                body,
            } => self.on_message(&subscription, &destination, &body),
        }
    }

    fn on_connected(&mut self) {
        self.connected.send_replace(true);
        tracing::info!(player_id = %self.player_id, "connected");

        self.ensure_game_proposals_subscription();
        if self.config.reconnect_policy == ReconnectPolicy::Resubscribe {
            if self.wants_player_channel {
                self.ensure_player_channel_subscription();
            }
            if let Some(game_id) = self.active_game.clone() {
                self.ensure_game_channel_subscription(&game_id);
            }
        }
    }

    fn on_disconnected(&mut self) {
        self.connected.send_replace(false);
        tracing::info!(player_id = %self.player_id, "disconnected");

        if self.config.reconnect_policy == ReconnectPolicy::Resubscribe {
            self.subscriptions.reset();
        }
    }

    fn on_message(&mut self, subscription: &SubscriptionId, destination: &str, body: &[u8]) {
        let Some(route) = self.subscriptions.route(subscription).cloned() else {
            tracing::debug!(%subscription, destination, "message for unknown subscription dropped");
            return;
        };

        let result = match route {
            Route::Proposals => self.on_proposal(body),
            Route::Player => self.on_player_event(body),
            Route::Game(game_id) => self.on_game_event(&game_id, body),
        };
        if let Err(e) = result {
            tracing::warn!(destination, error = %e, "dropping malformed message");
        }
    }

    fn on_proposal(&mut self, body: &[u8]) -> Result<(), SessionError> {
        let proposal: GameProposal = self.codec.decode(body)?;
        tracing::debug!(proposal_id = %proposal.game_proposal_id, "game proposal received");
        self.proposals.send_modify(|list| list.push(proposal));
        Ok(())
    }

    fn on_player_event(&mut self, body: &[u8]) -> Result<(), SessionError> {
        match self.codec.decode::<GameEvent>(body)? {
            GameEvent::Created(created) => {
                tracing::info!(game_id = %created.game_id, "game created");
                self.active_game = Some(created.game_id.clone());
                self.state = SessionState::InGame(created.game_id.clone());
                self.ensure_game_channel_subscription(&created.game_id);
                self.game_accepted.dispatch(&created);
            }
            other => tracing::debug!(event = ?other, "ignoring player event"),
        }
        Ok(())
    }

    fn on_game_event(&mut self, game_id: &GameId, body: &[u8]) -> Result<(), SessionError> {
        match self.codec.decode::<GameEvent>(body)? {
            GameEvent::Move(played) => {
                tracing::debug!(%game_id, mv = %played.played, "move played");
                self.move_played.dispatch(&played);
            }
            other => tracing::debug!(%game_id, event = ?other, "ignoring game event"),
        }
        Ok(())
    }
}
