//! Client actor: one Tokio task that owns the [`ChessSession`].
//!
//! The application talks to the task through a [`ClientHandle`]; the
//! broker talks to it through its event channel. Both are drained by the
//! same loop, so session state only ever changes on this task.

use microchess_protocol::{GameCreated, GameProposal, Move, MovePlayed, PlayerId, ProposalId};
use microchess_session::{
    Broker, BrokerEvent, Callback, ChessSession, SessionConfig, SessionError, SessionState,
};
use tokio::sync::{mpsc, oneshot, watch};

use crate::MicrochessError;

/// Commands sent to the client actor.
///
/// Variants carrying a `oneshot::Sender` expect a reply; the rest are
/// fire-and-forget.
enum ClientCommand {
    Connect,
    Disconnect,
    CreateProposal,
    AcceptProposal(ProposalId),
    SendMove(Move),
    TrySendMove {
        mv: Move,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    RegisterGameAccepted {
        callback: Callback<GameCreated>,
        reply: oneshot::Sender<bool>,
    },
    RemoveGameAccepted {
        callback: Callback<GameCreated>,
        reply: oneshot::Sender<bool>,
    },
    RegisterMovePlayed {
        callback: Callback<MovePlayed>,
        reply: oneshot::Sender<bool>,
    },
    RemoveMovePlayed {
        callback: Callback<MovePlayed>,
        reply: oneshot::Sender<bool>,
    },
    GetState {
        reply: oneshot::Sender<SessionState>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running client actor.
///
/// Cheap to clone; every clone drives the same session. Request methods
/// only queue work and return immediately. They fail with
/// [`MicrochessError::ClientClosed`] once the actor has shut down.
#[derive(Clone)]
pub struct ClientHandle {
    player_id: PlayerId,
    sender: mpsc::UnboundedSender<ClientCommand>,
    connected: watch::Receiver<bool>,
    proposals: watch::Receiver<Vec<GameProposal>>,
}

impl ClientHandle {
    /// This client's player id.
    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    /// Whether the broker connection is currently up.
    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Observes connectivity.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Observes the proposals received so far, in arrival order.
    pub fn proposals(&self) -> watch::Receiver<Vec<GameProposal>> {
        self.proposals.clone()
    }

    /// Starts connecting to the broker.
    pub fn connect(&self) -> Result<(), MicrochessError> {
        self.send(ClientCommand::Connect)
    }

    /// Starts disconnecting from the broker.
    pub fn disconnect(&self) -> Result<(), MicrochessError> {
        self.send(ClientCommand::Disconnect)
    }

    /// Announces a new game proposal from this player.
    pub fn request_create_proposal(&self) -> Result<(), MicrochessError> {
        self.send(ClientCommand::CreateProposal)
    }

    /// Accepts another player's proposal.
    pub fn request_accept_proposal(&self, proposal_id: ProposalId) -> Result<(), MicrochessError> {
        self.send(ClientCommand::AcceptProposal(proposal_id))
    }

    /// Sends a move to the active game. Outside a game the session drops
    /// it silently; use [`try_send_move`](Self::try_send_move) to find out.
    pub fn send_move(&self, mv: Move) -> Result<(), MicrochessError> {
        self.send(ClientCommand::SendMove(mv))
    }

    /// Sends a move and reports whether the session published it.
    ///
    /// # Errors
    /// - [`MicrochessError::Session`] wrapping
    ///   [`SessionError::NoActiveGame`] before any game was created
    /// - [`MicrochessError::Transport`] if the broker connection is gone
    /// - [`MicrochessError::Protocol`] if the move cannot be encoded
    /// - [`MicrochessError::ClientClosed`]
    pub async fn try_send_move(&self, mv: Move) -> Result<(), MicrochessError> {
        self.request(|reply| ClientCommand::TrySendMove { mv, reply })
            .await?
            .map_err(MicrochessError::from)
    }

    /// Registers a game-accepted callback. The client keeps only a weak
    /// reference; drop every `Arc` clone to stop receiving events.
    /// Returns `false` if it was already registered.
    pub async fn register_game_accepted_callback(
        &self,
        callback: &Callback<GameCreated>,
    ) -> Result<bool, MicrochessError> {
        let callback = callback.clone();
        self.request(|reply| ClientCommand::RegisterGameAccepted { callback, reply })
            .await
    }

    /// Removes a game-accepted callback. Returns whether it was registered.
    pub async fn remove_game_accepted_callback(
        &self,
        callback: &Callback<GameCreated>,
    ) -> Result<bool, MicrochessError> {
        let callback = callback.clone();
        self.request(|reply| ClientCommand::RemoveGameAccepted { callback, reply })
            .await
    }

    /// Registers a move-played callback. Returns `false` if it was already
    /// registered.
    pub async fn register_move_played_callback(
        &self,
        callback: &Callback<MovePlayed>,
    ) -> Result<bool, MicrochessError> {
        let callback = callback.clone();
        self.request(|reply| ClientCommand::RegisterMovePlayed { callback, reply })
            .await
    }

    /// Removes a move-played callback. Returns whether it was registered.
    pub async fn remove_move_played_callback(
        &self,
        callback: &Callback<MovePlayed>,
    ) -> Result<bool, MicrochessError> {
        let callback = callback.clone();
        self.request(|reply| ClientCommand::RemoveMovePlayed { callback, reply })
            .await
    }

    /// The current matchmaking state.
    pub async fn state(&self) -> Result<SessionState, MicrochessError> {
        self.request(|reply| ClientCommand::GetState { reply }).await
    }

    /// Disconnects and stops the actor. Every handle fails with
    /// [`MicrochessError::ClientClosed`] afterwards. Calling it again is
    /// a no-op.
    pub async fn shutdown(&self) {
        if self.request(|reply| ClientCommand::Shutdown { reply }).await.is_err() {
            tracing::debug!(player_id = %self.player_id, "client already closed");
        }
    }

    fn send(&self, cmd: ClientCommand) -> Result<(), MicrochessError> {
        self.sender
            .send(cmd)
            .map_err(|_| MicrochessError::ClientClosed)
    }

    async fn request<T>(
        &self,
        cmd: impl FnOnce(oneshot::Sender<T>) -> ClientCommand,
    ) -> Result<T, MicrochessError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(cmd(reply_tx))?;
        reply_rx.await.map_err(|_| MicrochessError::ClientClosed)
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle")
            .field("player_id", &self.player_id)
            .field("connected", &self.is_connected())
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

/// The actor owning a [`ChessSession`].
pub struct ChessClient<B: Broker> {
    session: ChessSession<B>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl<B: Broker> ChessClient<B> {
    /// Spawns the actor over `broker`, whose events arrive on `events`.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(
        broker: B,
        events: mpsc::UnboundedReceiver<BrokerEvent>,
        config: SessionConfig,
    ) -> ClientHandle {
        let session = ChessSession::new(broker, config);
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = ClientHandle {
            player_id: session.player_id().clone(),
            sender: tx,
            connected: session.connected(),
            proposals: session.proposals(),
        };

        let actor = Self {
            session,
            commands: rx,
            events,
        };
        tokio::spawn(actor.run());

        handle
    }

    async fn run(mut self) {
        let player_id = self.session.player_id().clone();
        tracing::info!(%player_id, "client actor started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        // Every handle dropped.
                        self.session.disconnect();
                        break;
                    };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                Some(event) = self.events.recv() => self.session.handle_event(event),
            }
        }

        tracing::info!(%player_id, "client actor stopped");
    }

    /// Applies one command. Returns `false` when the actor should stop.
    fn handle_command(&mut self, cmd: ClientCommand) -> bool {
        match cmd {
            ClientCommand::Connect => self.session.connect(),
            ClientCommand::Disconnect => self.session.disconnect(),
            ClientCommand::CreateProposal => self.session.request_create_proposal(),
            ClientCommand::AcceptProposal(proposal_id) => {
                self.session.request_accept_proposal(&proposal_id);
            }
            ClientCommand::SendMove(mv) => self.session.send_move(&mv),
            ClientCommand::TrySendMove { mv, reply } => {
                let _ = reply.send(self.session.try_send_move(&mv));
            }
            ClientCommand::RegisterGameAccepted { callback, reply } => {
                let _ = reply.send(self.session.register_game_accepted_callback(&callback));
            }
            ClientCommand::RemoveGameAccepted { callback, reply } => {
                let _ = reply.send(self.session.remove_game_accepted_callback(&callback));
            }
            ClientCommand::RegisterMovePlayed { callback, reply } => {
                let _ = reply.send(self.session.register_move_played_callback(&callback));
            }
            ClientCommand::RemoveMovePlayed { callback, reply } => {
                let _ = reply.send(self.session.remove_move_played_callback(&callback));
            }
            ClientCommand::GetState { reply } => {
                let _ = reply.send(self.session.state().clone());
            }
            ClientCommand::Shutdown { reply } => {
                self.session.disconnect();
                // Later sends fail instead of queueing behind a dead actor.
                self.commands.close();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}
