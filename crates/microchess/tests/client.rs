//! Integration tests for the client against an in-process STOMP broker.
//!
//! The fake broker is a plain `tokio-tungstenite` server driven step by
//! step from each test, so every frame the client sends is asserted in
//! order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use microchess::prelude::*;
use microchess::protocol::{Command, Frame};
use microchess::transport::TransportError;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Fake broker
// =========================================================================

async fn within<F: Future>(fut: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

struct FakeBroker {
    ws: WebSocketStream<TcpStream>,
    next_message: u64,
}

impl FakeBroker {
    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = within(listener.accept()).await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        Self { ws, next_message: 0 }
    }

    /// Next frame from the client, or `None` once it hung up.
    async fn try_recv(&mut self) -> Option<Frame> {
        loop {
            match within(self.ws.next()).await {
                Some(Ok(Message::Text(text))) => return Some(Frame::decode(text.as_bytes()).unwrap()),
                Some(Ok(Message::Binary(data))) => return Some(Frame::decode(&data).unwrap()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    async fn expect(&mut self, command: Command) -> Frame {
        let frame = self.try_recv().await.expect("client hung up");
        assert_eq!(frame.command, command, "unexpected frame {frame:?}");
        frame
    }

    async fn expect_subscribe(&mut self, destination: &str) -> Frame {
        let frame = self.expect(Command::Subscribe).await;
        assert_eq!(frame.header("destination"), Some(destination));
        frame
    }

    async fn send(&mut self, frame: Frame) {
        let text = String::from_utf8(frame.encode()).unwrap();
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    async fn handshake(&mut self) {
        let connect = self.expect(Command::Connect).await;
        assert_eq!(connect.header("accept-version"), Some("1.2"));
        self.send(Frame::new(Command::Connected).with_header("version", "1.2"))
            .await;
    }

    /// Delivers `body` on the subscription created by `subscribe`.
    async fn deliver(&mut self, subscribe: &Frame, body: &str) {
        self.next_message += 1;
        let frame = Frame::new(Command::Message)
            .with_header("subscription", subscribe.header("id").unwrap())
            .with_header("destination", subscribe.header("destination").unwrap())
            .with_header("message-id", format!("m-{}", self.next_message))
            .with_header("content-type", "application/json")
            .with_body(body.as_bytes().to_vec());
        self.send(frame).await;
    }
}

async fn wait_connected(client: &ClientHandle, expected: bool) {
    let mut connected = client.connected();
    within(connected.wait_for(|c| *c == expected)).await.unwrap();
}

fn forward<E: Clone + Send + 'static>() -> (Callback<E>, mpsc::UnboundedReceiver<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback: Callback<E> = Arc::new(move |event: &E| {
        let _ = tx.send(event.clone());
    });
    (callback, rx)
}

// =========================================================================
// Full flow
// =========================================================================

#[tokio::test]
async fn test_client_create_game_and_exchange_moves() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();
    let player_topic = format!("/topic/player/{}", client.player_id());

    let (on_created, mut created_rx) = forward::<GameCreated>();
    let (on_move, mut move_rx) = forward::<MovePlayed>();
    assert!(client.register_game_accepted_callback(&on_created).await.unwrap());
    assert!(client.register_move_played_callback(&on_move).await.unwrap());

    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    wait_connected(&client, true).await;

    // Lobby
    let proposals_sub = broker.expect_subscribe("/topic/game-proposals").await;
    broker
        .deliver(&proposals_sub, r#"{"gameProposalId":"P1","creatorId":"someone"}"#)
        .await;
    let mut proposals = client.proposals();
    within(proposals.wait_for(|p| p.len() == 1)).await.unwrap();
    assert_eq!(
        client.proposals().borrow()[0].game_proposal_id,
        ProposalId::from("P1")
    );

    // Create
    client.request_create_proposal().unwrap();
    let player_sub = broker.expect_subscribe(&player_topic).await;
    let create = broker.expect(Command::Send).await;
    assert_eq!(create.header("destination"), Some("/app/create-game-proposal"));
    assert_eq!(create.body_str(), Some(client.player_id().as_str()));
    assert_eq!(client.state().await.unwrap(), SessionState::AwaitingAcceptance);

    broker
        .deliver(
            &player_sub,
            r#"{"type":"CREATED","gameId":"G1","player1Id":"a","player2Id":"b"}"#,
        )
        .await;
    let created = within(created_rx.recv()).await.unwrap();
    assert_eq!(created.game_id, GameId::from("G1"));
    let game_sub = broker.expect_subscribe("/topic/game/G1").await;
    assert_eq!(
        client.state().await.unwrap(),
        SessionState::InGame(GameId::from("G1"))
    );

    // Moves
    client.send_move(Move::new("e2", "e4")).unwrap();
    let sent = broker.expect(Command::Send).await;
    assert_eq!(
        sent.header("destination"),
        Some(format!("/app/game/G1/{}", client.player_id()).as_str())
    );
    assert_eq!(sent.header("content-type"), Some("application/json"));
    assert_eq!(sent.body_str(), Some(r#"{"from":"e2","to":"e4"}"#));

    broker
        .deliver(
            &game_sub,
            r#"{"type":"MOVE","gameId":"G1","playerId":"b","move":{"from":"e7","to":"e5"}}"#,
        )
        .await;
    let played = within(move_rx.recv()).await.unwrap();
    assert_eq!(played.played, Move::new("e7", "e5"));

    // Leave
    client.disconnect().unwrap();
    broker.expect(Command::Disconnect).await;
    wait_connected(&client, false).await;
}

#[tokio::test]
async fn test_client_accept_proposal_publishes_player_id() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();
    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    broker.expect_subscribe("/topic/game-proposals").await;

    client.request_accept_proposal(ProposalId::from("P9")).unwrap();

    broker
        .expect_subscribe(&format!("/topic/player/{}", client.player_id()))
        .await;
    let accept = broker.expect(Command::Send).await;
    assert_eq!(accept.header("destination"), Some("/app/accept-game-proposal/P9"));
    assert_eq!(accept.header("content-type"), Some("text/plain"));
    assert_eq!(accept.body_str(), Some(client.player_id().as_str()));
}

#[tokio::test]
async fn test_client_try_send_move_without_game_returns_no_active_game() {
    let (_listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();

    let result = client.try_send_move(Move::new("e2", "e4")).await;

    assert!(matches!(
        result,
        Err(MicrochessError::Session(SessionError::NoActiveGame))
    ));
}

// =========================================================================
// Failures
// =========================================================================

#[tokio::test]
async fn test_client_error_frame_keeps_session_connected() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();
    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    let proposals_sub = broker.expect_subscribe("/topic/game-proposals").await;

    broker
        .send(
            Frame::new(Command::Error)
                .with_header("message", "unknown destination")
                .with_body(b"/app/nowhere".to_vec()),
        )
        .await;
    broker.deliver(&proposals_sub, "{ not json").await;
    broker.deliver(&proposals_sub, r#"{"gameProposalId":"P2"}"#).await;

    let mut proposals = client.proposals();
    within(proposals.wait_for(|p| !p.is_empty())).await.unwrap();
    assert_eq!(client.proposals().borrow().len(), 1);
    assert!(client.is_connected());
}

#[tokio::test]
async fn test_client_rejected_handshake_stays_disconnected() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();
    let mut connected = client.connected();

    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.expect(Command::Connect).await;
    broker
        .send(Frame::new(Command::Error).with_header("message", "bad credentials"))
        .await;

    // The client closes the socket and reports a disconnect.
    assert!(broker.try_recv().await.is_none());
    within(connected.changed()).await.unwrap();
    assert!(!*connected.borrow());
    assert_eq!(client.state().await.unwrap(), SessionState::Idle);
}

#[tokio::test]
async fn test_client_unreachable_broker_reports_disconnect() {
    let (listener, url) = listen().await;
    drop(listener);
    let client = ClientBuilder::new().broker_url(&url).build();
    let mut connected = client.connected();

    client.connect().unwrap();

    within(connected.changed()).await.unwrap();
    assert!(!*connected.borrow());
    assert_eq!(client.state().await.unwrap(), SessionState::Idle);
}

#[tokio::test]
async fn test_client_handshake_timeout_reports_disconnect() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new()
        .broker_url(&url)
        .connect_timeout(Duration::from_millis(100))
        .build();
    let mut connected = client.connected();

    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.expect(Command::Connect).await;

    within(connected.changed()).await.unwrap();
    assert!(!*connected.borrow());
}

#[tokio::test]
async fn test_client_try_send_move_after_broker_drop_returns_transport_error() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();
    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    broker.expect_subscribe("/topic/game-proposals").await;

    client.request_create_proposal().unwrap();
    let player_sub = broker
        .expect_subscribe(&format!("/topic/player/{}", client.player_id()))
        .await;
    broker.expect(Command::Send).await;
    broker
        .deliver(
            &player_sub,
            r#"{"type":"CREATED","gameId":"G1","player1Id":"a","player2Id":"b"}"#,
        )
        .await;
    broker.expect_subscribe("/topic/game/G1").await;

    broker.ws.close(None).await.unwrap();
    wait_connected(&client, false).await;

    let result = client.try_send_move(Move::new("e2", "e4")).await;
    assert!(matches!(
        result,
        Err(MicrochessError::Transport(TransportError::NotConnected))
    ));
    assert_eq!(
        client.state().await.unwrap(),
        SessionState::InGame(GameId::from("G1"))
    );
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test]
async fn test_client_resubscribes_after_broker_drop() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();
    let player_topic = format!("/topic/player/{}", client.player_id());

    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    let first = broker.expect_subscribe("/topic/game-proposals").await;
    client.request_create_proposal().unwrap();
    broker.expect_subscribe(&player_topic).await;
    broker.expect(Command::Send).await;

    broker.ws.close(None).await.unwrap();
    wait_connected(&client, false).await;

    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    let again = broker.expect_subscribe("/topic/game-proposals").await;
    broker.expect_subscribe(&player_topic).await;
    assert_ne!(first.header("id"), again.header("id"));

    // Deliveries on the new subscription reach the lobby.
    broker.deliver(&again, r#"{"gameProposalId":"P3"}"#).await;
    let mut proposals = client.proposals();
    within(proposals.wait_for(|p| p.len() == 1)).await.unwrap();
}

#[tokio::test]
async fn test_client_retain_policy_skips_resubscribe() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new()
        .broker_url(&url)
        .reconnect_policy(ReconnectPolicy::Retain)
        .build();

    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    broker.expect_subscribe("/topic/game-proposals").await;

    client.disconnect().unwrap();
    broker.expect(Command::Disconnect).await;
    wait_connected(&client, false).await;

    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    wait_connected(&client, true).await;

    // The first frame after reconnecting is the create request itself.
    client.request_create_proposal().unwrap();
    let subscribe = broker.expect(Command::Subscribe).await;
    assert_eq!(
        subscribe.header("destination"),
        Some(format!("/topic/player/{}", client.player_id()).as_str())
    );
    broker.expect(Command::Send).await;
}

#[tokio::test]
async fn test_client_reconnect_during_handshake_abandons_first_link() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();

    client.connect().unwrap();
    let mut abandoned = FakeBroker::accept(&listener).await;
    abandoned.expect(Command::Connect).await;

    // Leave and come back before the first broker answered CONNECT.
    client.disconnect().unwrap();
    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    let proposals_sub = broker.expect_subscribe("/topic/game-proposals").await;
    wait_connected(&client, true).await;

    // The first link hangs up without finishing its handshake.
    assert!(abandoned.try_recv().await.is_none());
    let _ = abandoned
        .ws
        .send(Message::Text(
            String::from_utf8(Frame::new(Command::Connected).encode())
                .unwrap()
                .into(),
        ))
        .await;
    drop(abandoned);

    // The second link stays live and its deliveries reach the lobby.
    broker.deliver(&proposals_sub, r#"{"gameProposalId":"P4"}"#).await;
    let mut proposals = client.proposals();
    within(proposals.wait_for(|p| p.len() == 1)).await.unwrap();
    assert!(client.is_connected());

    client.disconnect().unwrap();
    broker.expect(Command::Disconnect).await;
    wait_connected(&client, false).await;
}

#[tokio::test]
async fn test_client_reconnect_while_connected_reports_single_session() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();

    client.connect().unwrap();
    let mut first = FakeBroker::accept(&listener).await;
    first.handshake().await;
    first.expect_subscribe("/topic/game-proposals").await;
    wait_connected(&client, true).await;

    client.disconnect().unwrap();
    client.connect().unwrap();
    first.expect(Command::Disconnect).await;

    let mut second = FakeBroker::accept(&listener).await;
    second.handshake().await;
    let proposals_sub = second.expect_subscribe("/topic/game-proposals").await;
    wait_connected(&client, true).await;

    // The first link's teardown must not flip connectivity back.
    drop(first);
    second.deliver(&proposals_sub, r#"{"gameProposalId":"P5"}"#).await;
    let mut proposals = client.proposals();
    within(proposals.wait_for(|p| p.len() == 1)).await.unwrap();
    assert!(client.is_connected());
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_client_shutdown_closes_every_handle() {
    let (_listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();
    let other = client.clone();

    client.shutdown().await;

    assert!(matches!(other.connect(), Err(MicrochessError::ClientClosed)));
    assert!(matches!(
        other.state().await,
        Err(MicrochessError::ClientClosed)
    ));
    // Second shutdown is a no-op.
    other.shutdown().await;
}

#[tokio::test]
async fn test_client_removed_callback_not_invoked() {
    let (listener, url) = listen().await;
    let client = ClientBuilder::new().broker_url(&url).build();
    let (on_created, mut created_rx) = forward::<GameCreated>();
    client.register_game_accepted_callback(&on_created).await.unwrap();
    assert!(client.remove_game_accepted_callback(&on_created).await.unwrap());
    assert!(!client.remove_game_accepted_callback(&on_created).await.unwrap());

    client.connect().unwrap();
    let mut broker = FakeBroker::accept(&listener).await;
    broker.handshake().await;
    broker.expect_subscribe("/topic/game-proposals").await;
    client.request_create_proposal().unwrap();
    let player_sub = broker
        .expect_subscribe(&format!("/topic/player/{}", client.player_id()))
        .await;
    broker.expect(Command::Send).await;
    broker
        .deliver(&player_sub, r#"{"type":"CREATED","gameId":"G5"}"#)
        .await;

    broker.expect_subscribe("/topic/game/G5").await;
    assert!(created_rx.try_recv().is_err());
}
