//! Connection Manager Integration Tests
//!
//! Exercises the live-link state machine against a real local WebSocket
//! server: bind/send round-trips, malformed frame handling, normal vs
//! abnormal closure, and the delayed single-reconnect policy.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use lancehub_chat_protocol::{
    ActiveConversation, ConnectionConfig, ConnectionEvent, ConnectionManager, LinkState,
    ProtocolError, SendFrame,
};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Commands a test can issue to a server-side session
enum ServerCommand {
    SendText(String),
    Close(CloseCode),
}

/// One accepted WebSocket session, as seen by the server
struct ServerSession {
    /// Request path including the query string
    path: String,
    commands: mpsc::UnboundedSender<ServerCommand>,
    received: mpsc::UnboundedReceiver<String>,
}

/// Minimal live-endpoint stand-in accepting any number of sessions
struct TestServer {
    port: u16,
    sessions: mpsc::UnboundedReceiver<ServerSession>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (session_tx, sessions) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _addr)) = listener.accept().await {
                let session_tx = session_tx.clone();
                tokio::spawn(async move {
                    let mut path = String::new();
                    let websocket = {
                        let path_ref = &mut path;
                        accept_hdr_async(stream, |request: &Request, response: Response| {
                            *path_ref = request.uri().to_string();
                            Ok(response)
                        })
                        .await
                    };
                    let websocket = match websocket {
                        Ok(ws) => ws,
                        Err(_) => return,
                    };

                    let (command_tx, mut command_rx) = mpsc::unbounded_channel();
                    let (received_tx, received_rx) = mpsc::unbounded_channel();
                    let _ = session_tx.send(ServerSession {
                        path,
                        commands: command_tx,
                        received: received_rx,
                    });

                    let (mut sink, mut source) = websocket.split();
                    loop {
                        tokio::select! {
                            command = command_rx.recv() => match command {
                                Some(ServerCommand::SendText(text)) => {
                                    let _ = sink.send(WsMessage::Text(text.into())).await;
                                }
                                Some(ServerCommand::Close(code)) => {
                                    let _ = sink
                                        .send(WsMessage::Close(Some(CloseFrame {
                                            code,
                                            reason: "".into(),
                                        })))
                                        .await;
                                    break;
                                }
                                None => break,
                            },
                            inbound = source.next() => match inbound {
                                Some(Ok(WsMessage::Text(text))) => {
                                    let _ = received_tx.send(text.as_str().to_string());
                                }
                                Some(Ok(WsMessage::Close(_))) | None => break,
                                _ => {}
                            },
                        }
                    }
                });
            }
        });

        Self { port, sessions }
    }

    fn live_base(&self) -> String {
        format!("ws://127.0.0.1:{}/api/v1/chat/ws", self.port)
    }

    async fn accept(&mut self) -> ServerSession {
        timeout(Duration::from_secs(5), self.sessions.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("server stopped")
    }

    async fn expect_no_connection(&mut self, wait: Duration) {
        assert!(
            timeout(wait, self.sessions.recv()).await.is_err(),
            "unexpected connection accepted"
        );
    }
}

fn manager_for(server: &TestServer, active: &ActiveConversation) -> ConnectionManager {
    let mut config = ConnectionConfig::new(server.live_base());
    // Keep test wall-clock short; the policy under test is unchanged
    config.reconnect_delay = Duration::from_millis(200);
    ConnectionManager::new(config, active.clone())
}

async fn next_event(
    events: &mut mpsc::UnboundedReceiver<ConnectionEvent>,
    wait: Duration,
) -> Option<ConnectionEvent> {
    timeout(wait, events.recv()).await.ok().flatten()
}

fn live_message_json(id: i64, conversation_id: i64, sender_id: i64, content: &str) -> String {
    format!(
        r#"{{"id":{id},"conversation_id":{conversation_id},"sender_id":{sender_id},"content":"{content}","attachments":[],"created_at":"2024-01-01T00:00:00Z"}}"#
    )
}

#[tokio::test]
async fn test_bind_connects_and_delivers_messages() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(42)).await;

    let manager = manager_for(&server, &active);
    let mut events = manager.subscribe().await;

    manager.bind(42, "secret-token").await.unwrap();
    assert_eq!(manager.state().await, LinkState::Connected);
    assert_eq!(manager.bound_conversation().await, Some(42));

    let session = server.accept().await;
    assert!(session.path.contains("/42"));
    assert!(session.path.contains("token=secret-token"));

    match next_event(&mut events, Duration::from_secs(1)).await {
        Some(ConnectionEvent::Connected { conversation_id }) => {
            assert_eq!(conversation_id, 42);
        }
        other => panic!("expected Connected, got {other:?}"),
    }

    session
        .commands
        .send(ServerCommand::SendText(live_message_json(501, 42, 7, "Hello")))
        .unwrap();

    match next_event(&mut events, Duration::from_secs(1)).await {
        Some(ConnectionEvent::MessageReceived {
            conversation_id,
            message,
        }) => {
            assert_eq!(conversation_id, 42);
            assert_eq!(message.id, 501);
            assert_eq!(message.content, "Hello");
        }
        other => panic!("expected MessageReceived, got {other:?}"),
    }
}

#[tokio::test]
async fn test_send_round_trip() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(5)).await;

    let manager = manager_for(&server, &active);
    manager.bind(5, "tok").await.unwrap();
    let mut session = server.accept().await;

    manager.send(&SendFrame::new("Hello")).await.unwrap();

    let received = timeout(Duration::from_secs(1), session.received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, r#"{"content":"Hello"}"#);
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(3)).await;

    let manager = manager_for(&server, &active);
    let mut events = manager.subscribe().await;
    manager.bind(3, "tok").await.unwrap();
    let session = server.accept().await;

    // Connected event first
    assert!(matches!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(ConnectionEvent::Connected { .. })
    ));

    session
        .commands
        .send(ServerCommand::SendText("not json at all".to_string()))
        .unwrap();
    session
        .commands
        .send(ServerCommand::SendText(live_message_json(9, 3, 2, "ok")))
        .unwrap();

    // The malformed frame produces no event; the next one is the valid message
    match next_event(&mut events, Duration::from_secs(1)).await {
        Some(ConnectionEvent::MessageReceived { message, .. }) => {
            assert_eq!(message.id, 9);
        }
        other => panic!("expected the valid message only, got {other:?}"),
    }
}

#[tokio::test]
async fn test_normal_close_does_not_reconnect() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(8)).await;

    let manager = manager_for(&server, &active);
    let mut events = manager.subscribe().await;
    manager.bind(8, "tok").await.unwrap();
    let session = server.accept().await;

    assert!(matches!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(ConnectionEvent::Connected { .. })
    ));

    session
        .commands
        .send(ServerCommand::Close(CloseCode::Normal))
        .unwrap();

    match next_event(&mut events, Duration::from_secs(1)).await {
        Some(ConnectionEvent::Disconnected { will_retry, .. }) => {
            assert!(!will_retry);
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    // Well past the reconnect delay: nothing reconnects
    server.expect_no_connection(Duration::from_millis(600)).await;
    assert_eq!(manager.state().await, LinkState::Disconnected);
}

#[tokio::test]
async fn test_abnormal_close_reconnects_while_still_active() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(5)).await;

    let manager = manager_for(&server, &active);
    let mut events = manager.subscribe().await;
    manager.bind(5, "tok").await.unwrap();
    let session = server.accept().await;

    assert!(matches!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(ConnectionEvent::Connected { .. })
    ));

    session
        .commands
        .send(ServerCommand::Close(CloseCode::Error))
        .unwrap();

    match next_event(&mut events, Duration::from_secs(1)).await {
        Some(ConnectionEvent::Disconnected { will_retry, .. }) => {
            assert!(will_retry);
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    // The conversation is still active at delay expiry, so a second
    // connection arrives
    let session = server.accept().await;
    assert!(session.path.contains("/5"));

    match next_event(&mut events, Duration::from_secs(2)).await {
        Some(ConnectionEvent::Connected { conversation_id }) => {
            assert_eq!(conversation_id, 5);
        }
        other => panic!("expected reconnect Connected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_abnormal_close_abandons_reconnect_after_switch() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(5)).await;

    let manager = manager_for(&server, &active);
    let mut events = manager.subscribe().await;
    manager.bind(5, "tok").await.unwrap();
    let session = server.accept().await;

    assert!(matches!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(ConnectionEvent::Connected { .. })
    ));

    session
        .commands
        .send(ServerCommand::Close(CloseCode::Error))
        .unwrap();
    assert!(matches!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(ConnectionEvent::Disconnected { will_retry: true, .. })
    ));

    // User switches before the delay elapses; the check happens at expiry
    active.set(Some(6)).await;

    server.expect_no_connection(Duration::from_millis(600)).await;
    assert_eq!(manager.state().await, LinkState::Disconnected);
}

#[tokio::test]
async fn test_send_rejected_when_bound_conversation_not_active() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(5)).await;

    let manager = manager_for(&server, &active);
    manager.bind(5, "tok").await.unwrap();
    let _session = server.accept().await;

    // The user switched away; the link is still up but must refuse sends
    active.set(Some(6)).await;

    let result = manager.send(&SendFrame::new("late")).await;
    assert!(matches!(result, Err(ProtocolError::NotConnected(_))));
}

#[tokio::test]
async fn test_bind_same_conversation_is_noop() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(7)).await;

    let manager = manager_for(&server, &active);
    manager.bind(7, "tok").await.unwrap();
    let _session = server.accept().await;

    manager.bind(7, "tok").await.unwrap();
    server.expect_no_connection(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_rebind_replaces_socket_and_detaches_old_reader() {
    let mut server = TestServer::start().await;
    let active = ActiveConversation::new();
    active.set(Some(1)).await;

    let manager = manager_for(&server, &active);
    let mut events = manager.subscribe().await;
    manager.bind(1, "tok").await.unwrap();
    let first = server.accept().await;

    assert!(matches!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(ConnectionEvent::Connected { conversation_id: 1 })
    ));

    active.set(Some(2)).await;
    manager.bind(2, "tok").await.unwrap();
    let _second = server.accept().await;
    assert_eq!(manager.bound_conversation().await, Some(2));

    assert!(matches!(
        next_event(&mut events, Duration::from_secs(1)).await,
        Some(ConnectionEvent::Connected { conversation_id: 2 })
    ));

    // The replaced link's reader is detached: a frame pushed through the old
    // session must not surface
    let _ = first
        .commands
        .send(ServerCommand::SendText(live_message_json(900, 1, 3, "stale")));

    match next_event(&mut events, Duration::from_millis(300)).await {
        None => {}
        Some(ConnectionEvent::Disconnected { .. }) => {
            // Acceptable: the old socket may report its own closure
        }
        Some(other) => panic!("stale event leaked from the replaced link: {other:?}"),
    }
}
