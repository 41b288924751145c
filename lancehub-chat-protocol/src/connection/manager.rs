//! Connection Manager
//!
//! Owns the single live WebSocket bound to the active conversation and
//! drives its lifecycle as an explicit state machine:
//!
//! ```text
//! Disconnected → Connecting → Connected → Disconnected
//!                     ↑                        │ (abnormal close)
//!                     └──── Reconnecting ←─────┘
//! ```
//!
//! ## Rebinding
//!
//! Switching conversations replaces the socket rather than reusing it: the
//! old link's reader task is detached *before* the socket closes, so a
//! closing connection can never deliver stale events into the new
//! conversation. An atomic `connecting` flag keeps a rapid double-switch
//! from racing two handshakes into two live sockets.
//!
//! ## Reconnection
//!
//! An abnormal closure schedules exactly one reconnect attempt after a fixed
//! delay. Whether the attempt runs is decided at delay expiry, not at
//! failure time: the bound conversation must still be the active one. A
//! failed attempt is not rescheduled; the user re-triggers by reselecting
//! the conversation.

use crate::{frame, ConnectionEvent, ProtocolError, Result, SendFrame};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// Delay before the single reconnect attempt after an abnormal closure
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Timeout for the WebSocket handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Link lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No live connection
    Disconnected,
    /// WebSocket handshake in progress
    Connecting,
    /// Link established and bound to a conversation
    Connected,
    /// Abnormal closure observed; a delayed reconnect attempt is pending
    Reconnecting,
}

/// Shared handle to the id of the currently displayed conversation
///
/// Set only by the controller when the user opens or switches conversations;
/// read by the connection manager at reconnect-delay expiry and before every
/// send. Cloning shares the same underlying slot.
#[derive(Debug, Clone, Default)]
pub struct ActiveConversation {
    inner: Arc<RwLock<Option<i64>>>,
}

impl ActiveConversation {
    /// Create a handle with no active conversation
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the active conversation id
    pub async fn set(&self, conversation_id: Option<i64>) {
        *self.inner.write().await = conversation_id;
    }

    /// Current active conversation id, if any
    pub async fn get(&self) -> Option<i64> {
        *self.inner.read().await
    }

    /// Whether `conversation_id` is the active conversation right now
    pub async fn is(&self, conversation_id: i64) -> bool {
        *self.inner.read().await == Some(conversation_id)
    }
}

/// Connection manager configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Base URL of the live endpoint, e.g. `ws://host/api/v1/chat/ws`
    pub live_base: String,

    /// Fixed delay before the single reconnect attempt
    pub reconnect_delay: Duration,

    /// Handshake timeout
    pub connect_timeout: Duration,
}

impl ConnectionConfig {
    /// Configuration for a live endpoint base with default timings
    pub fn new(live_base: impl Into<String>) -> Self {
        Self {
            live_base: live_base.into(),
            reconnect_delay: RECONNECT_DELAY,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

/// Commands accepted by a link's writer task
enum LinkCommand {
    /// Send a serialized frame
    SendText(String),
    /// Perform the closing handshake and exit
    Close,
}

/// An established (or establishing) link to one conversation
struct ActiveLink {
    /// Serial used to tell this link apart from a replacement
    id: u64,
    /// Conversation the socket is bound to
    conversation_id: i64,
    /// Channel into the writer task
    command_tx: mpsc::UnboundedSender<LinkCommand>,
    /// Reader task, aborted on teardown so no stale events are delivered
    reader_task: JoinHandle<()>,
}

/// Manager for the single live conversation connection
///
/// Cheap to clone; clones share the same link, state, and event channel.
#[derive(Clone)]
pub struct ConnectionManager {
    /// Configuration
    config: Arc<ConnectionConfig>,

    /// Active conversation handle shared with the controller
    active: ActiveConversation,

    /// The current link, if any
    link: Arc<RwLock<Option<ActiveLink>>>,

    /// Current lifecycle state
    state: Arc<RwLock<LinkState>>,

    /// Guard against concurrent handshakes
    connecting: Arc<AtomicBool>,

    /// Serial source for link ids
    next_link_id: Arc<AtomicU64>,

    /// Event channel sender
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,

    /// Event channel receiver
    event_rx: Arc<RwLock<mpsc::UnboundedReceiver<ConnectionEvent>>>,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// `active` is the same handle the controller updates on conversation
    /// switches; the manager only ever reads it.
    pub fn new(config: ConnectionConfig, active: ActiveConversation) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            config: Arc::new(config),
            active,
            link: Arc::new(RwLock::new(None)),
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            connecting: Arc::new(AtomicBool::new(false)),
            next_link_id: Arc::new(AtomicU64::new(1)),
            event_tx,
            event_rx: Arc::new(RwLock::new(event_rx)),
        }
    }

    /// Get a receiver for connection events
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Forward events
        let event_rx = self.event_rx.clone();
        tokio::spawn(async move {
            let mut rx_lock = event_rx.write().await;
            while let Some(event) = rx_lock.recv().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        rx
    }

    /// Current lifecycle state
    pub async fn state(&self) -> LinkState {
        *self.state.read().await
    }

    /// Conversation the current link is bound to, if any
    pub async fn bound_conversation(&self) -> Option<i64> {
        self.link.read().await.as_ref().map(|l| l.conversation_id)
    }

    /// Bind the live connection to `conversation_id`
    ///
    /// No-op when already connected to the same conversation, or while
    /// another bind is mid-handshake. Any other existing link is torn down
    /// first, whatever its state.
    pub async fn bind(&self, conversation_id: i64, token: &str) -> Result<()> {
        if self.connecting.load(Ordering::SeqCst) {
            debug!(
                conversation_id,
                "bind skipped: connection attempt already in progress"
            );
            return Ok(());
        }

        {
            let link = self.link.read().await;
            if let Some(current) = link.as_ref() {
                if current.conversation_id == conversation_id
                    && *self.state.read().await == LinkState::Connected
                {
                    debug!(conversation_id, "bind skipped: already connected");
                    return Ok(());
                }
            }
        }

        // Replace whatever link exists, regardless of its state
        self.teardown_link().await;

        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(conversation_id, "bind skipped: lost the connecting race");
            return Ok(());
        }

        *self.state.write().await = LinkState::Connecting;

        let url = self.endpoint_for(conversation_id, token)?;
        debug!(conversation_id, "opening live connection");

        let stream = match timeout(self.config.connect_timeout, connect_async(url)).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                self.connecting.store(false, Ordering::SeqCst);
                *self.state.write().await = LinkState::Disconnected;
                let _ = self.event_tx.send(ConnectionEvent::ConnectionError {
                    conversation_id,
                    message: e.to_string(),
                });
                return Err(e.into());
            }
            Err(_) => {
                self.connecting.store(false, Ordering::SeqCst);
                *self.state.write().await = LinkState::Disconnected;
                let message =
                    format!("handshake for conversation {conversation_id} timed out");
                let _ = self.event_tx.send(ConnectionEvent::ConnectionError {
                    conversation_id,
                    message: message.clone(),
                });
                return Err(ProtocolError::Timeout(message));
            }
        };

        self.install_link(conversation_id, token.to_string(), stream)
            .await;
        self.connecting.store(false, Ordering::SeqCst);

        info!(conversation_id, "live connection established");
        let _ = self
            .event_tx
            .send(ConnectionEvent::Connected { conversation_id });
        Ok(())
    }

    /// Send a frame over the live connection
    ///
    /// Permitted only while `Connected` with the bound conversation equal to
    /// the active conversation; fails synchronously otherwise. There is no
    /// send queue — the caller rolls back optimistic state on error.
    pub async fn send(&self, frame: &SendFrame) -> Result<()> {
        if *self.state.read().await != LinkState::Connected {
            return Err(ProtocolError::NotConnected(
                "no live connection".to_string(),
            ));
        }

        let link = self.link.read().await;
        let link = link.as_ref().ok_or_else(|| {
            ProtocolError::NotConnected("no live connection".to_string())
        })?;

        if !self.active.is(link.conversation_id).await {
            return Err(ProtocolError::NotConnected(format!(
                "link bound to conversation {} which is no longer active",
                link.conversation_id
            )));
        }

        let text = frame.to_text()?;
        link.command_tx
            .send(LinkCommand::SendText(text))
            .map_err(|_| ProtocolError::NotConnected("writer task stopped".to_string()))
    }

    /// Tear down the current link, if any, without reconnecting
    pub async fn disconnect(&self) {
        debug!("tearing down live connection");
        self.teardown_link().await;
    }

    /// Detach and close the current link
    ///
    /// The reader task is aborted before the close frame goes out, so a
    /// closing socket cannot deliver events. Silent: replacement is not a
    /// closure the consumer needs to observe.
    async fn teardown_link(&self) {
        let link = self.link.write().await.take();
        if let Some(link) = link {
            link.reader_task.abort();
            let _ = link.command_tx.send(LinkCommand::Close);
        }
        *self.state.write().await = LinkState::Disconnected;
    }

    /// Install a freshly opened socket as the current link
    async fn install_link(
        &self,
        conversation_id: i64,
        token: String,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) {
        let link_id = self.next_link_id.fetch_add(1, Ordering::SeqCst);
        let (sink, source) = stream.split();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let writer_events = self.event_tx.clone();
        tokio::spawn(run_writer(sink, command_rx, conversation_id, writer_events));

        let reader_task = tokio::spawn(run_reader(
            self.clone(),
            link_id,
            conversation_id,
            token,
            source,
        ));

        *self.link.write().await = Some(ActiveLink {
            id: link_id,
            conversation_id,
            command_tx,
            reader_task,
        });
        *self.state.write().await = LinkState::Connected;
    }

    /// Build the per-conversation endpoint URL
    fn endpoint_for(&self, conversation_id: i64, token: &str) -> Result<String> {
        let base = self.config.live_base.trim_end_matches('/');
        if base.is_empty() {
            return Err(ProtocolError::InvalidEndpoint(
                "live endpoint base is empty".to_string(),
            ));
        }
        Ok(format!("{base}/{conversation_id}?token={token}"))
    }
}

/// Writer task: drains the command channel into the socket
async fn run_writer(
    mut sink: WsSink,
    mut command_rx: mpsc::UnboundedReceiver<LinkCommand>,
    conversation_id: i64,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
) {
    while let Some(command) = command_rx.recv().await {
        match command {
            LinkCommand::SendText(text) => {
                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                    error!(conversation_id, "live send failed: {e}");
                    let _ = event_tx.send(ConnectionEvent::ConnectionError {
                        conversation_id,
                        message: format!("send failed: {e}"),
                    });
                }
            }
            LinkCommand::Close => {
                let _ = sink
                    .send(WsMessage::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    })))
                    .await;
                let _ = sink.close().await;
                break;
            }
        }
    }
}

/// Reader task: routes inbound frames and drives the close transition
async fn run_reader(
    manager: ConnectionManager,
    link_id: u64,
    conversation_id: i64,
    token: String,
    mut source: WsSource,
) {
    let mut normal_close = false;
    let mut reason: Option<String> = None;

    while let Some(incoming) = source.next().await {
        match incoming {
            Ok(WsMessage::Text(text)) => match frame::parse_live_message(text.as_str()) {
                Ok(message) => {
                    let _ = manager.event_tx.send(ConnectionEvent::MessageReceived {
                        conversation_id,
                        message,
                    });
                }
                Err(e) => {
                    warn!(conversation_id, "dropping malformed live frame: {e}");
                }
            },
            Ok(WsMessage::Close(close_frame)) => {
                if let Some(f) = close_frame {
                    normal_close = f.code == CloseCode::Normal;
                    if !f.reason.is_empty() {
                        reason = Some(f.reason.to_string());
                    }
                    debug!(conversation_id, code = ?f.code, "live connection closed");
                } else {
                    debug!(conversation_id, "live connection closed without a code");
                }
                break;
            }
            Ok(_) => {
                // Ping/pong handled by tungstenite; binary frames are not
                // part of this protocol
            }
            Err(e) => {
                error!(conversation_id, "live connection error: {e}");
                let _ = manager.event_tx.send(ConnectionEvent::ConnectionError {
                    conversation_id,
                    message: e.to_string(),
                });
                // A dropped stream without a closing handshake counts as an
                // abnormal closure
                break;
            }
        }
    }

    // Only the link that is still installed may drive the transition; a
    // replaced link's reader has been aborted, but guard against the window
    // between replacement and abort.
    {
        let mut link = manager.link.write().await;
        let is_current = link.as_ref().map(|l| l.id) == Some(link_id);
        if !is_current {
            return;
        }
        *link = None;
    }

    if normal_close {
        *manager.state.write().await = LinkState::Disconnected;
        let _ = manager.event_tx.send(ConnectionEvent::Disconnected {
            conversation_id,
            reason,
            will_retry: false,
        });
        return;
    }

    *manager.state.write().await = LinkState::Reconnecting;
    let _ = manager.event_tx.send(ConnectionEvent::Disconnected {
        conversation_id,
        reason,
        will_retry: true,
    });

    let delay = manager.config.reconnect_delay;
    info!(
        conversation_id,
        "abnormal closure; reconnect attempt in {:?}", delay
    );

    tokio::spawn(reconnect_task(manager, conversation_id, token, delay));
}

/// Build the single delayed reconnect attempt as a boxed, `Send` future.
///
/// Boxing with an explicit `+ Send` return type breaks the Send-inference
/// cycle between `install_link` (which spawns `run_reader`) and `bind`
/// (which this task calls back into): `run_reader` now spawns a future whose
/// type already declares `Send`, so the compiler no longer has to introspect
/// `install_link`'s opaque future from within its own defining scope.
fn reconnect_task(
    manager: ConnectionManager,
    conversation_id: i64,
    token: String,
    delay: Duration,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        tokio::time::sleep(delay).await;

        // The still-active check happens now, at delay expiry
        if !manager.active.is(conversation_id).await {
            debug!(
                conversation_id,
                "reconnect abandoned: conversation no longer active"
            );
            let mut state = manager.state.write().await;
            if *state == LinkState::Reconnecting {
                *state = LinkState::Disconnected;
            }
            return;
        }

        if *manager.state.read().await != LinkState::Reconnecting {
            debug!(conversation_id, "reconnect abandoned: link already replaced");
            return;
        }

        if let Err(e) = manager.bind(conversation_id, &token).await {
            warn!(conversation_id, "reconnect attempt failed: {e}");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_active_conversation_handle() {
        let active = ActiveConversation::new();
        assert_eq!(active.get().await, None);

        active.set(Some(42)).await;
        assert!(active.is(42).await);
        assert!(!active.is(7).await);

        // Clones share the slot
        let clone = active.clone();
        clone.set(Some(7)).await;
        assert!(active.is(7).await);
    }

    #[tokio::test]
    async fn test_initial_state() {
        let manager =
            ConnectionManager::new(ConnectionConfig::new("ws://127.0.0.1:1"), ActiveConversation::new());
        assert_eq!(manager.state().await, LinkState::Disconnected);
        assert_eq!(manager.bound_conversation().await, None);
    }

    #[tokio::test]
    async fn test_endpoint_for() {
        let manager = ConnectionManager::new(
            ConnectionConfig::new("ws://host/api/v1/chat/ws/"),
            ActiveConversation::new(),
        );
        let url = manager.endpoint_for(42, "tok").unwrap();
        assert_eq!(url, "ws://host/api/v1/chat/ws/42?token=tok");
    }

    #[tokio::test]
    async fn test_endpoint_requires_base() {
        let manager =
            ConnectionManager::new(ConnectionConfig::new(""), ActiveConversation::new());
        assert!(matches!(
            manager.endpoint_for(1, "tok"),
            Err(ProtocolError::InvalidEndpoint(_))
        ));
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let manager = ConnectionManager::new(
            ConnectionConfig::new("ws://127.0.0.1:1"),
            ActiveConversation::new(),
        );
        let result = manager.send(&SendFrame::new("hello")).await;
        assert!(matches!(result, Err(ProtocolError::NotConnected(_))));
    }
}
