//! Chat Controller
//!
//! Composition root wiring user actions to the stores and the live
//! connection. All mutable state — conversation list, active thread, active
//! conversation id, connection handle — is owned here and reached through
//! explicit handles; there are no process-wide singletons.
//!
//! ## Staleness discipline
//!
//! Every `open`/`switch_to` bumps a generation counter. Any operation that
//! awaits the network snapshots the counter first and re-checks it before
//! touching shared state; on mismatch the result is silently discarded.
//! That is the whole cancellation model — a superseded fetch simply finds
//! its generation stale and drops its result.

use crate::{
    conversations::{ConversationStore, TouchOutcome},
    thread::{IngestOutcome, MessageRef, MessageThreadStore, ThreadMessage},
    AuthProvider, ChatApi, ClientConfig, ClientError, Participant, ParticipantCache, RestChatApi,
    Result,
};
use chrono::Utc;
use lancehub_chat_protocol::{
    ActiveConversation, ConnectionEvent, ConnectionManager, Conversation, LinkState, Message,
    SendFrame,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

/// Notifications for a presentation layer
///
/// Snapshots stay authoritative: an event says *what* changed, the layer
/// re-reads the relevant snapshot for the data.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// The conversation list changed (order, previews, unread counts)
    ConversationsUpdated,
    /// The active thread changed
    ThreadUpdated { conversation_id: i64 },
    /// The live connection moved to a new state
    ConnectionChanged { state: LinkState },
    /// A user-facing error occurred outside a direct call
    Error { message: String },
}

/// The conversation client's composition root
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct ChatController {
    auth: Arc<dyn AuthProvider>,
    api: Arc<dyn ChatApi>,
    participants: ParticipantCache,
    conversations: Arc<RwLock<ConversationStore>>,
    thread: Arc<RwLock<MessageThreadStore>>,
    connection: ConnectionManager,
    active: ActiveConversation,
    generation: Arc<AtomicU64>,
    event_tx: mpsc::UnboundedSender<ChatEvent>,
    event_rx: Arc<RwLock<mpsc::UnboundedReceiver<ChatEvent>>>,
}

impl ChatController {
    /// Create a controller over the production REST client
    pub fn new(config: &ClientConfig, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        let api: Arc<dyn ChatApi> = Arc::new(RestChatApi::new(config, auth.clone())?);
        Ok(Self::with_api(config, auth, api))
    }

    /// Create a controller over a caller-supplied API implementation
    pub fn with_api(
        config: &ClientConfig,
        auth: Arc<dyn AuthProvider>,
        api: Arc<dyn ChatApi>,
    ) -> Self {
        let active = ActiveConversation::new();
        let connection = ConnectionManager::new(config.connection(), active.clone());
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let local_user = auth.user_id();

        Self {
            auth,
            participants: ParticipantCache::new(api.clone()),
            api,
            conversations: Arc::new(RwLock::new(ConversationStore::new(local_user))),
            thread: Arc::new(RwLock::new(MessageThreadStore::new(local_user))),
            connection,
            active,
            generation: Arc::new(AtomicU64::new(0)),
            event_tx,
            event_rx: Arc::new(RwLock::new(event_rx)),
        }
    }

    /// Start consuming live connection events
    ///
    /// Must be called once before the first `open`.
    pub async fn start(&self) {
        let mut events = self.connection.subscribe().await;
        let controller = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                controller.handle_connection_event(event).await;
            }
        });
    }

    /// Get a receiver for controller events
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ChatEvent> {
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

    /// Id of the locally signed-in user
    pub fn local_user(&self) -> i64 {
        self.auth.user_id()
    }

    /// Reload the conversation list from the backend
    ///
    /// A failed load surfaces the error and leaves the previous list
    /// untouched; a load superseded by a conversation switch is discarded.
    pub async fn refresh_conversations(&self) -> Result<()> {
        let generation = self.generation.load(Ordering::SeqCst);

        let conversations = self.api.conversations().await?;
        self.participants
            .preload(&conversations, self.auth.user_id())
            .await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("discarding stale conversation list");
            return Ok(());
        }

        self.conversations.write().await.replace(conversations);
        let _ = self.event_tx.send(ChatEvent::ConversationsUpdated);
        Ok(())
    }

    /// Open a conversation: make it active, load its thread, bind the live
    /// connection
    ///
    /// A thread-load failure is surfaced as a [`ChatEvent::Error`] but does
    /// not abort the open — pending entries survive and the live connection
    /// still binds, matching the retry-capable error state the UI renders.
    pub async fn open(&self, conversation_id: i64) -> Result<()> {
        // Reopening the already-loaded active conversation is a no-op
        if self.active.is(conversation_id).await && !self.thread.read().await.is_empty() {
            debug!(conversation_id, "open skipped: already active");
            return Ok(());
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(conversation_id, "opening conversation");

        self.active.set(Some(conversation_id)).await;
        self.thread.write().await.open(conversation_id);
        self.conversations.write().await.mark_read(conversation_id);
        let _ = self
            .event_tx
            .send(ChatEvent::ThreadUpdated { conversation_id });
        let _ = self.event_tx.send(ChatEvent::ConversationsUpdated);

        match self.api.messages(conversation_id).await {
            Ok(messages) => {
                if self.generation.load(Ordering::SeqCst) != generation {
                    debug!(conversation_id, "discarding stale thread fetch");
                } else if self
                    .thread
                    .write()
                    .await
                    .replace_confirmed(conversation_id, messages)
                {
                    let _ = self
                        .event_tx
                        .send(ChatEvent::ThreadUpdated { conversation_id });
                }
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(conversation_id, "thread load failed: {e}");
                let _ = self.event_tx.send(ChatEvent::Error {
                    message: e.user_message(),
                });
            }
        }

        // Bind the live connection only if this open is still the latest
        if self.generation.load(Ordering::SeqCst) == generation {
            let token = self.auth.bearer_token().await?;
            if let Err(e) = self.connection.bind(conversation_id, &token).await {
                warn!(conversation_id, "live bind failed: {e}");
                let _ = self.event_tx.send(ChatEvent::Error {
                    message: e.user_message(),
                });
            }
        }

        Ok(())
    }

    /// Switch the active conversation
    pub async fn switch_to(&self, conversation_id: i64) -> Result<()> {
        self.open(conversation_id).await
    }

    /// Pick and open a conversation: `preferred` if it exists, else the
    /// current one, else the most recently active
    ///
    /// Returns the opened conversation id, or `None` for an empty list.
    pub async fn ensure_active(&self, preferred: Option<i64>) -> Result<Option<i64>> {
        let current = self.active.get().await;
        let target = {
            let store = self.conversations.read().await;
            preferred
                .filter(|id| store.contains(*id))
                .or_else(|| current.filter(|id| store.contains(*id)))
                .or_else(|| store.first_id())
        };

        match target {
            Some(conversation_id) => {
                self.open(conversation_id).await?;
                Ok(Some(conversation_id))
            }
            None => Ok(None),
        }
    }

    /// Send a message to the active conversation
    ///
    /// The optimistic entry appears immediately; if the live connection
    /// refuses the send it is rolled back and the error returned. No retry,
    /// no queueing.
    pub async fn send(&self, content: &str) -> Result<MessageRef> {
        self.send_with_attachments(content, Vec::new()).await
    }

    /// Send a message with attachment URLs
    pub async fn send_with_attachments(
        &self,
        content: &str,
        attachments: Vec<String>,
    ) -> Result<MessageRef> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::SendFailed("message is empty".to_string()));
        }

        let conversation_id = self
            .active
            .get()
            .await
            .ok_or(ClientError::NoActiveConversation)?;

        let reference = self
            .thread
            .write()
            .await
            .append_pending(content, attachments.clone())
            .ok_or(ClientError::NoActiveConversation)?;
        let _ = self
            .event_tx
            .send(ChatEvent::ThreadUpdated { conversation_id });

        // The list preview updates optimistically too; id 0 never collides
        // with server-assigned ids and is replaced by the echo
        let preview = Message {
            id: 0,
            conversation_id,
            sender_id: self.auth.user_id(),
            content: content.to_string(),
            attachments: attachments.clone(),
            is_read: true,
            created_at: Utc::now(),
        };
        self.conversations.write().await.touch(&preview, true);
        let _ = self.event_tx.send(ChatEvent::ConversationsUpdated);

        let frame = SendFrame::new(content).with_attachments(attachments);
        if let Err(e) = self.connection.send(&frame).await {
            warn!(conversation_id, "send failed, rolling back: {e}");
            self.thread.write().await.remove_pending(&reference);
            let _ = self
                .event_tx
                .send(ChatEvent::ThreadUpdated { conversation_id });
            return Err(ClientError::SendFailed(e.user_message()));
        }

        Ok(reference)
    }

    /// Conversation list snapshot in display order
    pub async fn conversations(&self) -> Vec<Conversation> {
        self.conversations.read().await.snapshot()
    }

    /// Active thread snapshot, ascending by creation time
    pub async fn thread(&self) -> Vec<ThreadMessage> {
        self.thread.read().await.messages().to_vec()
    }

    /// Currently active conversation id
    pub async fn active_conversation(&self) -> Option<i64> {
        self.active.get().await
    }

    /// Current live connection state
    pub async fn connection_state(&self) -> LinkState {
        self.connection.state().await
    }

    /// Resolve a participant profile for rendering
    pub async fn participant(&self, user_id: i64) -> Result<Participant> {
        self.participants.resolve(user_id).await
    }

    /// Tear down the live connection (sign-out, shutdown)
    pub async fn shutdown(&self) {
        self.connection.disconnect().await;
        self.active.set(None).await;
    }

    async fn handle_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { conversation_id } => {
                debug!(conversation_id, "live connection up");
                let _ = self.event_tx.send(ChatEvent::ConnectionChanged {
                    state: LinkState::Connected,
                });
            }
            ConnectionEvent::Disconnected {
                conversation_id,
                reason,
                will_retry,
            } => {
                debug!(conversation_id, ?reason, will_retry, "live connection down");
                let state = if will_retry {
                    LinkState::Reconnecting
                } else {
                    LinkState::Disconnected
                };
                let _ = self.event_tx.send(ChatEvent::ConnectionChanged { state });
            }
            ConnectionEvent::ConnectionError {
                conversation_id,
                message,
            } => {
                warn!(conversation_id, "live connection error: {message}");
                let _ = self.event_tx.send(ChatEvent::Error { message });
            }
            ConnectionEvent::MessageReceived { message, .. } => {
                self.handle_live_message(message).await;
            }
        }
    }

    /// Route one confirmed message from the live connection
    async fn handle_live_message(&self, message: Message) {
        let conversation_id = message.conversation_id;

        // The thread store applies its strict filter; its verdict also
        // decides whether the message counts as read
        let outcome = self.thread.write().await.ingest(message.clone());
        let counts_as_read = matches!(outcome, IngestOutcome::Applied(_));
        if counts_as_read {
            let _ = self
                .event_tx
                .send(ChatEvent::ThreadUpdated { conversation_id });
        }

        let touch = self
            .conversations
            .write()
            .await
            .touch(&message, counts_as_read);
        match touch {
            TouchOutcome::Updated => {
                let _ = self.event_tx.send(ChatEvent::ConversationsUpdated);
            }
            TouchOutcome::UnknownConversation => {
                // First sighting of a conversation started elsewhere: the
                // list reload brings it in
                info!(conversation_id, "message for unknown conversation, reloading list");
                if let Err(e) = self.refresh_conversations().await {
                    warn!("conversation reload failed: {e}");
                    let _ = self.event_tx.send(ChatEvent::Error {
                        message: e.user_message(),
                    });
                }
            }
        }
    }
}
