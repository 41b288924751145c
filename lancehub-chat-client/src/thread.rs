//! Message Thread Store
//!
//! Owns the ordered message list for the single active conversation,
//! merging optimistic (pending) entries with confirmed entries. The store
//! enforces the strict ingest filter: a message whose conversation id does
//! not match the active conversation is never inserted here — routing it to
//! the conversation list is the caller's job.

use crate::reconcile::{self, Reconciliation};
use chrono::{DateTime, Utc};
use lancehub_chat_protocol::Message;
use tracing::debug;
use uuid::Uuid;

/// Identity of a thread entry
///
/// A send starts life with a `Local` id and ends with the `Server` id the
/// backend assigned; an entry can never claim to be confirmed without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageRef {
    /// Locally generated, unique within this client session
    Local(Uuid),
    /// Server-assigned, stable
    Server(i64),
}

/// One renderable entry of the active thread
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadMessage {
    pub id: MessageRef,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ThreadMessage {
    /// Entry for a confirmed wire message
    pub fn confirmed(message: Message) -> Self {
        Self {
            id: MessageRef::Server(message.id),
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            attachments: message.attachments,
            created_at: message.created_at,
        }
    }

    /// Entry for an optimistic send awaiting confirmation
    pub(crate) fn pending(
        conversation_id: i64,
        sender_id: i64,
        content: String,
        attachments: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageRef::Local(Uuid::new_v4()),
            conversation_id,
            sender_id,
            content,
            attachments,
            created_at,
        }
    }

    /// Whether this entry still awaits backend confirmation
    pub fn is_pending(&self) -> bool {
        matches!(self.id, MessageRef::Local(_))
    }

    /// Server id, for confirmed entries
    pub fn server_id(&self) -> Option<i64> {
        match self.id {
            MessageRef::Server(id) => Some(id),
            MessageRef::Local(_) => None,
        }
    }
}

/// How an inbound confirmed message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Applied to the active thread
    Applied(Reconciliation),
    /// Belongs to another conversation (or none is active); not inserted
    OtherConversation,
}

/// Store for the active conversation's messages
pub struct MessageThreadStore {
    local_user: i64,
    active: Option<i64>,
    entries: Vec<ThreadMessage>,
}

impl MessageThreadStore {
    pub fn new(local_user: i64) -> Self {
        Self {
            local_user,
            active: None,
            entries: Vec::new(),
        }
    }

    /// Conversation the thread currently displays
    pub fn active_conversation(&self) -> Option<i64> {
        self.active
    }

    /// Switch the thread to `conversation_id`
    ///
    /// Confirmed entries are dropped (the reload brings them back); pending
    /// entries are kept only when they belong to the conversation being
    /// opened — reopening a conversation while a send is still in flight
    /// must not lose it.
    pub fn open(&mut self, conversation_id: i64) {
        self.active = Some(conversation_id);
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.is_pending() && entry.conversation_id == conversation_id);
        debug!(
            conversation_id,
            kept = self.entries.len(),
            dropped = before - self.entries.len(),
            "thread opened"
        );
    }

    /// Install a freshly fetched confirmed list
    ///
    /// Applies only while `conversation_id` is still the active conversation
    /// — a stale fetch for a previously open conversation is refused (and
    /// the caller drops it silently). Retained pending entries are folded
    /// back in, dropping any that the fetch already confirmed. Returns
    /// whether the thread changed.
    pub fn replace_confirmed(&mut self, conversation_id: i64, messages: Vec<Message>) -> bool {
        if self.active != Some(conversation_id) {
            debug!(
                conversation_id,
                active = ?self.active,
                "refusing stale thread snapshot"
            );
            return false;
        }

        let pending: Vec<ThreadMessage> = self
            .entries
            .drain(..)
            .filter(|entry| entry.is_pending())
            .collect();

        self.entries = messages
            .into_iter()
            .filter(|message| message.conversation_id == conversation_id)
            .map(ThreadMessage::confirmed)
            .collect();
        self.entries.sort_by_key(|entry| entry.created_at);

        for entry in pending {
            reconcile::absorb_pending(&mut self.entries, entry);
        }
        true
    }

    /// Create an optimistic entry for a send; `None` without an active
    /// conversation
    pub fn append_pending(&mut self, content: &str, attachments: Vec<String>) -> Option<MessageRef> {
        let conversation_id = self.active?;
        let entry = ThreadMessage::pending(
            conversation_id,
            self.local_user,
            content.to_string(),
            attachments,
            Utc::now(),
        );
        let reference = entry.id;
        self.entries.push(entry);
        Some(reference)
    }

    /// Remove an optimistic entry (send failure rollback)
    pub fn remove_pending(&mut self, reference: &MessageRef) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != *reference);
        before != self.entries.len()
    }

    /// Apply a confirmed message arriving from the live connection or a
    /// stale-checked reload
    ///
    /// The strict filter: a message for any conversation other than the
    /// active one is rejected here, whatever its origin.
    pub fn ingest(&mut self, message: Message) -> IngestOutcome {
        if self.active != Some(message.conversation_id) {
            debug!(
                message_conversation = message.conversation_id,
                active = ?self.active,
                "ingest refused: conversation mismatch"
            );
            return IngestOutcome::OtherConversation;
        }
        IngestOutcome::Applied(reconcile::reconcile(&mut self.entries, message))
    }

    /// Render-ready entries, ascending by creation time
    pub fn messages(&self) -> &[ThreadMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
