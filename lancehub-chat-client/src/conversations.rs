//! Conversation Store
//!
//! Owns the ordered conversation list: last-message previews, unread
//! counts, and the descending activity order the list renders in. All
//! mutation goes through this store; replays and out-of-order deliveries
//! must leave it unchanged where they carry no new information.

use lancehub_chat_protocol::{Conversation, Message};
use tracing::debug;

/// Result of observing a message against the list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    /// The conversation's summary was brought up to date
    Updated,
    /// The message references a conversation not in the list; the caller
    /// answers with a full reload
    UnknownConversation,
}

/// Ordered list of conversation summaries
pub struct ConversationStore {
    local_user: i64,
    items: Vec<Conversation>,
    loaded: bool,
}

impl ConversationStore {
    pub fn new(local_user: i64) -> Self {
        Self {
            local_user,
            items: Vec::new(),
            loaded: false,
        }
    }

    /// Whether a list load has succeeded at least once
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replace the list with a freshly fetched snapshot
    pub fn replace(&mut self, conversations: Vec<Conversation>) {
        self.items = conversations;
        self.loaded = true;
        self.sort();
    }

    /// Conversation by id
    pub fn get(&self, conversation_id: i64) -> Option<&Conversation> {
        self.items.iter().find(|c| c.id == conversation_id)
    }

    /// Whether the list contains `conversation_id`
    pub fn contains(&self, conversation_id: i64) -> bool {
        self.get(conversation_id).is_some()
    }

    /// Id of the top conversation (most recent activity)
    pub fn first_id(&self) -> Option<i64> {
        self.items.first().map(|c| c.id)
    }

    /// Render-ready snapshot in display order
    pub fn snapshot(&self) -> Vec<Conversation> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Clear the unread badge; called when a conversation becomes active
    pub fn mark_read(&mut self, conversation_id: i64) {
        if let Some(conversation) = self.items.iter_mut().find(|c| c.id == conversation_id) {
            conversation.unread_count = 0;
        }
    }

    /// Observe a message for its conversation's summary
    ///
    /// The preview only moves forward: `last_message` is replaced when the
    /// message is strictly newer than the stored timestamp, so replays and
    /// out-of-order deliveries cannot roll it back. The unread count still
    /// reacts to older messages — thread-level dedup is what prevents double
    /// rendering, not this counter.
    pub fn touch(&mut self, message: &Message, counts_as_read: bool) -> TouchOutcome {
        let Some(conversation) = self
            .items
            .iter_mut()
            .find(|c| c.id == message.conversation_id)
        else {
            debug!(
                conversation_id = message.conversation_id,
                "touch for unknown conversation"
            );
            return TouchOutcome::UnknownConversation;
        };

        let newer = match conversation.last_message_at {
            None => true,
            Some(last) => message.created_at > last,
        };

        if !newer {
            if !counts_as_read && message.sender_id != self.local_user {
                conversation.unread_count += 1;
            }
            return TouchOutcome::Updated;
        }

        conversation.last_message_at = Some(message.created_at);
        conversation.last_message = Some(message.clone());
        if counts_as_read || message.sender_id == self.local_user {
            conversation.unread_count = 0;
        } else {
            conversation.unread_count += 1;
        }

        self.sort();
        TouchOutcome::Updated
    }

    /// Stable descending sort by last activity; untouched conversations
    /// (`None`) sink to the bottom, ties keep their relative order
    fn sort(&mut self) {
        self.items
            .sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    }
}
