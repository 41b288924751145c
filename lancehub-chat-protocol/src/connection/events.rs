//! Connection Events
//!
//! Events emitted by the [`ConnectionManager`](super::ConnectionManager) to
//! notify about link state changes and inbound messages.

use crate::Message;

/// Events emitted over the connection manager's event channel
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The live connection for a conversation is established
    Connected { conversation_id: i64 },

    /// The live connection closed
    ///
    /// `will_retry` is set when the closure was abnormal and a single
    /// delayed reconnect attempt has been scheduled.
    Disconnected {
        conversation_id: i64,
        reason: Option<String>,
        will_retry: bool,
    },

    /// A message arrived on the live connection
    ///
    /// `conversation_id` is the conversation the link is bound to; the
    /// message's own `conversation_id` may differ (the backend fans out
    /// per-user events) and routing decisions belong to the consumer.
    MessageReceived {
        conversation_id: i64,
        message: Message,
    },

    /// A transport-level error occurred
    ///
    /// Errors do not themselves close the link; a subsequent close (or the
    /// stream ending) drives the state transition.
    ConnectionError {
        conversation_id: i64,
        message: String,
    },
}
