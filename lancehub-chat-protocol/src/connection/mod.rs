//! Live Connection Management
//!
//! One WebSocket per open conversation, owned by [`ConnectionManager`].
//! Consumers receive [`ConnectionEvent`]s over a channel; they never touch
//! the socket directly.

mod events;
mod manager;

pub use events::ConnectionEvent;
pub use manager::{ActiveConversation, ConnectionConfig, ConnectionManager, LinkState};
