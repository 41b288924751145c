//! LanceHub Chat Protocol
//!
//! Wire model and live connection management for the LanceHub real-time
//! conversation client.
//!
//! ## Architecture
//!
//! ```text
//! ConnectionManager (state machine, one socket)
//!   ├── writer task  ← LinkCommand channel ← send()
//!   └── reader task  → ConnectionEvent channel → consumer
//! ```
//!
//! The crate knows nothing about stores or rendering: it turns a
//! per-conversation WebSocket endpoint into a stream of typed
//! [`ConnectionEvent`]s and a [`ConnectionManager::send`] operation, with
//! the reconnect policy described in [`connection`].

pub mod connection;
pub mod frame;
pub mod model;

mod error;

pub use connection::{
    ActiveConversation, ConnectionConfig, ConnectionEvent, ConnectionManager, LinkState,
};
pub use error::{ProtocolError, Result};
pub use frame::{parse_live_message, SendFrame};
pub use model::{Conversation, Message};
