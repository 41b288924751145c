//! LanceHub Chat Client
//!
//! Client-side state management for LanceHub's real-time conversations:
//! the conversation list, the active message thread with optimistic sends,
//! participant resolution, and the controller that keeps them consistent
//! under concurrent live events, reloads, and conversation switches.
//!
//! ## Data flow
//!
//! ```text
//! user action → ChatController → store mutation (+ optimistic insert)
//!             → ConnectionManager send → backend
//! live event  → ConnectionManager → reconciliation → store update
//!             → ChatEvent → presentation layer
//! ```
//!
//! The presentation layer drives everything through [`ChatController`] and
//! renders from its snapshots.

pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod conversations;
pub mod participants;
pub mod reconcile;
pub mod thread;

mod error;

pub use api::{ChatApi, RestChatApi};
pub use auth::{AuthProvider, StaticAuth};
pub use config::ClientConfig;
pub use controller::{ChatController, ChatEvent};
pub use conversations::{ConversationStore, TouchOutcome};
pub use error::{ClientError, Result};
pub use participants::{Participant, ParticipantCache};
pub use reconcile::{Reconciliation, PENDING_MERGE_WINDOW_MS};
pub use thread::{IngestOutcome, MessageRef, MessageThreadStore, ThreadMessage};
