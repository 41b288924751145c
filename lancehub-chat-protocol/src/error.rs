//! Error handling for the LanceHub chat protocol
//!
//! All protocol operations return [`Result`], an alias over [`ProtocolError`].
//! Underlying library errors (I/O, JSON, WebSocket) convert automatically via
//! `thiserror`'s `#[from]`, so `?` propagates them without ceremony.

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur during protocol operations
///
/// # Examples
///
/// ```rust
/// use lancehub_chat_protocol::ProtocolError;
///
/// let error = ProtocolError::NotConnected("no live connection".to_string());
/// assert_eq!(error.to_string(), "Not connected: no live connection");
/// ```
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// I/O error (sockets, DNS, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket transport error
    ///
    /// Automatically converted from `tungstenite::Error`.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Inbound live frame that does not parse into a message
    ///
    /// Malformed frames are dropped and logged by the connection manager;
    /// this variant never crosses the manager boundary as a failure.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Operation requires a live connection bound to the active conversation
    ///
    /// Raised synchronously by `send` when the link is down or bound to a
    /// conversation that is no longer active. There is no send queue; the
    /// caller rolls back its optimistic state.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Connection attempt did not complete in time
    #[error("Connection timeout: {0}")]
    Timeout(String),

    /// Live endpoint URL could not be constructed
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ProtocolError {
    /// Check if this error is recoverable (transient fault that can be retried)
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lancehub_chat_protocol::ProtocolError;
    ///
    /// let error = ProtocolError::Timeout("connect".to_string());
    /// assert!(error.is_recoverable());
    ///
    /// let error = ProtocolError::InvalidEndpoint("not a url".to_string());
    /// assert!(!error.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::WebSocket(_)
                | ProtocolError::Timeout(_)
                | ProtocolError::NotConnected(_)
        )
    }

    /// Get a user-friendly error message suitable for display in UI
    pub fn user_message(&self) -> String {
        match self {
            ProtocolError::NotConnected(_) => {
                "Message could not be sent. The conversation is not connected; \
                 try reopening it."
                    .to_string()
            }
            ProtocolError::Timeout(msg) => {
                format!("Connection timed out: {}. Check your network.", msg)
            }
            ProtocolError::WebSocket(e) => {
                format!("Live connection error: {}.", e)
            }
            ProtocolError::InvalidFrame(msg) => {
                format!("Invalid data received: {}.", msg)
            }
            ProtocolError::InvalidEndpoint(msg) => {
                format!("Configuration error: {}.", msg)
            }
            ProtocolError::Io(e) => format!("I/O error: {}.", e),
            ProtocolError::Json(e) => format!("Data format error: {}.", e),
        }
    }
}
