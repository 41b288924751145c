//! Client error type
//!
//! [`ClientError`] covers the REST surface, the live connection (via
//! [`ProtocolError`]), and the client's own failure modes. The only fatal
//! variant is `Unauthenticated` — everything else leaves in-memory state
//! intact and can be retried by the user.

use lancehub_chat_protocol::ProtocolError;
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur in the chat client
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP transport failure (DNS, connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend rejected the request
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Bearer credential missing or rejected — fatal for the session
    #[error("Not authenticated")]
    Unauthenticated,

    /// Live connection error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Operation needs an active conversation and none is selected
    #[error("No active conversation")]
    NoActiveConversation,

    /// A message could not be sent; the optimistic entry was rolled back
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Configuration file missing a required value or unparseable
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Whether this error ends the session (user must re-authenticate)
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Unauthenticated)
    }

    /// Get a user-friendly error message suitable for display in UI
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Unauthenticated => {
                "Your session has expired. Please sign in again.".to_string()
            }
            ClientError::Http(e) => {
                format!("Could not reach the server: {}.", e)
            }
            ClientError::Api { status, .. } => {
                format!("The server rejected the request (status {}).", status)
            }
            ClientError::Protocol(e) => e.user_message(),
            ClientError::NoActiveConversation => {
                "Select a conversation before sending a message.".to_string()
            }
            ClientError::SendFailed(msg) => {
                format!("Message not sent: {}", msg)
            }
            ClientError::Configuration(msg) => {
                format!("Configuration error: {}.", msg)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ClientError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        };
        assert_eq!(error.to_string(), "API error (502): bad gateway");

        let error = ClientError::NoActiveConversation;
        assert_eq!(error.to_string(), "No active conversation");
    }

    #[test]
    fn test_only_unauthenticated_is_fatal() {
        assert!(ClientError::Unauthenticated.is_fatal());
        assert!(!ClientError::NoActiveConversation.is_fatal());
        assert!(!ClientError::SendFailed("x".to_string()).is_fatal());
    }

    #[test]
    fn test_protocol_error_conversion() {
        let protocol = ProtocolError::NotConnected("link down".to_string());
        let error: ClientError = protocol.into();
        assert!(matches!(error, ClientError::Protocol(_)));
        assert!(!error.is_fatal());
    }
}
