//! Live Frame Codec
//!
//! Text frames exchanged over the per-conversation WebSocket. Inbound frames
//! are full [`Message`] objects broadcast by the backend; outbound frames
//! carry only the content (the backend assigns id and timestamp).

use crate::{Message, ProtocolError, Result};
use serde::{Deserialize, Serialize};

/// Outbound send frame
///
/// # Examples
///
/// ```
/// use lancehub_chat_protocol::SendFrame;
///
/// let frame = SendFrame::new("Hello");
/// let text = frame.to_text().unwrap();
/// assert_eq!(text, r#"{"content":"Hello"}"#);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendFrame {
    /// Message text
    pub content: String,

    /// Attachment URLs, omitted when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,
}

impl SendFrame {
    /// Create a text-only send frame
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach uploaded file URLs to the frame
    pub fn with_attachments(mut self, attachments: Vec<String>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Serialize the frame for transmission
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse an inbound live frame into a confirmed message
///
/// The connection manager drops (and logs) frames this rejects; a malformed
/// frame must never take the link down.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidFrame`] when the text is not a JSON
/// object of the expected shape.
pub fn parse_live_message(text: &str) -> Result<Message> {
    serde_json::from_str(text)
        .map_err(|e| ProtocolError::InvalidFrame(format!("failed to parse live frame: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_frame_text_only() {
        let frame = SendFrame::new("Hello");
        assert_eq!(frame.to_text().unwrap(), r#"{"content":"Hello"}"#);
    }

    #[test]
    fn test_send_frame_with_attachments() {
        let frame = SendFrame::new("see attached")
            .with_attachments(vec!["https://cdn.lancehub.dev/f/1.pdf".to_string()]);
        let text = frame.to_text().unwrap();
        assert!(text.contains("attachments"));
        assert!(text.contains("1.pdf"));
    }

    #[test]
    fn test_parse_live_message() {
        let text = r#"{
            "id": 501,
            "conversation_id": 42,
            "sender_id": 7,
            "content": "Hello",
            "attachments": [],
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let message = parse_live_message(text).unwrap();
        assert_eq!(message.id, 501);
        assert_eq!(message.conversation_id, 42);
        assert_eq!(message.content, "Hello");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_live_message("not json"),
            Err(ProtocolError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        // A frame without a conversation id cannot be routed
        let text = r#"{"id": 1, "content": "x"}"#;
        assert!(matches!(
            parse_live_message(text),
            Err(ProtocolError::InvalidFrame(_))
        ));
    }
}
