//! Chat Wire Model
//!
//! JSON shapes exchanged with the LanceHub messaging backend, shared by the
//! REST surface and the live WebSocket connection.
//!
//! ## Shapes
//!
//! - [`Message`] — a confirmed, server-assigned message. The backend is the
//!   id and timestamp authority; clients never fabricate either.
//! - [`Conversation`] — a two-party (optionally project-scoped) channel
//!   summary: participants, last message, unread count.
//!
//! Some backend serializers emit numeric ids as strings and timestamps
//! without an explicit offset, so both fields deserialize tolerantly.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A confirmed chat message
///
/// # Examples
///
/// ```
/// use lancehub_chat_protocol::Message;
///
/// let json = r#"{
///     "id": 501,
///     "conversation_id": 42,
///     "sender_id": 7,
///     "content": "Hello",
///     "attachments": [],
///     "created_at": "2024-01-01T00:00:00Z"
/// }"#;
/// let message: Message = serde_json::from_str(json).unwrap();
/// assert_eq!(message.id, 501);
/// assert_eq!(message.conversation_id, 42);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Server-assigned message id, unique per conversation
    ///
    /// Note: some clients serialize this as a string
    #[serde(deserialize_with = "deserialize_id")]
    pub id: i64,

    /// Conversation this message belongs to
    pub conversation_id: i64,

    /// Sending user id
    pub sender_id: i64,

    /// Message text
    pub content: String,

    /// Attachment URLs, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<String>,

    /// Whether the recipient has read this message
    #[serde(default)]
    pub is_read: bool,

    /// Server-assigned creation timestamp
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// A conversation summary as returned by the conversation list endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// Conversation id
    pub id: i64,

    /// Project this conversation is scoped to, if any
    #[serde(default)]
    pub project_id: Option<i64>,

    /// First participant (the user who started the conversation)
    pub participant1_id: i64,

    /// Second participant
    pub participant2_id: i64,

    /// Timestamp of the newest message, `None` for an empty conversation
    #[serde(default, with = "timestamp::option")]
    pub last_message_at: Option<DateTime<Utc>>,

    /// When the conversation was created
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,

    /// Messages not yet read by the local user
    #[serde(default)]
    pub unread_count: u32,

    /// The newest message, used for list previews
    #[serde(default)]
    pub last_message: Option<Message>,
}

impl Conversation {
    /// The other participant from the perspective of `user_id`
    ///
    /// # Examples
    ///
    /// ```
    /// # use lancehub_chat_protocol::Conversation;
    /// # use chrono::Utc;
    /// let conversation = Conversation {
    ///     id: 1,
    ///     project_id: None,
    ///     participant1_id: 7,
    ///     participant2_id: 12,
    ///     last_message_at: None,
    ///     created_at: Utc::now(),
    ///     unread_count: 0,
    ///     last_message: None,
    /// };
    /// assert_eq!(conversation.counterpart_of(7), 12);
    /// assert_eq!(conversation.counterpart_of(12), 7);
    /// ```
    pub fn counterpart_of(&self, user_id: i64) -> i64 {
        if self.participant1_id == user_id {
            self.participant2_id
        } else {
            self.participant1_id
        }
    }

    /// Whether `user_id` is one of the two participants
    pub fn involves(&self, user_id: i64) -> bool {
        self.participant1_id == user_id || self.participant2_id == user_id
    }
}

/// Deserialize an id that may arrive as a number or a numeric string
fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::custom("invalid number for id")),
        Value::String(s) => s
            .parse::<i64>()
            .map_err(|_| Error::custom("invalid string for id")),
        _ => Err(Error::custom("id must be a number or string")),
    }
}

/// Tolerant timestamp (de)serialization
///
/// The backend emits ISO-8601; depending on the serializer the offset may be
/// present (`2024-01-01T00:00:00+00:00`, `...Z`) or absent (naive UTC).
/// Serialization always produces RFC 3339 with `Z`.
pub(crate) mod timestamp {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn parse(value: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(dt.with_timezone(&Utc));
        }
        // Naive timestamps are treated as UTC
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub(crate) mod option {
        use super::*;

        pub fn serialize<S>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> std::result::Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(dt) => super::serialize(dt, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(
            deserializer: D,
        ) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            use serde::de::Error;
            let raw = Option::<String>::deserialize(deserializer)?;
            match raw {
                None => Ok(None),
                Some(s) => super::parse(&s)
                    .map(Some)
                    .ok_or_else(|| Error::custom(format!("invalid timestamp: {s}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_json() -> &'static str {
        r#"{
            "id": 900,
            "conversation_id": 9,
            "sender_id": 3,
            "content": "Hi",
            "attachments": [],
            "is_read": false,
            "created_at": "2024-01-01T10:00:00+00:00"
        }"#
    }

    #[test]
    fn test_message_deserialization() {
        let message: Message = serde_json::from_str(message_json()).unwrap();
        assert_eq!(message.id, 900);
        assert_eq!(message.conversation_id, 9);
        assert_eq!(message.sender_id, 3);
        assert_eq!(message.content, "Hi");
        assert!(!message.is_read);
    }

    #[test]
    fn test_message_id_as_string() {
        let json = r#"{
            "id": "900",
            "conversation_id": 9,
            "sender_id": 3,
            "content": "Hi",
            "created_at": "2024-01-01T10:00:00Z"
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.id, 900);
    }

    #[test]
    fn test_message_naive_timestamp() {
        let json = r#"{
            "id": 1,
            "conversation_id": 2,
            "sender_id": 3,
            "content": "x",
            "created_at": "2024-06-05T08:30:00.123456"
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.created_at.timestamp(), 1_717_576_200);
    }

    #[test]
    fn test_message_missing_optional_fields() {
        // attachments/is_read absent on live frames from older backends
        let json = r#"{
            "id": 5,
            "conversation_id": 2,
            "sender_id": 3,
            "content": "x",
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert!(message.attachments.is_empty());
        assert!(!message.is_read);
    }

    #[test]
    fn test_message_roundtrip() {
        let original: Message = serde_json::from_str(message_json()).unwrap();
        let encoded = serde_json::to_string(&original).unwrap();
        let parsed: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_conversation_deserialization() {
        let json = r#"{
            "id": 42,
            "project_id": 11,
            "participant1_id": 7,
            "participant2_id": 12,
            "last_message_at": "2024-01-02T00:00:00Z",
            "created_at": "2024-01-01T00:00:00Z",
            "unread_count": 3,
            "last_message": {
                "id": 501,
                "conversation_id": 42,
                "sender_id": 12,
                "content": "ping",
                "created_at": "2024-01-02T00:00:00Z"
            }
        }"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conversation.id, 42);
        assert_eq!(conversation.project_id, Some(11));
        assert_eq!(conversation.unread_count, 3);
        assert_eq!(conversation.last_message.as_ref().unwrap().id, 501);
    }

    #[test]
    fn test_conversation_empty() {
        // Fresh conversation: no messages yet, nullable fields null or absent
        let json = r#"{
            "id": 1,
            "project_id": null,
            "participant1_id": 7,
            "participant2_id": 12,
            "last_message_at": null,
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert!(conversation.last_message_at.is_none());
        assert!(conversation.last_message.is_none());
        assert_eq!(conversation.unread_count, 0);
    }

    #[test]
    fn test_counterpart() {
        let json = r#"{
            "id": 1,
            "participant1_id": 7,
            "participant2_id": 12,
            "created_at": "2024-01-01T00:00:00Z"
        }"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();
        assert_eq!(conversation.counterpart_of(7), 12);
        assert_eq!(conversation.counterpart_of(12), 7);
        assert!(conversation.involves(7));
        assert!(!conversation.involves(8));
    }
}
