use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{StreamKey, Timestamp};

/// Prefix that marks a locally generated placeholder id.
pub const PLACEHOLDER_PREFIX: &str = "tmp-";

/// Identifier of a message.
///
/// Server-issued ids are opaque strings. Placeholder ids are generated locally
/// for optimistic sends as `tmp-<uuidv7>`: prefix-detectable, globally unique
/// across the process lifetime (and stream reopens), and time-ordered so that
/// lexicographic comparison between placeholders follows creation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    /// A fresh placeholder id for an optimistic mutation.
    #[must_use]
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::now_v7()))
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One emoji reaction with the users who applied it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub user_ids: Vec<Uuid>,
}

/// File attached to a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub id: Uuid,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub url: String,
}

/// A single message in a stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,

    /// The stream this message belongs to.
    pub stream: StreamKey,

    /// Parent message id when this message is a thread reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,

    pub author_id: Uuid,

    pub body: String,

    pub created_at: Timestamp,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,

    #[serde(default)]
    pub reactions: Vec<Reaction>,

    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Number of replies in this message's thread.
    #[serde(default)]
    pub thread_reply_count: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_last_reply_at: Option<Timestamp>,

    #[serde(default)]
    pub thread_participant_ids: Vec<Uuid>,

    /// True while this row is a local placeholder pending server confirmation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optimistic: bool,
}

/// What the user typed, before it becomes a message.
///
/// Handed back verbatim when an optimistic send fails so the caller can
/// re-open the composer with the original content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDraft {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl MessageDraft {
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            parent_id: None,
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn reply(body: impl Into<String>, parent_id: MessageId) -> Self {
        Self {
            body: body.into(),
            parent_id: Some(parent_id),
            attachments: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StreamType;
    use chrono::{TimeZone, Utc};

    fn message(id: &str) -> Message {
        Message {
            id: MessageId::from(id),
            stream: StreamKey::new(Uuid::new_v4(), StreamType::Channel, Uuid::new_v4()),
            parent_id: None,
            author_id: Uuid::new_v4(),
            body: "Hello, world!".to_string(),
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()),
            edited_at: None,
            deleted_at: None,
            reactions: Vec::new(),
            attachments: Vec::new(),
            thread_reply_count: 0,
            thread_last_reply_at: None,
            thread_participant_ids: Vec::new(),
            optimistic: false,
        }
    }

    #[test]
    fn placeholder_ids_are_prefixed_and_unique() {
        let a = MessageId::placeholder();
        let b = MessageId::placeholder();

        assert!(a.is_placeholder());
        assert!(b.is_placeholder());
        assert_ne!(a, b);
        assert!(!MessageId::from("m-42").is_placeholder());
    }

    #[test]
    fn placeholder_ids_are_monotonic() {
        let earlier = MessageId::placeholder();
        let later = MessageId::placeholder();

        assert!(earlier < later);
    }

    #[test]
    fn message_serialization_round_trips() {
        let message = message("m-1");
        let serialized = serde_json::to_string(&message).unwrap();
        let deserialized: Message = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized, message);
    }

    #[test]
    fn optimistic_flag_is_not_serialized_when_clear() {
        let message = message("m-1");
        let json = serde_json::to_string(&message).unwrap();

        assert!(!json.contains("optimistic"));

        let mut optimistic = message;
        optimistic.optimistic = true;
        let json = serde_json::to_string(&optimistic).unwrap();
        assert!(json.contains("\"optimistic\":true"));
    }
}
