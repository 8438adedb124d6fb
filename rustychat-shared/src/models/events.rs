use serde::{Deserialize, Serialize};

use super::{Attachment, Message, MessageId, Reaction, Timestamp};

/// Partial update to an existing message.
///
/// `None` fields are left untouched when the patch is applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessagePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<Reaction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
}

impl MessagePatch {
    /// Copy the populated fields onto `message`.
    pub fn apply_to(&self, message: &mut Message) {
        if let Some(body) = &self.body {
            message.body.clone_from(body);
        }
        if let Some(edited_at) = &self.edited_at {
            message.edited_at = Some(edited_at.clone());
        }
        if let Some(deleted_at) = &self.deleted_at {
            message.deleted_at = Some(deleted_at.clone());
        }
        if let Some(reactions) = &self.reactions {
            message.reactions.clone_from(reactions);
        }
        if let Some(attachments) = &self.attachments {
            message.attachments.clone_from(attachments);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_none()
            && self.edited_at.is_none()
            && self.deleted_at.is_none()
            && self.reactions.is_none()
            && self.attachments.is_none()
    }
}

/// A push event on a stream topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Another client posted a message.
    NewMessage { message: Message },
    /// An existing message changed.
    MessageUpdated {
        id: MessageId,
        patch: MessagePatch,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_id: Option<MessageId>,
    },
    /// A message was removed.
    MessageDeleted {
        id: MessageId,
        #[serde(skip_serializing_if = "Option::is_none")]
        parent_id: Option<MessageId>,
    },
}

/// A [`StreamEvent`] together with its delivery id.
///
/// The transport may redeliver the same envelope after a reconnect; the
/// `event_id` is what the dedup window keys on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushEnvelope {
    pub event_id: String,
    #[serde(flatten)]
    pub event: StreamEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StreamKey, StreamType};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    #[test]
    fn events_use_snake_case_tags() {
        let event = StreamEvent::MessageDeleted {
            id: MessageId::from("m-1"),
            parent_id: None,
        };
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"type\":\"message_deleted\""));
    }

    #[test]
    fn envelope_flattens_the_event() {
        let event = StreamEvent::NewMessage {
            message: Message {
                id: MessageId::from("m-1"),
                stream: StreamKey::new(Uuid::new_v4(), StreamType::Channel, Uuid::new_v4()),
                parent_id: None,
                author_id: Uuid::new_v4(),
                body: "hi".into(),
                created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()),
                edited_at: None,
                deleted_at: None,
                reactions: Vec::new(),
                attachments: Vec::new(),
                thread_reply_count: 0,
                thread_last_reply_at: None,
                thread_participant_ids: Vec::new(),
                optimistic: false,
            },
        };
        let envelope = PushEnvelope {
            event_id: "evt-1".into(),
            event,
        };

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"event_id\":\"evt-1\""));
        assert!(json.contains("\"type\":\"new_message\""));

        let back: PushEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn patch_applies_only_populated_fields() {
        let mut message = Message {
            id: MessageId::from("m-1"),
            stream: StreamKey::new(Uuid::new_v4(), StreamType::Channel, Uuid::new_v4()),
            parent_id: None,
            author_id: Uuid::new_v4(),
            body: "original".into(),
            created_at: Timestamp(Utc.with_ymd_and_hms(2025, 3, 8, 14, 30, 0).unwrap()),
            edited_at: None,
            deleted_at: None,
            reactions: vec![Reaction {
                emoji: "wave".into(),
                user_ids: vec![Uuid::new_v4()],
            }],
            attachments: Vec::new(),
            thread_reply_count: 3,
            thread_last_reply_at: None,
            thread_participant_ids: Vec::new(),
            optimistic: false,
        };

        let patch = MessagePatch {
            body: Some("edited".into()),
            edited_at: Some(Timestamp(
                Utc.with_ymd_and_hms(2025, 3, 8, 14, 31, 0).unwrap(),
            )),
            ..MessagePatch::default()
        };
        patch.apply_to(&mut message);

        assert_eq!(message.body, "edited");
        assert!(message.edited_at.is_some());
        assert_eq!(message.reactions.len(), 1);
        assert_eq!(message.thread_reply_count, 3);
    }

    #[test]
    fn empty_patch_reports_empty() {
        assert!(MessagePatch::default().is_empty());
        assert!(
            !MessagePatch {
                body: Some("x".into()),
                ..MessagePatch::default()
            }
            .is_empty()
        );
    }
}
