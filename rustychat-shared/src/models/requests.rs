use serde::{Deserialize, Serialize};

use super::{Attachment, MessageDraft, MessageId, Reaction};

/// Request body for posting a new message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl From<MessageDraft> for SendMessageRequest {
    fn from(draft: MessageDraft) -> Self {
        Self {
            body: draft.body,
            parent_id: draft.parent_id,
            attachments: draft.attachments,
        }
    }
}

/// Request body for editing an existing message.
///
/// All fields optional; the server applies what is present. Reaction toggles
/// ride through here as a full replacement of the reaction list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EditMessageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<Reaction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Request body for deleting a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteMessageRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
