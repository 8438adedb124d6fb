use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of message stream a [`StreamKey`] addresses.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreamType {
    /// A named channel visible to the whole workspace.
    Channel,
    /// A direct or group conversation.
    Conversation,
    /// A conversation with an agent.
    AgentConversation,
}

/// Partition key for one message stream's cache.
///
/// Immutable once constructed; equality and hashing cover all three parts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StreamKey {
    pub workspace_id: Uuid,
    pub kind: StreamType,
    pub stream_id: Uuid,
}

impl StreamKey {
    #[must_use]
    pub const fn new(workspace_id: Uuid, kind: StreamType, stream_id: Uuid) -> Self {
        Self {
            workspace_id,
            kind,
            stream_id,
        }
    }

    /// The push-channel topic for this stream.
    #[must_use]
    pub fn topic(&self) -> String {
        format!("{}/{}/{}", self.workspace_id, self.kind, self.stream_id)
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.topic())
    }
}
