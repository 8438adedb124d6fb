use async_trait::async_trait;
use shared::models::{
    DeleteMessageRequest, EditMessageRequest, Message, MessageId, Page, SendMessageRequest,
    StreamKey,
};

use crate::error::ApiResult;

/// The chat server's HTTP surface, as the cache consumes it.
///
/// Implementations must be cheap to share behind an `Arc`; the coordinator
/// calls them from spawned tasks.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Fetch one page of history. `cursor` of `None` means the newest window.
    async fn fetch_page(&self, stream: StreamKey, cursor: Option<String>) -> ApiResult<Page>;

    /// Post a new message; returns the server-confirmed row.
    async fn submit_create(
        &self,
        stream: StreamKey,
        request: SendMessageRequest,
    ) -> ApiResult<Message>;

    /// Edit an existing message; returns the server-confirmed row.
    async fn submit_update(
        &self,
        stream: StreamKey,
        id: MessageId,
        request: EditMessageRequest,
    ) -> ApiResult<Message>;

    /// Delete a message.
    async fn submit_delete(
        &self,
        stream: StreamKey,
        id: MessageId,
        request: DeleteMessageRequest,
    ) -> ApiResult<()>;
}
