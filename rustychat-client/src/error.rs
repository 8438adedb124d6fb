use shared::models::{ErrorResponse, StreamKey};
use thiserror::Error;

/// Result type alias for chat API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures from the chat API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server rejected the request ({status}): {body}")]
    Status { status: u16, body: ErrorResponse },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl ApiError {
    /// A rejection with just a status code and message, for tests and
    /// transports that have no structured body.
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: ErrorResponse::new(message),
        }
    }
}

/// Result type alias for coordinator operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failures surfaced by the coordinator's public methods.
///
/// Cache-internal anomalies (stale fetches, patches for unknown ids,
/// redelivered events) are absorbed with a log instead of appearing here; the
/// view staying available beats an error the caller cannot act on.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("stream {0} is not open")]
    StreamNotOpen(StreamKey),
    #[error("subscription to {topic} failed: {reason}")]
    Subscribe { topic: String, reason: String },
}
