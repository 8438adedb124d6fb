use async_trait::async_trait;
use shared::models::PushEnvelope;
use tokio::sync::mpsc;

use crate::error::ApiResult;

/// Lifecycle notifications from the push transport for one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportStatus {
    /// Dialing or re-dialing the stream endpoint.
    Connecting,
    /// The topic subscription is live.
    Subscribed,
    /// The server closed the stream normally.
    Closed,
    /// The stream went quiet past its deadline.
    TimedOut,
    /// The stream failed.
    Error(String),
}

/// One item delivered by a topic subscription.
#[derive(Debug, Clone)]
pub enum TransportSignal {
    Status(TransportStatus),
    Event(PushEnvelope),
}

/// Control surface for an active subscription.
pub trait TransportHandle: Send + Sync {
    /// Drop the current connection and redial.
    fn reconnect(&self);
    /// Tear the subscription down permanently.
    fn shutdown(&self);
}

/// An active subscription: a signal stream plus its control handle.
pub struct TransportSubscription {
    pub signals: mpsc::Receiver<TransportSignal>,
    pub handle: Box<dyn TransportHandle>,
}

impl std::fmt::Debug for TransportSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSubscription").finish()
    }
}

/// A push channel delivering at-least-once, possibly-duplicated,
/// possibly-out-of-order named events on per-stream topics.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Open a subscription for `topic`. Exactly one subscription per topic is
    /// the caller's responsibility; the transport just dials.
    async fn subscribe(&self, topic: String) -> ApiResult<TransportSubscription>;
}
