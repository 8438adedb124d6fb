//! reqwest-backed implementations of the [`ChatApi`] and [`PushTransport`]
//! contracts: a JSON HTTP client with a cookie jar for the session, and an
//! SSE reader that turns `event:`/`data:`/`id:` frames into transport
//! signals, resuming with `Last-Event-ID` across reconnects.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, cookie::Jar, header};
use serde_json::from_str;
use shared::config::SseConfig;
use shared::models::{
    DeleteMessageRequest, EditMessageRequest, ErrorResponse, Message, MessageId, Page,
    PushEnvelope, SendMessageRequest, StreamEvent, StreamKey,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::api::ChatApi;
use crate::error::{ApiError, ApiResult};
use crate::transport::{
    PushTransport, TransportHandle, TransportSignal, TransportStatus, TransportSubscription,
};

/// HTTP chat API client.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    api_base: Url,
}

impl HttpChatApi {
    /// Build a client rooted at `base` (e.g. `http://localhost:8080`).
    pub fn new(base: &Url) -> ApiResult<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar)
            .timeout(Duration::from_secs(30))
            .build()?;
        let api_base = base
            .join("api/")
            .map_err(|err| ApiError::Endpoint(err.to_string()))?;
        Ok(Self { client, api_base })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.api_base
            .join(path)
            .map_err(|err| ApiError::Endpoint(err.to_string()))
    }

    fn messages_endpoint(&self, stream: &StreamKey) -> ApiResult<Url> {
        self.endpoint(&format!("streams/{}/messages", stream.topic()))
    }

    fn message_endpoint(&self, stream: &StreamKey, id: &MessageId) -> ApiResult<Url> {
        self.endpoint(&format!("streams/{}/messages/{id}", stream.topic()))
    }
}

async fn ok_or_status(response: reqwest::Response) -> ApiResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.json::<ErrorResponse>().await.unwrap_or_else(|_| {
        ErrorResponse::new(status.canonical_reason().unwrap_or("request rejected"))
    });
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|err| ApiError::Decode(err.to_string()))
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_page(&self, stream: StreamKey, cursor: Option<String>) -> ApiResult<Page> {
        let mut request = self.client.get(self.messages_endpoint(&stream)?);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        let response = ok_or_status(request.send().await?).await?;
        decode(response).await
    }

    async fn submit_create(
        &self,
        stream: StreamKey,
        request: SendMessageRequest,
    ) -> ApiResult<Message> {
        let response = self
            .client
            .post(self.messages_endpoint(&stream)?)
            .json(&request)
            .send()
            .await?;
        decode(ok_or_status(response).await?).await
    }

    async fn submit_update(
        &self,
        stream: StreamKey,
        id: MessageId,
        request: EditMessageRequest,
    ) -> ApiResult<Message> {
        let response = self
            .client
            .patch(self.message_endpoint(&stream, &id)?)
            .json(&request)
            .send()
            .await?;
        decode(ok_or_status(response).await?).await
    }

    async fn submit_delete(
        &self,
        stream: StreamKey,
        id: MessageId,
        request: DeleteMessageRequest,
    ) -> ApiResult<()> {
        let response = self
            .client
            .delete(self.message_endpoint(&stream, &id)?)
            .json(&request)
            .send()
            .await?;
        ok_or_status(response).await?;
        Ok(())
    }
}

/// SSE-based push transport.
#[derive(Debug, Clone)]
pub struct SseTransport {
    client: Client,
    base: Url,
    config: SseConfig,
}

enum SseCommand {
    Reconnect,
    Shutdown,
}

struct SseHandle {
    commands: mpsc::UnboundedSender<SseCommand>,
}

impl TransportHandle for SseHandle {
    fn reconnect(&self) {
        let _ = self.commands.send(SseCommand::Reconnect);
    }

    fn shutdown(&self) {
        let _ = self.commands.send(SseCommand::Shutdown);
    }
}

impl SseTransport {
    /// Build a transport rooted at `base`. The underlying client carries no
    /// overall timeout; streams are long-lived by design.
    pub fn new(base: &Url, config: SseConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base: base.clone(),
            config,
        })
    }
}

#[async_trait]
impl PushTransport for SseTransport {
    async fn subscribe(&self, topic: String) -> ApiResult<TransportSubscription> {
        let url = self
            .base
            .join(&format!("api/stream/{topic}"))
            .map_err(|err| ApiError::Endpoint(err.to_string()))?;

        let (signal_tx, signal_rx) = mpsc::channel(256);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_sse(
            self.client.clone(),
            url,
            self.config.clone(),
            signal_tx,
            command_rx,
        ));

        Ok(TransportSubscription {
            signals: signal_rx,
            handle: Box::new(SseHandle {
                commands: command_tx,
            }),
        })
    }
}

/// Dial the stream endpoint, parse SSE frames, redial on failure.
async fn run_sse(
    client: Client,
    url: Url,
    config: SseConfig,
    signals: mpsc::Sender<TransportSignal>,
    mut commands: mpsc::UnboundedReceiver<SseCommand>,
) {
    let mut last_event_id: Option<String> = None;

    'dial: loop {
        if signals
            .send(TransportSignal::Status(TransportStatus::Connecting))
            .await
            .is_err()
        {
            return;
        }

        let mut request = client
            .get(url.clone())
            .header(header::ACCEPT, "text/event-stream");
        if let Some(id) = &last_event_id {
            request = request.header("Last-Event-ID", id.clone());
        }

        let connect = timeout(
            Duration::from_secs(config.connect_timeout_seconds),
            request.send(),
        )
        .await;
        let response = match connect {
            Err(_) => {
                let _ = signals
                    .send(TransportSignal::Status(TransportStatus::TimedOut))
                    .await;
                if !backoff(&config, &signals, &mut commands).await {
                    return;
                }
                continue 'dial;
            }
            Ok(Err(err)) => {
                let _ = signals
                    .send(TransportSignal::Status(TransportStatus::Error(
                        err.to_string(),
                    )))
                    .await;
                if !backoff(&config, &signals, &mut commands).await {
                    return;
                }
                continue 'dial;
            }
            Ok(Ok(response)) if !response.status().is_success() => {
                let _ = signals
                    .send(TransportSignal::Status(TransportStatus::Error(format!(
                        "stream rejected: {}",
                        response.status()
                    ))))
                    .await;
                if !backoff(&config, &signals, &mut commands).await {
                    return;
                }
                continue 'dial;
            }
            Ok(Ok(response)) => response,
        };

        if signals
            .send(TransportSignal::Status(TransportStatus::Subscribed))
            .await
            .is_err()
        {
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut event_name: Option<String> = None;
        let mut data = String::new();
        let mut current_id: Option<String> = None;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(SseCommand::Reconnect) => continue 'dial,
                    Some(SseCommand::Shutdown) | None => {
                        let _ = signals
                            .send(TransportSignal::Status(TransportStatus::Closed))
                            .await;
                        return;
                    }
                },
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line = buffer[..pos].trim_end_matches('\r').to_string();
                            buffer.drain(..=pos);

                            if let Some(value) = line.strip_prefix("event:") {
                                event_name = Some(value.trim().to_string());
                            } else if let Some(value) = line.strip_prefix("data:") {
                                data.push_str(value.trim());
                            } else if let Some(value) = line.strip_prefix("id:") {
                                current_id = Some(value.trim().to_string());
                            } else if line.is_empty() {
                                if !data.is_empty() && data != "[DONE]" {
                                    forward_frame(
                                        &signals,
                                        event_name.as_deref(),
                                        &data,
                                        current_id.clone(),
                                    )
                                    .await;
                                }
                                if let Some(id) = current_id.take() {
                                    last_event_id = Some(id);
                                }
                                event_name = None;
                                data.clear();
                            }
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "stream chunk error");
                        let _ = signals
                            .send(TransportSignal::Status(TransportStatus::Error(
                                err.to_string(),
                            )))
                            .await;
                        break;
                    }
                    None => {
                        // Normal end of stream. Without a resume point there is
                        // nothing to pick back up; stay closed.
                        if last_event_id.is_none() {
                            let _ = signals
                                .send(TransportSignal::Status(TransportStatus::Closed))
                                .await;
                            return;
                        }
                        break;
                    }
                },
            }
        }

        if !backoff(&config, &signals, &mut commands).await {
            return;
        }
    }
}

/// Sleep before redialing; false means a shutdown arrived instead.
async fn backoff(
    config: &SseConfig,
    signals: &mpsc::Sender<TransportSignal>,
    commands: &mut mpsc::UnboundedReceiver<SseCommand>,
) -> bool {
    tokio::select! {
        command = commands.recv() => match command {
            Some(SseCommand::Reconnect) => true,
            Some(SseCommand::Shutdown) | None => {
                let _ = signals
                    .send(TransportSignal::Status(TransportStatus::Closed))
                    .await;
                false
            }
        },
        () = tokio::time::sleep(Duration::from_millis(config.reconnect_backoff_ms)) => true,
    }
}

/// Decode one SSE frame into a push envelope and forward it.
async fn forward_frame(
    signals: &mpsc::Sender<TransportSignal>,
    event_name: Option<&str>,
    data: &str,
    frame_id: Option<String>,
) {
    match from_str::<StreamEvent>(data) {
        Ok(event) => {
            // The SSE id line doubles as the dedup key; a frame without one
            // gets a fresh id and no redelivery protection.
            let event_id = frame_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            let envelope = PushEnvelope { event_id, event };
            let _ = signals.send(TransportSignal::Event(envelope)).await;
        }
        Err(err) => {
            debug!(
                event = event_name.unwrap_or("<unnamed>"),
                error = %err,
                "unparseable stream payload"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_endpoints_nest_under_the_base() {
        let base = Url::parse("http://localhost:8080").unwrap();
        let api = HttpChatApi::new(&base).unwrap();
        let stream = StreamKey::new(
            Uuid::parse_str("f47ac10b-58cc-4372-a567-0e02b2c3d479").unwrap(),
            shared::models::StreamType::Channel,
            Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap(),
        );

        let url = api.messages_endpoint(&stream).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/streams/f47ac10b-58cc-4372-a567-0e02b2c3d479/channel/6ba7b810-9dad-11d1-80b4-00c04fd430c8/messages"
        );

        let url = api
            .message_endpoint(&stream, &MessageId::from("m-42"))
            .unwrap();
        assert!(url.as_str().ends_with("/messages/m-42"));
    }

    #[tokio::test]
    async fn frames_without_payload_are_not_forwarded() {
        let (tx, mut rx) = mpsc::channel(8);
        forward_frame(&tx, Some("new_message"), "not json", None).await;
        drop(tx);

        assert!(rx.recv().await.is_none());
    }
}
