pub mod chat;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use client::{HttpChatApi, SseTransport, StreamCoordinator};
use shared::config::ClientConfig;
use shared::models::{StreamKey, StreamType};
use uuid::Uuid;

pub(crate) fn load_config(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config = ClientConfig::load(path).context("failed to load configuration")?;
    init_tracing(&config);
    Ok(config)
}

fn init_tracing(config: &ClientConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn build_coordinator(config: &ClientConfig, user: Uuid) -> Result<StreamCoordinator> {
    let api = HttpChatApi::new(&config.api_base).context("failed to build API client")?;
    let transport = SseTransport::new(&config.api_base, config.sse.clone())
        .context("failed to build stream transport")?;
    Ok(StreamCoordinator::new(
        Arc::new(api),
        Arc::new(transport),
        user,
        config.cache.clone(),
    ))
}

pub(crate) fn parse_stream_key(workspace: Uuid, kind: &str, stream: Uuid) -> Result<StreamKey> {
    let kind = StreamType::from_str(kind)
        .map_err(|_| anyhow::anyhow!("invalid stream kind: {kind} (expected channel, conversation, or agent_conversation)"))?;
    Ok(StreamKey::new(workspace, kind, stream))
}
