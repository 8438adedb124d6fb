use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use client::{CacheUpdate, StreamCoordinator};
use colored::Colorize;
use shared::models::{Message, MessageDraft, MessageId, StreamKey};
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};
use uuid::Uuid;

use super::{build_coordinator, load_config, parse_stream_key};

#[derive(Args, Debug)]
#[command(about = "Follow a stream, re-rendering the live view as it changes")]
pub struct FollowArgs {
    /// Workspace identifier
    #[arg(long)]
    pub workspace: Uuid,

    /// Stream kind: channel, conversation, or agent_conversation
    #[arg(long, default_value = "channel")]
    pub kind: String,

    /// Stream identifier
    #[arg(long)]
    pub stream: Uuid,

    /// Acting user identifier (suppresses echoes of your own sends)
    #[arg(long)]
    pub user: Uuid,

    /// Rows of history to render (default 20)
    #[arg(long)]
    pub limit: Option<usize>,

    /// Path to the configuration file (optional)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(about = "Send a message and wait for the server to confirm it")]
pub struct SendArgs {
    /// Workspace identifier
    #[arg(long)]
    pub workspace: Uuid,

    /// Stream kind: channel, conversation, or agent_conversation
    #[arg(long, default_value = "channel")]
    pub kind: String,

    /// Stream identifier
    #[arg(long)]
    pub stream: Uuid,

    /// Acting user identifier
    #[arg(long)]
    pub user: Uuid,

    /// Message text
    #[arg()]
    pub text: String,

    /// Parent message id, to reply in a thread
    #[arg(long)]
    pub parent: Option<String>,

    /// Path to the configuration file (optional)
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

pub async fn handle_follow(args: FollowArgs) -> Result<()> {
    let config = load_config(args.config.clone())?;
    let key = parse_stream_key(args.workspace, &args.kind, args.stream)?;
    let coordinator = build_coordinator(&config, args.user)?;

    let mut updates = coordinator.subscribe_updates();
    let _handle = coordinator
        .open(key.clone())
        .await
        .context("failed to open stream")?;

    println!("Following {key}... (press Ctrl+C to stop)");
    let limit = args.limit.unwrap_or(20);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Ok(CacheUpdate::ViewChanged { stream }) if stream == key => {
                    render_view(&coordinator, &key, limit).await;
                }
                Ok(CacheUpdate::ConnectionChanged { stream, state }) if stream == key => {
                    eprintln!("{}", format!("[connection: {state}]").dimmed());
                }
                Ok(CacheUpdate::MutationFailed { reason, .. }) => {
                    eprintln!("{}", format!("[mutation failed: {reason}]").red());
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("{}", format!("[skipped {skipped} updates]").dimmed());
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    coordinator.close(&key).await;
    Ok(())
}

pub async fn handle_send(args: SendArgs) -> Result<()> {
    let config = load_config(args.config.clone())?;
    let key = parse_stream_key(args.workspace, &args.kind, args.stream)?;
    let coordinator = build_coordinator(&config, args.user)?;

    let mut updates = coordinator.subscribe_updates();
    let _handle = coordinator
        .open(key.clone())
        .await
        .context("failed to open stream")?;

    let draft = match args.parent {
        Some(parent) => MessageDraft::reply(args.text.clone(), MessageId(parent)),
        None => MessageDraft::text(args.text.clone()),
    };
    let placeholder_id = coordinator
        .send_message(&key, draft)
        .await
        .context("send rejected")?;

    let confirmation = wait_for_confirmation(&coordinator, &mut updates, &key, &placeholder_id);
    match timeout(Duration::from_secs(10), confirmation).await {
        Ok(Ok(())) => {
            println!("Message delivered.");
        }
        Ok(Err(reason)) => {
            coordinator.close(&key).await;
            bail!("send failed: {reason}");
        }
        Err(_) => {
            coordinator.close(&key).await;
            bail!("timed out waiting for confirmation");
        }
    }

    coordinator.close(&key).await;
    Ok(())
}

/// Resolves once the placeholder is gone from the view (replaced by the
/// confirmed row), or fails with the rejection reason.
async fn wait_for_confirmation(
    coordinator: &StreamCoordinator,
    updates: &mut broadcast::Receiver<CacheUpdate>,
    key: &StreamKey,
    placeholder_id: &MessageId,
) -> std::result::Result<(), String> {
    loop {
        match updates.recv().await {
            Ok(CacheUpdate::MutationFailed { target, reason, .. }) if &target == placeholder_id => {
                return Err(reason);
            }
            Ok(CacheUpdate::ViewChanged { stream }) if stream == *key => {
                let view = coordinator.view(key).await;
                if !view.iter().any(|m| &m.id == placeholder_id) {
                    return Ok(());
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                return Err("update channel closed".to_string());
            }
        }
    }
}

async fn render_view(coordinator: &StreamCoordinator, key: &StreamKey, limit: usize) {
    let view = coordinator.view(key).await;

    println!();
    // The view is newest-first; print oldest-first like a chat log.
    for message in view.iter().take(limit).rev() {
        println!("{}", format_row(message));
    }
}

fn format_row(message: &Message) -> String {
    let author = message.author_id.to_string();
    let author = author.get(..8).unwrap_or(&author).cyan();
    let timestamp = message.created_at.to_string().dimmed();

    if message.deleted_at.is_some() {
        return format!("{timestamp} {author} {}", "(deleted)".dimmed());
    }

    let mut row = format!("{timestamp} {author} {}", message.body);
    if message.optimistic {
        row.push_str(&format!(" {}", "(sending...)".dimmed()));
    }
    if message.thread_reply_count > 0 {
        row.push_str(&format!(
            " {}",
            format!("[{} replies]", message.thread_reply_count).yellow()
        ));
    }
    row
}
