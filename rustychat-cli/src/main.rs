//! Main entry point for the RustyChat CLI.

use clap::{Parser, Subcommand};
use dotenv::dotenv;

mod commands;

/// RustyChat CLI
#[derive(Parser)]
#[command(name = "RustyChat CLI")]
#[command(about = "Command-line client for RustyChat streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for the RustyChat CLI
#[derive(Subcommand)]
enum Commands {
    /// Follow a stream, re-rendering the live view as it changes
    Follow(commands::chat::FollowArgs),

    /// Send a message (optionally a thread reply) and wait for confirmation
    Send(commands::chat::SendArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Follow(args) => commands::chat::handle_follow(args).await,
        Commands::Send(args) => commands::chat::handle_send(args).await,
    }
}
