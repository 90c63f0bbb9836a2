//! Kindred CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Initialize config and data directories
//! - `chat`    — Interactive chat or single-message mode
//! - `status`  — Show configuration and relationship state

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "kindred",
    about = "Kindred — a persona-driven companion agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and data directories
    Onboard,

    /// Chat with the companion
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Conversation to resume (one relationship per conversation)
        #[arg(short, long, default_value = "default")]
        conversation: String,
    },

    /// Show configuration and relationship state
    Status {
        /// Conversation to inspect
        #[arg(short, long, default_value = "default")]
        conversation: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Chat {
            message,
            conversation,
        } => commands::chat::run(message, conversation).await?,
        Commands::Status { conversation } => commands::status::run(conversation).await?,
    }

    Ok(())
}
