//! Leadline sync CLI
//!
//! Operator tool for driving and inspecting the resumable sync-job
//! monitor: start a sync and watch it, show the tracked job, or clear
//! local state.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "leadline", about = "Leadline sync job client", version)]
struct Cli {
    /// Leadline API base URL
    #[arg(long, env = "LEADLINE_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a sync job and watch it to completion
    Sync,
    /// Show the tracked job; optionally resume watching it
    Status {
        /// Keep watching until the job reaches a terminal state
        #[arg(long)]
        watch: bool,
    },
    /// Clear locally tracked sync state
    Dismiss,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = leadline_sync::SyncConfig::from_env();
    if let Some(url) = cli.api_url {
        config.base_url = url;
    }

    match cli.command {
        Commands::Sync => commands::sync::run(config).await,
        Commands::Status { watch } => commands::status::run(config, watch).await,
        Commands::Dismiss => commands::dismiss::run(config),
    }
}
