//! Tunebot - Main entry point.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tunebot::start_bot;
use tunebot_common::config::Config;
use tunebot_common::logging::init_logging_with_exclusions;

#[derive(Parser, Debug)]
#[command(name = "tunebot", version, about = "Telegram bot for searching and downloading tracks")]
struct Cli {
    /// Path to config.json (default: ~/.tunebot/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load_with_env(cli.config.as_deref())?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    tracing::info!("Tunebot v{}", env!("CARGO_PKG_VERSION"));

    start_bot(&config).await
}
