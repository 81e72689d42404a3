//! BluChat CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::info;

use bluchat_cli::{cli::Cli, commands::CommandDispatcher, config::ChatAppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = ChatAppConfig::load_with_overrides(
        cli.config.as_deref(),
        cli.backend.clone(),
        cli.bind.clone(),
        cli.verbose.then_some(true),
    )
    .context("Failed to load configuration")?;

    // Initialize logging
    setup_logging(config.cli.verbose);
    info!(
        "BluChat starting with {} backend on {}",
        config.backend.kind, config.backend.bind_address
    );

    CommandDispatcher::execute(cli, config)
        .await
        .context("Command execution failed")?;

    info!("BluChat exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
