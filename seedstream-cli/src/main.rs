//! Seedstream CLI - Command-line interface
//!
//! Runs the streaming server and exposes search and cleanup for scripting.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use seedstream_core::SeedstreamConfig;
use seedstream_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "seedstream")]
#[command(about = "Stream torrents from a private tracker over HTTP")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: commands::Commands,

    /// Console log level (RUST_LOG overrides)
    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    /// Directory for the trace log files (defaults under the data directory)
    #[arg(long)]
    logs_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = SeedstreamConfig::from_env();
    if let Some(logs_dir) = cli.logs_dir {
        config.logging.logs_dir = logs_dir;
    }
    init_tracing(
        cli.log_level.as_tracing_level(),
        &config.logging,
        cli.command.name(),
    )
    .context("failed to initialize tracing")?;

    commands::handle_command(cli.command, config).await
}
