//! CLI command implementations

use anyhow::Context;
use clap::Subcommand;
use seedstream_core::SeedstreamConfig;
use seedstream_search::SourceAggregator;
use seedstream_web::AppState;
use seedstream_web::handlers::streams::{EpisodeQuery, format_size, parse_stream_request};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the streaming server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Base URL clients use to reach this server
        #[arg(long)]
        public_url: Option<String>,
    },
    /// Search the tracker and print ranked candidates
    Search {
        /// Media type (movie or series)
        media_type: String,
        /// IMDb id, e.g. tt0111161
        imdb_id: String,
        /// Season number for series
        #[arg(short, long)]
        season: Option<u32>,
        /// Episode number for series
        #[arg(short, long)]
        episode: Option<u32>,
    },
    /// Delete loaded torrents the tracker no longer needs seeded
    Cleanup,
}

impl Commands {
    /// Subcommand name, used to name its trace log file.
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Serve { .. } => "serve",
            Commands::Search { .. } => "search",
            Commands::Cleanup => "cleanup",
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns the configuration, startup or upstream error of the command
pub async fn handle_command(command: Commands, mut config: SeedstreamConfig) -> anyhow::Result<()> {

    match command {
        Commands::Serve {
            host,
            port,
            public_url,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(public_url) = public_url {
                config.server.public_url = public_url.trim_end_matches('/').to_string();
            }
            serve(config).await
        }
        Commands::Search {
            media_type,
            imdb_id,
            season,
            episode,
        } => search(config, &media_type, &imdb_id, EpisodeQuery { season, episode }).await,
        Commands::Cleanup => cleanup(config).await,
    }
}

async fn serve(config: SeedstreamConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    seedstream_web::run_server(config)
        .await
        .context("server failed")
}

async fn search(
    config: SeedstreamConfig,
    media_type: &str,
    imdb_id: &str,
    query: EpisodeQuery,
) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    let request = parse_stream_request(media_type, imdb_id, &query)?;
    let aggregator = SourceAggregator::from_config(&config)?;

    let candidates = aggregator
        .find(&request)
        .await
        .with_context(|| format!("search for {} failed", request.imdb_id))?;

    if candidates.is_empty() {
        println!("No streams found for {}", request.imdb_id);
        return Ok(());
    }

    for (rank, candidate) in candidates.iter().enumerate() {
        let file = candidate.selected_file();
        println!(
            "{:>2}. [{:>4} seeders]{} {}",
            rank + 1,
            candidate.seeders,
            if candidate.is_speculative { " (speculative)" } else { "" },
            candidate.title
        );
        println!(
            "    {} {} ({})",
            candidate.info_hash,
            file.map(|f| f.path.as_str()).unwrap_or("?"),
            file.map(|f| format_size(f.length)).unwrap_or_default()
        );
    }
    Ok(())
}

async fn cleanup(config: SeedstreamConfig) -> anyhow::Result<()> {
    config.validate().context("invalid configuration")?;
    let state = AppState::from_config(config).await?;

    let deleted = state
        .store
        .delete_unnecessary(&*state.aggregator)
        .await
        .context("cleanup failed")?;
    for info_hash in &deleted {
        println!("Deleted {info_hash}");
    }
    println!("{} torrents removed, {} remain", deleted.len(), state.store.len());

    state.store.shutdown().await?;
    Ok(())
}
