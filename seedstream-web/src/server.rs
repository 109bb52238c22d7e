//! HTTP server for stream listing and playback
//!
//! Wires the torrent store, the source aggregator and the range negotiator
//! into an axum router and runs the periodic removable-torrent sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use seedstream_core::engine::spawn_transfer_engine;
use seedstream_core::{RangeNegotiator, SeedstreamConfig, StoreError, TorrentStore};
use seedstream_search::{SourceAggregator, SourceError};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, list_streams, play};

/// Errors that stop the server from starting or running.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Torrent store could not be opened or loaded.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Source clients could not be built.
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Listener address invalid or already in use.
    #[error("Failed to bind {address}: {reason}")]
    Bind {
        /// Address that was requested
        address: String,
        /// The underlying I/O error
        reason: String,
    },

    /// Serving failed after startup.
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Loaded torrents and their byte streams
    pub store: Arc<TorrentStore>,
    /// Candidate search and torrent fetching
    pub aggregator: Arc<SourceAggregator>,
    /// Range header negotiation
    pub negotiator: RangeNegotiator,
    /// Configuration the server was started with
    pub config: Arc<SeedstreamConfig>,
}

impl AppState {
    /// Assembles state from already-built components.
    pub fn new(
        store: Arc<TorrentStore>,
        aggregator: Arc<SourceAggregator>,
        config: SeedstreamConfig,
    ) -> Self {
        Self {
            store,
            aggregator,
            negotiator: RangeNegotiator::new(&config.streaming),
            config: Arc::new(config),
        }
    }

    /// Builds the local engine, store and aggregator and restores torrents
    /// from persisted state.
    ///
    /// # Errors
    ///
    /// - `ServerError::Store` - State could not be read
    /// - `ServerError::Source` - HTTP clients could not be built
    pub async fn from_config(config: SeedstreamConfig) -> Result<Self, ServerError> {
        let engine = Arc::new(spawn_transfer_engine());
        let store = Arc::new(TorrentStore::open(config.storage.clone(), engine).await?);

        store.load_all().await?;

        let aggregator = Arc::new(SourceAggregator::from_config(&config)?);
        Ok(Self::new(store, aggregator, config))
    }
}

/// Builds the router for the given state.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/stream/play/{source_name}/{source_id}/{info_hash}/{file_index}",
            get(play).head(play),
        )
        .route("/stream/{media_type}/{imdb_id}", get(list_streams))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Periodically deletes torrents the tracker no longer needs seeded.
///
/// The first sweep runs one interval after startup.
pub fn spawn_cleanup_task(
    store: Arc<TorrentStore>,
    aggregator: Arc<SourceAggregator>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.delete_unnecessary(&*aggregator).await {
                Ok(deleted) if deleted.is_empty() => {
                    tracing::debug!("Cleanup sweep found nothing to remove");
                }
                Ok(deleted) => {
                    tracing::info!("Cleanup sweep removed {} torrents", deleted.len());
                }
                Err(e) => tracing::warn!("Cleanup sweep failed: {}", e),
            }
        }
    })
}

/// Runs the server until interrupted, then stops the engine.
///
/// # Errors
///
/// - `ServerError::Bind` - Listener could not be bound
/// - `ServerError::Store` / `ServerError::Source` - Startup failed
pub async fn run_server(config: SeedstreamConfig) -> Result<(), ServerError> {
    let address = format!("{}:{}", config.server.host, config.server.port);
    let socket_address: SocketAddr = address.parse().map_err(|e| ServerError::Bind {
        address: address.clone(),
        reason: format!("{e}"),
    })?;

    let cleanup_interval = config.storage.cleanup_interval;
    let state = AppState::from_config(config).await?;

    let cleanup = cleanup_interval.map(|interval| {
        tracing::info!("Removable torrent sweep every {:?}", interval);
        spawn_cleanup_task(state.store.clone(), state.aggregator.clone(), interval)
    });

    let listener = tokio::net::TcpListener::bind(socket_address)
        .await
        .map_err(|e| ServerError::Bind {
            address: address.clone(),
            reason: e.to_string(),
        })?;
    tracing::info!(
        "Seedstream listening on http://{} (public URL {})",
        socket_address,
        state.config.server.public_url
    );

    let store = state.store.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(cleanup) = cleanup {
        cleanup.abort();
    }
    if let Err(e) = store.shutdown().await {
        tracing::warn!("Engine shutdown failed: {}", e);
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
