//! Seedstream Core - torrent lifecycle and streaming building blocks
//!
//! This crate provides the pieces shared by the search and web layers:
//! torrent metainfo parsing, the transfer engine boundary, the torrent
//! store with its persisted state, HTTP range negotiation, a TTL query
//! cache, batched fan-out helpers and configuration.

pub mod batch;
pub mod cache;
pub mod config;
pub mod engine;
pub mod store;
pub mod streaming;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use batch::BatchFetcher;
pub use cache::QueryCache;
pub use config::SeedstreamConfig;
pub use engine::{EngineError, TransferEngine};
pub use store::{StoreError, TorrentResource, TorrentStore};
pub use streaming::{ByteRange, RangeNegotiator, RangeOutcome, RangeUnsatisfiable};
pub use torrent::{InfoHash, MetainfoError, TorrentMetainfo};

/// Core errors that can bubble up from any Seedstream subsystem.
///
/// High-level error types representing failures in core functionality.
#[derive(Debug, thiserror::Error)]
pub enum SeedstreamError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Torrent error: {0}")]
    Metainfo(#[from] MetainfoError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SeedstreamError>;
