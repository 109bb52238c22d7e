//! Transfer engine boundary
//!
//! The store never talks to peers directly. It registers torrents with a
//! `TransferEngine`, selects files and priority windows on it, and reads
//! bytes back out. `spawn_transfer_engine` provides the local actor engine;
//! tests substitute `MockTransferEngine`.

pub mod actor;
pub mod commands;
pub mod handle;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;

use std::ops::Range;
use std::path::PathBuf;

pub use actor::spawn_transfer_engine;
use async_trait::async_trait;
use bytes::Bytes;
pub use handle::TransferEngineHandle;

use crate::torrent::{InfoHash, TorrentMetainfo};

/// Everything the engine needs to start managing a torrent.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub metainfo: TorrentMetainfo,
    /// Directory the torrent's files are written below
    pub download_dir: PathBuf,
}

/// Engine view of a registered torrent once its metadata is ready.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineTorrent {
    pub info_hash: InfoHash,
    pub name: String,
    pub file_count: usize,
    /// Files currently selected for download; empty right after registration
    pub selected_files: Vec<usize>,
}

/// Errors reported by a transfer engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Torrent not registered with engine: {info_hash}")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("File index {file_index} out of range for torrent {info_hash}")]
    InvalidFileIndex {
        info_hash: InfoHash,
        file_index: usize,
    },

    #[error("Bytes at offset {offset} of file {file_index} not yet available")]
    DataUnavailable { file_index: usize, offset: u64 },

    #[error("Registration failed: {reason}")]
    RegistrationFailed { reason: String },

    #[error("Engine has been shut down")]
    EngineShutdown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operations the store needs from a torrent transfer engine.
///
/// Implementations are shared behind `Arc<dyn TransferEngine>` and must be
/// safe to call concurrently.
#[async_trait]
pub trait TransferEngine: Send + Sync {
    /// Registers a torrent with every file deselected.
    ///
    /// Resolves once the engine has the torrent's metadata. Registering a
    /// hash that is already known returns the existing entry.
    async fn register(&self, request: RegisterRequest) -> Result<EngineTorrent, EngineError>;

    /// Selects `file_index` and fetches `window` (file-relative) first.
    async fn prioritize(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        window: Range<u64>,
    ) -> Result<(), EngineError>;

    /// Stops managing a torrent without touching downloaded data.
    async fn release(&self, info_hash: InfoHash) -> Result<(), EngineError>;

    /// Reads up to `len` bytes of a file starting at `offset`.
    ///
    /// Returns fewer bytes than requested only at end of file.
    async fn read_at(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, EngineError>;

    /// Bytes of the torrent present locally.
    async fn downloaded_bytes(&self, info_hash: InfoHash) -> Result<u64, EngineError>;

    async fn shutdown(&self) -> Result<(), EngineError>;
}
