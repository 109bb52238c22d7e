//! Torrent lifecycle store
//!
//! `TorrentStore` owns every active torrent resource. It deduplicates adds
//! by torrent file path and by info hash, keeps the persisted state in step
//! with the in-memory set, and reclaims resources the tracker no longer
//! needs. Bytes are read through the injected `TransferEngine`.

pub mod state;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream};
use parking_lot::{Mutex, RwLock};
pub use state::PersistedState;
use tokio::sync::OwnedMutexGuard;

use crate::batch::{collect_successes, settle_all};
use crate::config::StorageConfig;
use crate::engine::{EngineError, RegisterRequest, TransferEngine};
use crate::streaming::ByteRange;
use crate::torrent::{InfoHash, MetainfoError, TorrentMetainfo};

const CHUNK_SIZE: usize = 256 * 1024; // 256KB

/// Byte stream over one file of a resource.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Errors raised by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Torrent not found: {info_hash}")]
    TorrentNotFound { info_hash: InfoHash },

    #[error("File index {file_index} out of range for {info_hash} ({file_count} files)")]
    InvalidFileIndex {
        info_hash: InfoHash,
        file_index: usize,
        file_count: usize,
    },

    #[error(transparent)]
    Metainfo(#[from] MetainfoError),

    #[error("Transfer engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("State file error: {reason}")]
    State { reason: String },

    #[error("Removable torrent lookup failed: {reason}")]
    Removable { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of info hashes that are safe to delete.
#[async_trait]
pub trait RemovableTorrents: Send + Sync {
    /// Returns hashes of torrents with no remaining seeding obligation.
    async fn removable_info_hashes(&self) -> Result<Vec<InfoHash>, StoreError>;
}

/// File inside a resource, with its offset in the torrent's byte space.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceFile {
    pub index: usize,
    pub path: String,
    pub length: u64,
    pub offset: u64,
}

/// Active torrent managed by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentResource {
    pub info_hash: InfoHash,
    pub name: String,
    pub files: Vec<ResourceFile>,
    pub piece_length: u32,
    pub total_length: u64,
    /// Absolute path of the `.torrent` file the resource was added from
    pub source_file_path: PathBuf,
    pub download_dir: PathBuf,
}

impl TorrentResource {
    fn from_metainfo(
        metainfo: &TorrentMetainfo,
        source_file_path: PathBuf,
        download_dir: PathBuf,
    ) -> Self {
        let mut offset = 0;
        let files = metainfo
            .files
            .iter()
            .enumerate()
            .map(|(index, file)| {
                let entry = ResourceFile {
                    index,
                    path: file.display_path(),
                    length: file.length,
                    offset,
                };
                offset += file.length;
                entry
            })
            .collect();

        Self {
            info_hash: metainfo.info_hash,
            name: metainfo.name.clone(),
            files,
            piece_length: metainfo.piece_length,
            total_length: metainfo.total_length,
            source_file_path,
            download_dir,
        }
    }

    /// Returns a file by index.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidFileIndex` - Index past the last file
    pub fn file(&self, file_index: usize) -> Result<&ResourceFile, StoreError> {
        self.files
            .get(file_index)
            .ok_or(StoreError::InvalidFileIndex {
                info_hash: self.info_hash,
                file_index,
                file_count: self.files.len(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AddLockKey {
    Path(PathBuf),
    Hash(InfoHash),
    /// Held while fetched torrent bytes are written and added
    Fetched(InfoHash),
}

type AddLocks = Mutex<HashMap<AddLockKey, Arc<tokio::sync::Mutex<()>>>>;

/// Held for the duration of one registration; drops its registry entry when
/// no other caller is waiting on the same key.
struct AddLockGuard<'a> {
    locks: &'a AddLocks,
    key: AddLockKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AddLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock();
        if let Some(lock) = locks.get(&self.key)
            && Arc::strong_count(lock) == 1
        {
            locks.remove(&self.key);
        }
    }
}

/// Owner of all torrent resources and their durable state.
pub struct TorrentStore {
    engine: Arc<dyn TransferEngine>,
    storage: StorageConfig,
    state: PersistedState,
    resources: RwLock<HashMap<InfoHash, TorrentResource>>,
    add_locks: AddLocks,
}

impl TorrentStore {
    /// Opens the store, reading persisted state but registering nothing.
    ///
    /// Call [`TorrentStore::load_all`] to restore persisted torrents.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - Storage directories could not be created
    /// - `StoreError::State` - State file is corrupt
    pub async fn open(
        storage: StorageConfig,
        engine: Arc<dyn TransferEngine>,
    ) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(&storage.download_dir).await?;
        tokio::fs::create_dir_all(&storage.torrent_dir).await?;
        let state = PersistedState::load(storage.state_file.clone()).await?;

        Ok(Self {
            engine,
            storage,
            state,
            resources: RwLock::new(HashMap::new()),
            add_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn state(&self) -> &PersistedState {
        &self.state
    }

    async fn lock_key(&self, key: AddLockKey) -> AddLockGuard<'_> {
        let lock = self
            .add_locks
            .lock()
            .entry(key.clone())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;

        AddLockGuard {
            locks: &self.add_locks,
            key,
            guard: Some(guard),
        }
    }

    fn find_by_path(&self, source_file_path: &Path) -> Option<TorrentResource> {
        self.resources
            .read()
            .values()
            .find(|resource| resource.source_file_path == source_file_path)
            .cloned()
    }

    /// Adds a torrent from a `.torrent` file, or returns the existing resource.
    ///
    /// Concurrent calls for one path, or for different paths with the same
    /// info hash, resolve to a single engine registration. The resource is
    /// visible to other callers only after the engine reports its metadata.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - Torrent file could not be read
    /// - `StoreError::Metainfo` - Torrent file is malformed
    /// - `StoreError::Engine` - Engine registration failed
    pub async fn add(&self, torrent_file_path: &Path) -> Result<TorrentResource, StoreError> {
        let source_file_path = std::path::absolute(torrent_file_path)?;

        let _path_guard = self
            .lock_key(AddLockKey::Path(source_file_path.clone()))
            .await;
        if let Some(existing) = self.find_by_path(&source_file_path) {
            tracing::debug!("Torrent file {} already loaded", source_file_path.display());
            return Ok(existing);
        }

        let contents = tokio::fs::read(&source_file_path).await?;
        let metainfo = TorrentMetainfo::from_bytes(&contents)?;
        let info_hash = metainfo.info_hash;

        let _hash_guard = self.lock_key(AddLockKey::Hash(info_hash)).await;
        if let Some(existing) = self.get(info_hash) {
            tracing::debug!(
                "Torrent {} already loaded from {}",
                info_hash,
                existing.source_file_path.display()
            );
            return Ok(existing);
        }

        let download_dir = self.storage.download_dir.join(info_hash.to_string());
        let resource =
            TorrentResource::from_metainfo(&metainfo, source_file_path.clone(), download_dir.clone());

        self.engine
            .register(RegisterRequest {
                metainfo,
                download_dir,
            })
            .await?;

        if let Err(e) = self.state.insert(info_hash, source_file_path).await {
            // Keep engine and durable state in step
            if let Err(release_error) = self.engine.release(info_hash).await {
                tracing::warn!("Failed to release {} after state error: {}", info_hash, release_error);
            }
            return Err(e);
        }

        self.resources.write().insert(info_hash, resource.clone());
        tracing::info!("Added torrent {} ({})", resource.name, info_hash);
        Ok(resource)
    }

    pub fn get(&self, info_hash: InfoHash) -> Option<TorrentResource> {
        self.resources.read().get(&info_hash).cloned()
    }

    /// All loaded resources, ordered by name.
    pub fn resources(&self) -> Vec<TorrentResource> {
        let mut resources: Vec<_> = self.resources.read().values().cloned().collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name).then(a.info_hash.cmp(&b.info_hash)));
        resources
    }

    pub fn len(&self) -> usize {
        self.resources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.read().is_empty()
    }

    /// Deletes a resource with its downloaded data and torrent file.
    ///
    /// The durable mapping is removed before any file. Unknown hashes are a
    /// no-op.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - State, download directory or torrent file removal failed
    pub async fn delete(&self, info_hash: InfoHash) -> Result<(), StoreError> {
        let persisted_path = self.state.remove(info_hash).await?;
        let resource = self.resources.write().remove(&info_hash);

        let torrent_file = match (&resource, persisted_path) {
            (Some(resource), _) => resource.source_file_path.clone(),
            (None, Some(path)) => path,
            (None, None) => {
                tracing::debug!("Delete of unknown torrent {} ignored", info_hash);
                return Ok(());
            }
        };

        match self.engine.release(info_hash).await {
            Ok(()) | Err(EngineError::TorrentNotFound { .. }) => {}
            Err(e) => tracing::warn!("Engine failed to release {}: {}", info_hash, e),
        }

        let download_dir = resource
            .as_ref()
            .map(|resource| resource.download_dir.clone())
            .unwrap_or_else(|| self.storage.download_dir.join(info_hash.to_string()));
        remove_if_exists(tokio::fs::remove_dir_all(&download_dir).await)?;
        remove_if_exists(tokio::fs::remove_file(&torrent_file).await)?;

        tracing::info!("Deleted torrent {}", info_hash);
        Ok(())
    }

    /// Restores every persisted torrent.
    ///
    /// Entries whose torrent file is gone are pruned from state. Other
    /// failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - State file could not be rewritten while pruning
    pub async fn load_all(&self) -> Result<Vec<TorrentResource>, StoreError> {
        let entries = self.state.entries().await;

        let mut missing = Vec::new();
        let mut present = Vec::new();
        for (info_hash, path) in entries {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                present.push(path);
            } else {
                tracing::warn!(
                    "Pruning {}: torrent file {} no longer exists",
                    info_hash,
                    path.display()
                );
                missing.push(info_hash);
            }
        }
        self.state.prune(&missing).await?;

        let results = settle_all(present.iter().map(|path| self.add(path))).await;
        let loaded = collect_successes("Failed to restore torrent", results);

        tracing::info!("Restored {} torrents from state", loaded.len());
        Ok(loaded)
    }

    /// Biases the engine toward `[byte_offset, byte_offset + window_size)` of a file.
    ///
    /// The window is clamped to the file.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidFileIndex` - Index past the last file
    /// - `StoreError::Engine` - Engine rejected the request
    pub async fn prioritize(
        &self,
        resource: &TorrentResource,
        file_index: usize,
        byte_offset: u64,
        window_size: u64,
    ) -> Result<(), StoreError> {
        let file = resource.file(file_index)?;
        let end = byte_offset.saturating_add(window_size).min(file.length);
        let start = byte_offset.min(end);

        self.engine
            .prioritize(resource.info_hash, file_index, start..end)
            .await?;
        Ok(())
    }

    /// Deletes every loaded torrent the collaborator reports as removable.
    ///
    /// Returns the hashes actually deleted. Individual failures are logged.
    ///
    /// # Errors
    ///
    /// - `StoreError::Removable` - Collaborator could not produce a list
    pub async fn delete_unnecessary(
        &self,
        removable: &dyn RemovableTorrents,
    ) -> Result<Vec<InfoHash>, StoreError> {
        let candidates = removable.removable_info_hashes().await?;
        let targets: Vec<InfoHash> = candidates
            .into_iter()
            .filter(|info_hash| self.get(*info_hash).is_some())
            .collect();

        let results = settle_all(targets.iter().copied().map(|info_hash| async move {
            self.delete(info_hash).await.map(|()| info_hash)
        }))
        .await;
        let deleted = collect_successes("Failed to delete removable torrent", results);

        tracing::info!("Removed {} torrents without seeding obligation", deleted.len());
        Ok(deleted)
    }

    /// Writes fetched torrent bytes under the torrent directory.
    ///
    /// The stem is sanitized to a safe file name. Returns the written path.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - File could not be written
    pub async fn write_torrent_file(&self, stem: &str, contents: &[u8]) -> Result<PathBuf, StoreError> {
        let file_name = format!("{}.torrent", sanitize_file_stem(stem));
        let path = self.storage.torrent_dir.join(file_name);
        let tmp_path = path.with_extension("torrent.tmp");

        tokio::fs::create_dir_all(&self.storage.torrent_dir).await?;
        tokio::fs::write(&tmp_path, contents).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        Ok(path)
    }

    /// Writes fetched torrent bytes and adds them, or returns the resource
    /// already loaded for their info hash.
    ///
    /// Concurrent calls for one info hash write the torrent file once.
    ///
    /// # Errors
    ///
    /// - `StoreError::Metainfo` - Bytes are not a torrent file
    /// - `StoreError::Io` - File could not be written
    /// - `StoreError::Engine` - Engine registration failed
    pub async fn add_torrent_bytes(&self, contents: &[u8]) -> Result<TorrentResource, StoreError> {
        let info_hash = TorrentMetainfo::from_bytes(contents)?.info_hash;

        let _fetch_guard = self.lock_key(AddLockKey::Fetched(info_hash)).await;
        if let Some(existing) = self.get(info_hash) {
            tracing::debug!("Torrent {} loaded while its bytes were fetched", info_hash);
            return Ok(existing);
        }

        let path = self.write_torrent_file(&info_hash.to_string(), contents).await?;
        self.add(&path).await
    }

    /// Streams `range` (inclusive) of a file in chunks.
    ///
    /// The stream ends after the first read error.
    ///
    /// # Errors
    ///
    /// - `StoreError::InvalidFileIndex` - Index past the last file
    pub fn open_range(
        &self,
        resource: &TorrentResource,
        file_index: usize,
        range: ByteRange,
    ) -> Result<ByteStream, StoreError> {
        resource.file(file_index)?;

        let engine = Arc::clone(&self.engine);
        let info_hash = resource.info_hash;
        let end = range.end + 1;

        let body = stream::unfold(
            (engine, range.start, false),
            move |(engine, position, failed)| async move {
                if failed || position >= end {
                    return None;
                }

                let chunk_size = (end - position).min(CHUNK_SIZE as u64) as usize;
                match engine.read_at(info_hash, file_index, position, chunk_size).await {
                    Ok(bytes) if bytes.is_empty() => None,
                    Ok(bytes) => {
                        let next = position + bytes.len() as u64;
                        Some((Ok(bytes), (engine, next, false)))
                    }
                    Err(e) => {
                        tracing::warn!("Stream read of {} at {} failed: {}", info_hash, position, e);
                        Some((
                            Err(std::io::Error::other(e.to_string())),
                            (engine, position, true),
                        ))
                    }
                }
            },
        );

        Ok(Box::pin(body))
    }

    /// Bytes of a torrent present locally, as reported by the engine.
    ///
    /// # Errors
    ///
    /// - `StoreError::TorrentNotFound` - Hash not loaded
    pub async fn downloaded_bytes(&self, info_hash: InfoHash) -> Result<u64, StoreError> {
        if self.get(info_hash).is_none() {
            return Err(StoreError::TorrentNotFound { info_hash });
        }
        Ok(self.engine.downloaded_bytes(info_hash).await?)
    }

    /// Stops the engine. Persisted state is already current.
    ///
    /// # Errors
    ///
    /// - `StoreError::Engine` - Engine failed to stop
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        tracing::info!("Shutting down torrent store with {} torrents", self.len());
        self.engine.shutdown().await?;
        Ok(())
    }
}

fn remove_if_exists(result: std::io::Result<()>) -> Result<(), StoreError> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn sanitize_file_stem(stem: &str) -> String {
    let sanitized: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let sanitized = sanitized.trim_matches('.');

    if sanitized.is_empty() {
        "torrent".to_string()
    } else {
        sanitized.to_string()
    }
}
