//! Mock transfer engine for tests.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::{EngineError, EngineTorrent, RegisterRequest, TransferEngine};
use crate::torrent::{InfoHash, TorrentMetainfo};

/// Byte served by the mock at `offset` of any file.
pub fn mock_byte_at(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// In-memory engine that records every call.
///
/// Every file reads back as the pattern produced by [`mock_byte_at`], so
/// tests can check served bytes without writing data to disk.
#[derive(Debug, Clone, Default)]
pub struct MockTransferEngine {
    registrations: Arc<AtomicUsize>,
    torrents: Arc<Mutex<HashMap<InfoHash, TorrentMetainfo>>>,
    priorities: Arc<Mutex<Vec<(InfoHash, usize, Range<u64>)>>>,
    released: Arc<Mutex<Vec<InfoHash>>>,
    register_delay: Option<Duration>,
    fail_registration: Arc<AtomicBool>,
    shut_down: Arc<AtomicBool>,
}

impl MockTransferEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays metadata readiness to widen race windows in tests.
    pub fn with_register_delay(delay: Duration) -> Self {
        Self {
            register_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Makes subsequent registrations fail.
    pub fn fail_registrations(&self) {
        self.fail_registration.store(true, Ordering::SeqCst);
    }

    /// Number of registrations that reached the engine.
    pub fn registration_count(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn is_registered(&self, info_hash: InfoHash) -> bool {
        self.torrents.lock().contains_key(&info_hash)
    }

    pub fn priorities(&self) -> Vec<(InfoHash, usize, Range<u64>)> {
        self.priorities.lock().clone()
    }

    pub fn released(&self) -> Vec<InfoHash> {
        self.released.lock().clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn file_length(&self, info_hash: InfoHash, file_index: usize) -> Result<u64, EngineError> {
        let torrents = self.torrents.lock();
        let metainfo = torrents
            .get(&info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })?;
        metainfo
            .files
            .get(file_index)
            .map(|file| file.length)
            .ok_or(EngineError::InvalidFileIndex {
                info_hash,
                file_index,
            })
    }
}

#[async_trait]
impl TransferEngine for MockTransferEngine {
    async fn register(&self, request: RegisterRequest) -> Result<EngineTorrent, EngineError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.register_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_registration.load(Ordering::SeqCst) {
            return Err(EngineError::RegistrationFailed {
                reason: "Mock registration failure".to_string(),
            });
        }

        let metainfo = request.metainfo;
        let torrent = EngineTorrent {
            info_hash: metainfo.info_hash,
            name: metainfo.name.clone(),
            file_count: metainfo.files.len(),
            selected_files: Vec::new(),
        };
        self.torrents.lock().insert(metainfo.info_hash, metainfo);
        Ok(torrent)
    }

    async fn prioritize(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        window: Range<u64>,
    ) -> Result<(), EngineError> {
        self.file_length(info_hash, file_index)?;
        self.priorities.lock().push((info_hash, file_index, window));
        Ok(())
    }

    async fn release(&self, info_hash: InfoHash) -> Result<(), EngineError> {
        self.torrents.lock().remove(&info_hash);
        self.released.lock().push(info_hash);
        Ok(())
    }

    async fn read_at(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, EngineError> {
        let length = self.file_length(info_hash, file_index)?;
        let end = (offset + len as u64).min(length);
        Ok((offset..end).map(mock_byte_at).collect())
    }

    async fn downloaded_bytes(&self, info_hash: InfoHash) -> Result<u64, EngineError> {
        let torrents = self.torrents.lock();
        let metainfo = torrents
            .get(&info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })?;
        Ok(metainfo.total_length)
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}
