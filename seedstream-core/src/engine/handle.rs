//! Handle for communicating with the transfer engine actor.

use std::io::SeekFrom;
use std::ops::Range;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, oneshot};

use super::commands::{FileLocation, TransferEngineCommand};
use super::{EngineError, EngineTorrent, RegisterRequest, TransferEngine};
use crate::torrent::InfoHash;

/// Handle for communicating with the transfer engine actor.
///
/// Cheap to clone; every clone talks to the same actor task.
#[derive(Clone)]
pub struct TransferEngineHandle {
    sender: mpsc::Sender<TransferEngineCommand>,
}

impl TransferEngineHandle {
    /// Creates a new handle with the given command sender.
    pub fn new(sender: mpsc::Sender<TransferEngineCommand>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> TransferEngineCommand,
    ) -> Result<T, EngineError> {
        let (responder, rx) = oneshot::channel();

        self.sender
            .send(build(responder))
            .await
            .map_err(|_| EngineError::EngineShutdown)?;

        rx.await.map_err(|_| EngineError::EngineShutdown)
    }

    /// Returns the engine's current view of a torrent.
    ///
    /// # Errors
    /// - `EngineError::TorrentNotFound` - Info hash not registered
    pub async fn torrent(&self, info_hash: InfoHash) -> Result<EngineTorrent, EngineError> {
        self.request(|responder| TransferEngineCommand::GetTorrent {
            info_hash,
            responder,
        })
        .await?
    }

    /// Returns the file and window most recently prioritized.
    ///
    /// # Errors
    /// - `EngineError::TorrentNotFound` - Info hash not registered
    pub async fn priority_window(
        &self,
        info_hash: InfoHash,
    ) -> Result<Option<(usize, Range<u64>)>, EngineError> {
        self.request(|responder| TransferEngineCommand::GetPriority {
            info_hash,
            responder,
        })
        .await?
    }

    /// Checks if the engine actor is still running.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[async_trait]
impl TransferEngine for TransferEngineHandle {
    async fn register(&self, request: RegisterRequest) -> Result<EngineTorrent, EngineError> {
        self.request(|responder| TransferEngineCommand::Register { request, responder })
            .await?
    }

    async fn prioritize(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        window: Range<u64>,
    ) -> Result<(), EngineError> {
        self.request(|responder| TransferEngineCommand::Prioritize {
            info_hash,
            file_index,
            window,
            responder,
        })
        .await?
    }

    async fn release(&self, info_hash: InfoHash) -> Result<(), EngineError> {
        self.request(|responder| TransferEngineCommand::Release {
            info_hash,
            responder,
        })
        .await?
    }

    async fn read_at(
        &self,
        info_hash: InfoHash,
        file_index: usize,
        offset: u64,
        len: usize,
    ) -> Result<Bytes, EngineError> {
        let location = self
            .request(|responder| TransferEngineCommand::LocateFile {
                info_hash,
                file_index,
                responder,
            })
            .await??;

        if offset >= location.length || len == 0 {
            return Ok(Bytes::new());
        }
        let wanted = (location.length - offset).min(len as u64) as usize;

        let mut file = match tokio::fs::File::open(&location.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::DataUnavailable { file_index, offset });
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(offset)).await?;

        let mut buffer = BytesMut::zeroed(wanted);
        let mut filled = 0;
        while filled < wanted {
            let read = file.read(&mut buffer[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        if filled < wanted {
            return Err(EngineError::DataUnavailable {
                file_index,
                offset: offset + filled as u64,
            });
        }

        Ok(buffer.freeze())
    }

    async fn downloaded_bytes(&self, info_hash: InfoHash) -> Result<u64, EngineError> {
        let locations = self
            .request(|responder| TransferEngineCommand::LocateAllFiles {
                info_hash,
                responder,
            })
            .await??;

        let mut total = 0;
        for FileLocation { path, length } in locations {
            if let Ok(metadata) = tokio::fs::metadata(&path).await {
                total += metadata.len().min(length);
            }
        }
        Ok(total)
    }

    async fn shutdown(&self) -> Result<(), EngineError> {
        self.request(|responder| TransferEngineCommand::Shutdown { responder })
            .await
    }
}
