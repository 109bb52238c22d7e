//! Actor implementation for the local transfer engine.

use std::collections::{BTreeSet, HashMap};
use std::ops::Range;
use std::path::PathBuf;

use tokio::sync::mpsc;

use super::commands::{FileLocation, TransferEngineCommand};
use super::handle::TransferEngineHandle;
use super::{EngineError, EngineTorrent, RegisterRequest};
use crate::torrent::{InfoHash, TorrentMetainfo};

const COMMAND_CHANNEL_CAPACITY: usize = 100;

/// Spawns the local transfer engine actor and returns its handle.
///
/// The local engine keeps registrations, file selection and priority
/// windows in memory and serves whatever bytes already exist below each
/// torrent's download directory. It has no peer transport.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() {
/// use seedstream_core::engine::spawn_transfer_engine;
///
/// let handle = spawn_transfer_engine();
/// assert!(handle.is_running());
/// # }
/// ```
pub fn spawn_transfer_engine() -> TransferEngineHandle {
    let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        run_actor_loop(LocalEngineState::default(), receiver).await;
    });

    TransferEngineHandle::new(sender)
}

#[derive(Debug)]
struct RegisteredTorrent {
    metainfo: TorrentMetainfo,
    download_dir: PathBuf,
    selected_files: BTreeSet<usize>,
    priority: Option<(usize, Range<u64>)>,
}

impl RegisteredTorrent {
    fn view(&self) -> EngineTorrent {
        EngineTorrent {
            info_hash: self.metainfo.info_hash,
            name: self.metainfo.name.clone(),
            file_count: self.metainfo.files.len(),
            selected_files: self.selected_files.iter().copied().collect(),
        }
    }

    fn locate(&self, file_index: usize) -> Result<FileLocation, EngineError> {
        let file = self
            .metainfo
            .files
            .get(file_index)
            .ok_or(EngineError::InvalidFileIndex {
                info_hash: self.metainfo.info_hash,
                file_index,
            })?;
        let relative = self
            .metainfo
            .relative_file_path(file_index)
            .ok_or(EngineError::InvalidFileIndex {
                info_hash: self.metainfo.info_hash,
                file_index,
            })?;

        Ok(FileLocation {
            path: self.download_dir.join(relative),
            length: file.length,
        })
    }
}

#[derive(Debug, Default)]
struct LocalEngineState {
    torrents: HashMap<InfoHash, RegisteredTorrent>,
}

impl LocalEngineState {
    async fn register(&mut self, request: RegisterRequest) -> Result<EngineTorrent, EngineError> {
        let info_hash = request.metainfo.info_hash;
        if let Some(existing) = self.torrents.get(&info_hash) {
            tracing::debug!("Torrent {} already registered with engine", info_hash);
            return Ok(existing.view());
        }

        tokio::fs::create_dir_all(&request.download_dir)
            .await
            .map_err(|e| EngineError::RegistrationFailed {
                reason: format!(
                    "cannot create {}: {e}",
                    request.download_dir.display()
                ),
            })?;

        let torrent = RegisteredTorrent {
            metainfo: request.metainfo,
            download_dir: request.download_dir,
            selected_files: BTreeSet::new(),
            priority: None,
        };
        let view = torrent.view();
        self.torrents.insert(info_hash, torrent);

        tracing::info!(
            "Registered torrent {} ({}) with {} files",
            view.name,
            info_hash,
            view.file_count
        );
        Ok(view)
    }

    fn torrent(&self, info_hash: InfoHash) -> Result<&RegisteredTorrent, EngineError> {
        self.torrents
            .get(&info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })
    }

    fn prioritize(
        &mut self,
        info_hash: InfoHash,
        file_index: usize,
        window: Range<u64>,
    ) -> Result<(), EngineError> {
        let torrent = self
            .torrents
            .get_mut(&info_hash)
            .ok_or(EngineError::TorrentNotFound { info_hash })?;

        let file = torrent
            .metainfo
            .files
            .get(file_index)
            .ok_or(EngineError::InvalidFileIndex {
                info_hash,
                file_index,
            })?;

        let end = window.end.min(file.length);
        let start = window.start.min(end);
        torrent.selected_files.insert(file_index);
        torrent.priority = Some((file_index, start..end));

        tracing::debug!(
            "Prioritized bytes {}..{} of file {} in {}",
            start,
            end,
            file_index,
            info_hash
        );
        Ok(())
    }

    fn release(&mut self, info_hash: InfoHash) -> Result<(), EngineError> {
        match self.torrents.remove(&info_hash) {
            Some(torrent) => {
                tracing::info!("Released torrent {} ({})", torrent.metainfo.name, info_hash);
                Ok(())
            }
            None => Err(EngineError::TorrentNotFound { info_hash }),
        }
    }
}

/// Processes commands one at a time until shutdown or channel close.
async fn run_actor_loop(
    mut state: LocalEngineState,
    mut receiver: mpsc::Receiver<TransferEngineCommand>,
) {
    tracing::debug!("Transfer engine actor started");

    while let Some(command) = receiver.recv().await {
        if !handle_command(&mut state, command).await {
            break;
        }
    }

    tracing::debug!("Transfer engine actor stopped");
}

/// Handles a single command.
/// Returns true to continue processing, false to shutdown.
async fn handle_command(state: &mut LocalEngineState, command: TransferEngineCommand) -> bool {
    match command {
        TransferEngineCommand::Register { request, responder } => {
            let result = state.register(request).await;
            let _ = responder.send(result);
        }

        TransferEngineCommand::Prioritize {
            info_hash,
            file_index,
            window,
            responder,
        } => {
            let result = state.prioritize(info_hash, file_index, window);
            let _ = responder.send(result);
        }

        TransferEngineCommand::Release {
            info_hash,
            responder,
        } => {
            let result = state.release(info_hash);
            let _ = responder.send(result);
        }

        TransferEngineCommand::LocateFile {
            info_hash,
            file_index,
            responder,
        } => {
            let result = state
                .torrent(info_hash)
                .and_then(|torrent| torrent.locate(file_index));
            let _ = responder.send(result);
        }

        TransferEngineCommand::LocateAllFiles {
            info_hash,
            responder,
        } => {
            let result = state.torrent(info_hash).and_then(|torrent| {
                (0..torrent.metainfo.files.len())
                    .map(|index| torrent.locate(index))
                    .collect()
            });
            let _ = responder.send(result);
        }

        TransferEngineCommand::GetTorrent {
            info_hash,
            responder,
        } => {
            let result = state.torrent(info_hash).map(RegisteredTorrent::view);
            let _ = responder.send(result);
        }

        TransferEngineCommand::GetPriority {
            info_hash,
            responder,
        } => {
            let result = state
                .torrent(info_hash)
                .map(|torrent| torrent.priority.clone());
            let _ = responder.send(result);
        }

        TransferEngineCommand::Shutdown { responder } => {
            tracing::info!(
                "Transfer engine shutting down with {} torrents",
                state.torrents.len()
            );
            state.torrents.clear();
            let _ = responder.send(());
            return false;
        }
    }

    true
}
