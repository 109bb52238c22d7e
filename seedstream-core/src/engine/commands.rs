//! Command definitions for the transfer engine actor.

use std::ops::Range;
use std::path::PathBuf;

use tokio::sync::oneshot;

use super::{EngineError, EngineTorrent, RegisterRequest};
use crate::torrent::InfoHash;

/// Location of a file on disk as resolved by the actor.
#[derive(Debug, Clone, PartialEq)]
pub struct FileLocation {
    pub path: PathBuf,
    pub length: u64,
}

/// Commands processed sequentially by the engine actor.
///
/// Each command carries a oneshot responder. File I/O happens in the
/// handle after the actor resolves paths, so reads never queue behind
/// each other.
pub enum TransferEngineCommand {
    /// Register a torrent, all files deselected.
    Register {
        request: RegisterRequest,
        responder: oneshot::Sender<Result<EngineTorrent, EngineError>>,
    },
    /// Select a file and set its priority window.
    Prioritize {
        info_hash: InfoHash,
        file_index: usize,
        window: Range<u64>,
        responder: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Forget a torrent.
    Release {
        info_hash: InfoHash,
        responder: oneshot::Sender<Result<(), EngineError>>,
    },
    /// Resolve one file of a torrent to its on-disk location.
    LocateFile {
        info_hash: InfoHash,
        file_index: usize,
        responder: oneshot::Sender<Result<FileLocation, EngineError>>,
    },
    /// Resolve every file of a torrent to its on-disk location.
    LocateAllFiles {
        info_hash: InfoHash,
        responder: oneshot::Sender<Result<Vec<FileLocation>, EngineError>>,
    },
    /// Current state of a registered torrent.
    GetTorrent {
        info_hash: InfoHash,
        responder: oneshot::Sender<Result<EngineTorrent, EngineError>>,
    },
    /// Current priority window of a torrent, if any.
    GetPriority {
        info_hash: InfoHash,
        responder: oneshot::Sender<Result<Option<(usize, Range<u64>)>, EngineError>>,
    },
    /// Shutdown the engine actor gracefully.
    Shutdown { responder: oneshot::Sender<()> },
}
