//! Durable info hash to torrent file mapping
//!
//! Stored as a flat JSON object `{ "<hash>": "<path>" }`. Every mutation
//! rewrites the whole file through a temporary sibling and a rename, so a
//! crash leaves either the old or the new mapping on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::StoreError;
use crate::torrent::InfoHash;

/// Persisted mapping kept consistent with the store's in-memory set.
#[derive(Debug)]
pub struct PersistedState {
    path: PathBuf,
    entries: Mutex<BTreeMap<InfoHash, PathBuf>>,
}

impl PersistedState {
    /// Loads the state file, treating a missing file as empty.
    ///
    /// Keys that are not valid info hashes are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - File exists but could not be read
    /// - `StoreError::State` - File is not a JSON object of strings
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let entries = match tokio::fs::read(&path).await {
            Ok(contents) => parse_entries(&path, &contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No state file at {}, starting empty", path.display());
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a snapshot of all persisted entries.
    pub async fn entries(&self) -> BTreeMap<InfoHash, PathBuf> {
        self.entries.lock().await.clone()
    }

    pub async fn contains(&self, info_hash: InfoHash) -> bool {
        self.entries.lock().await.contains_key(&info_hash)
    }

    /// Records a mapping and persists it.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - State file could not be written
    pub async fn insert(&self, info_hash: InfoHash, torrent_path: PathBuf) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.get(&info_hash) == Some(&torrent_path) {
            return Ok(());
        }

        entries.insert(info_hash, torrent_path);
        self.write(&entries).await
    }

    /// Removes a mapping and persists the change, returning the old path.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - State file could not be written
    pub async fn remove(&self, info_hash: InfoHash) -> Result<Option<PathBuf>, StoreError> {
        let mut entries = self.entries.lock().await;
        let Some(removed) = entries.remove(&info_hash) else {
            return Ok(None);
        };

        self.write(&entries).await?;
        Ok(Some(removed))
    }

    /// Drops every entry in `info_hashes` with a single write.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - State file could not be written
    pub async fn prune(&self, info_hashes: &[InfoHash]) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|info_hash, _| !info_hashes.contains(info_hash));

        if entries.len() != before {
            self.write(&entries).await?;
        }
        Ok(())
    }

    async fn write(&self, entries: &BTreeMap<InfoHash, PathBuf>) -> Result<(), StoreError> {
        let serializable: BTreeMap<String, String> = entries
            .iter()
            .map(|(info_hash, path)| (info_hash.to_string(), path.display().to_string()))
            .collect();
        let json = serde_json::to_vec_pretty(&serializable).map_err(|e| StoreError::State {
            reason: format!("failed to encode state: {e}"),
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;

        tracing::debug!(
            "Persisted {} torrent entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

fn parse_entries(path: &Path, contents: &[u8]) -> Result<BTreeMap<InfoHash, PathBuf>, StoreError> {
    if contents.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }

    let raw: BTreeMap<String, String> =
        serde_json::from_slice(contents).map_err(|e| StoreError::State {
            reason: format!("{} is not a valid state file: {e}", path.display()),
        })?;

    let mut entries = BTreeMap::new();
    for (key, torrent_path) in raw {
        match InfoHash::from_hex(&key) {
            Ok(info_hash) => {
                entries.insert(info_hash, PathBuf::from(torrent_path));
            }
            Err(e) => tracing::warn!("Skipping state entry: {}", e),
        }
    }
    Ok(entries)
}
