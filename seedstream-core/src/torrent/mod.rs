//! Torrent identity and metainfo parsing

pub mod metainfo;

use std::fmt;
use std::str::FromStr;

pub use metainfo::{BencodeParser, TorrentFile, TorrentMetainfo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file. Used as
/// the primary key of the torrent store and for deduplicating search hits.
/// Displays and serializes as 40 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40-character hex string, case insensitive.
    ///
    /// # Errors
    ///
    /// - `MetainfoError::InvalidInfoHash` - Wrong length or non-hex characters
    pub fn from_hex(value: &str) -> Result<Self, MetainfoError> {
        if value.len() != 40 {
            return Err(MetainfoError::InvalidInfoHash {
                value: value.to_string(),
            });
        }

        let mut hash = [0u8; 20];
        hex::decode_to_slice(value, &mut hash).map_err(|_| MetainfoError::InvalidInfoHash {
            value: value.to_string(),
        })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl FromStr for InfoHash {
    type Err = MetainfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for InfoHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value).map_err(serde::de::Error::custom)
    }
}

/// Errors raised while reading torrent metainfo.
#[derive(Debug, thiserror::Error)]
pub enum MetainfoError {
    #[error("Failed to parse torrent file: {reason}")]
    InvalidTorrentFile { reason: String },

    #[error("Invalid info hash: {value}")]
    InvalidInfoHash { value: String },

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
