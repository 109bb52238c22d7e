//! Data types for torrent discovery.

use std::fmt;
use std::str::FromStr;

use seedstream_core::InfoHash;
use serde::{Deserialize, Serialize};

/// Kind of title a stream is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Single feature, served from the largest media file
    Movie,
    /// Episodic title, served from the file matching season and episode
    Series,
}

impl MediaType {
    /// Lowercase name used in URLs and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "series",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized media type names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid media type: {0}")]
pub struct InvalidMediaType(pub String);

impl FromStr for MediaType {
    type Err = InvalidMediaType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "movie" => Ok(MediaType::Movie),
            "series" | "tv" | "show" => Ok(MediaType::Series),
            _ => Err(InvalidMediaType(s.to_string())),
        }
    }
}

/// Title, kind and episode a caller wants streams for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// External title identifier, e.g. `tt0000001`
    pub imdb_id: String,
    /// Movie or series
    pub media_type: MediaType,
    /// Season number for series
    pub season: Option<u32>,
    /// Episode number for series
    pub episode: Option<u32>,
}

impl StreamRequest {
    /// Creates a request for a movie.
    pub fn movie(imdb_id: impl Into<String>) -> Self {
        Self {
            imdb_id: imdb_id.into(),
            media_type: MediaType::Movie,
            season: None,
            episode: None,
        }
    }

    /// Creates a request for one episode of a series.
    pub fn episode(imdb_id: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            imdb_id: imdb_id.into(),
            media_type: MediaType::Series,
            season: Some(season),
            episode: Some(episode),
        }
    }

    fn episode_suffix(&self) -> String {
        let part = |value: Option<u32>| value.map(|v| v.to_string()).unwrap_or_default();
        format!("{}:{}:{}", self.media_type, part(self.season), part(self.episode))
    }

    /// Cache key for identifier-based results.
    pub fn identifier_cache_key(&self) -> String {
        format!(
            "imdb:{}:{}",
            self.imdb_id.trim().to_ascii_lowercase(),
            self.episode_suffix()
        )
    }

    /// Cache key for name-based results.
    pub fn name_cache_key(&self, display_name: &str) -> String {
        format!(
            "name:{}:{}",
            normalize_name(display_name),
            self.episode_suffix()
        )
    }
}

/// Lowercases and collapses whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Query term sent to a source's search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTerm {
    /// Search by external identifier
    ImdbId(String),
    /// Free-text search by display name
    Name(String),
}

/// Search hit before its torrent file has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHit {
    /// Source-specific item id
    pub source_id: String,
    /// Title as listed by the source
    pub title: String,
    /// Seeder count reported by the source
    pub seeders: u32,
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchPage {
    /// Total hits across all pages
    pub total: u32,
    /// Hits per page as reported by the source
    pub per_page: u32,
    /// Hits on this page
    pub hits: Vec<RawHit>,
}

impl SearchPage {
    /// Number of pages implied by `total` and `per_page`.
    pub fn page_count(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page)
    }
}

/// File entry of a candidate torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFile {
    /// Path inside the torrent, joined with `/`
    pub path: String,
    /// Length in bytes
    pub length: u64,
}

/// A playable torrent found for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentCandidate {
    /// Name of the source the torrent came from
    pub source_name: String,
    /// Source-specific item id
    pub source_id: String,
    /// Title as listed by the source
    pub title: String,
    /// Info hash of the fetched torrent
    pub info_hash: InfoHash,
    /// Seeder count reported by the source
    pub seeders: u32,
    /// Every file in the torrent
    pub files: Vec<CandidateFile>,
    /// Index of the selected playable file
    pub file_index: usize,
    /// Found through the name-based fallback
    pub is_speculative: bool,
}

impl TorrentCandidate {
    /// The selected playable file.
    pub fn selected_file(&self) -> Option<&CandidateFile> {
        self.files.get(self.file_index)
    }
}
