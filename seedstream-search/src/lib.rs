//! Seedstream Search - tracker access and stream candidate discovery

#![deny(missing_docs)]
#![warn(clippy::too_many_lines)]
//!
//! Logs into a private tracker, searches it by IMDb id with a name-based
//! fallback, fetches torrent files to pick the playable file and ranks the
//! resulting candidates. Also reports torrents whose seeding obligation is
//! fulfilled so the store can reclaim their space.

pub mod aggregator;
pub mod errors;
pub mod extractors;
pub mod index;
pub mod metadata;
pub mod selection;
pub mod session;
pub mod types;

// Re-export main types
pub use aggregator::SourceAggregator;
pub use errors::{MetadataError, SourceError};
pub use index::{HttpTrackerIndex, TorrentIndex};
pub use metadata::{OmdbMetadata, TitleMetadata};
pub use session::{CredentialSession, SessionManager};
pub use types::{MediaType, StreamRequest, TorrentCandidate};

/// Convenience type alias for Results with SourceError.
pub type Result<T> = std::result::Result<T, SourceError>;
