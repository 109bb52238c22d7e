//! Error types for torrent source access.

use thiserror::Error;

/// Errors raised while talking to a torrent source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Login was rejected or no session cookie could be obtained.
    #[error("Authentication with {source_name} failed: {reason}")]
    AuthenticationFailed {
        /// Source that rejected the login
        source_name: String,
        /// The reason for the failure
        reason: String,
    },

    /// Upstream unreachable, timed out or answered with a server error.
    #[error("Source {source_name} unavailable: {reason}")]
    SourceUnavailable {
        /// Source that could not be reached
        source_name: String,
        /// The reason for the failure
        reason: String,
    },

    /// Requested item does not exist on the source.
    #[error("Not found on {source_name}: {what}")]
    NotFound {
        /// Source that was asked
        source_name: String,
        /// Description of the missing item
        what: String,
    },

    /// A page did not have the expected shape.
    #[error("Failed to extract data from page: {reason}")]
    Extraction {
        /// The reason for the extraction failure
        reason: String,
    },

    /// Fetched bytes are not a valid torrent file.
    #[error("Invalid torrent for source id {source_id}: {reason}")]
    InvalidTorrent {
        /// Source id the torrent was fetched for
        source_id: String,
        /// The reason the torrent was rejected
        reason: String,
    },
}

impl SourceError {
    /// Checks if the error means the upstream could not serve the request.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            SourceError::AuthenticationFailed { .. } | SourceError::SourceUnavailable { .. }
        )
    }
}

/// Errors raised by the title metadata collaborator.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// No title is known for the identifier.
    #[error("No metadata for {imdb_id}")]
    NotFound {
        /// Identifier that was looked up
        imdb_id: String,
    },

    /// Metadata service unreachable or returned garbage.
    #[error("Metadata fetch failed: {reason}")]
    FetchFailed {
        /// The reason for the metadata fetch failure
        reason: String,
    },
}
