//! API error type and its HTTP mapping.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use seedstream_core::{MetainfoError, RangeUnsatisfiable, StoreError};
use seedstream_search::SourceError;
use serde_json::json;

/// Failure of a single API request.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request parameters.
    #[error("Invalid request: {reason}")]
    Validation {
        /// What was wrong with the request
        reason: String,
    },

    /// Unknown source id, source or torrent.
    #[error("Not found: {what}")]
    NotFound {
        /// The missing item
        what: String,
    },

    /// No satisfiable byte range.
    #[error(transparent)]
    RangeUnsatisfiable(#[from] RangeUnsatisfiable),

    /// Tracker unreachable, timed out or rejected the login.
    #[error("Upstream failure: {reason}")]
    Upstream {
        /// The upstream error
        reason: String,
    },

    /// Anything else.
    #[error("Internal error: {reason}")]
    Internal {
        /// The underlying error
        reason: String,
    },
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::RangeUnsatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::TorrentNotFound { info_hash } => ApiError::NotFound {
                what: format!("torrent {info_hash}"),
            },
            StoreError::InvalidFileIndex {
                file_index,
                file_count,
                ..
            } => ApiError::Validation {
                reason: format!("file index {file_index} out of range ({file_count} files)"),
            },
            other => ApiError::Internal {
                reason: other.to_string(),
            },
        }
    }
}

impl From<SourceError> for ApiError {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::NotFound { source_name, what } => ApiError::NotFound {
                what: format!("{what} on {source_name}"),
            },
            other => ApiError::Upstream {
                reason: other.to_string(),
            },
        }
    }
}

impl From<MetainfoError> for ApiError {
    fn from(error: MetainfoError) -> Self {
        ApiError::Upstream {
            reason: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = Json(json!({ "error": self.to_string() }));
        match self {
            ApiError::RangeUnsatisfiable(unsatisfiable) => (
                status,
                [(header::CONTENT_RANGE, unsatisfiable.content_range())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}
