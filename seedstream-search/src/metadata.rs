//! Title metadata lookup using the OMDb API.

use std::time::Duration;

use async_trait::async_trait;
use seedstream_core::config::MetadataConfig;
use serde::Deserialize;

use crate::errors::MetadataError;

/// Resolves external identifiers to display names for fallback search.
#[async_trait]
pub trait TitleMetadata: Send + Sync {
    /// Returns the canonical display name for an IMDb id.
    async fn display_name(&self, imdb_id: &str) -> Result<String, MetadataError>;
}

/// Response from OMDb API for movie/show details.
#[derive(Debug, Clone, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Response")]
    response: Option<String>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

/// OMDb-backed metadata provider.
#[derive(Debug, Clone)]
pub struct OmdbMetadata {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OmdbMetadata {
    /// Creates a provider from configuration.
    ///
    /// # Errors
    ///
    /// - `MetadataError::FetchFailed` - HTTP client could not be built
    pub fn new(config: &MetadataConfig, timeout: Duration) -> Result<Self, MetadataError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MetadataError::FetchFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl TitleMetadata for OmdbMetadata {
    async fn display_name(&self, imdb_id: &str) -> Result<String, MetadataError> {
        let mut request = self
            .client
            .get(format!("{}/", self.base_url))
            .query(&[("i", imdb_id)]);
        if let Some(api_key) = &self.api_key {
            request = request.query(&[("apikey", api_key.as_str())]);
        }

        let response = request.send().await.map_err(|e| MetadataError::FetchFailed {
            reason: format!("HTTP request failed: {e}"),
        })?;

        let omdb_data: OmdbResponse =
            response
                .json()
                .await
                .map_err(|e| MetadataError::FetchFailed {
                    reason: format!("JSON parsing failed: {e}"),
                })?;

        if omdb_data.response.as_deref() == Some("False") {
            tracing::debug!(
                "OMDb has no entry for {}: {}",
                imdb_id,
                omdb_data.error.as_deref().unwrap_or("unknown error")
            );
            return Err(MetadataError::NotFound {
                imdb_id: imdb_id.to_string(),
            });
        }

        omdb_data
            .title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
            .ok_or_else(|| MetadataError::NotFound {
                imdb_id: imdb_id.to_string(),
            })
    }
}
