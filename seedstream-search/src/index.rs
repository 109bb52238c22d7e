//! Torrent index access over the tracker's HTTP interface.

use async_trait::async_trait;
use reqwest::StatusCode;
use seedstream_core::config::TrackerConfig;
use serde::Deserialize;

use crate::errors::SourceError;
use crate::extractors::{DetailsPageExtractor, Obligation, ObligationPageExtractor, PageExtractor};
use crate::session::SessionManager;
use crate::types::{RawHit, SearchPage, SearchTerm};

/// Operations the aggregator needs from a torrent source.
#[async_trait]
pub trait TorrentIndex: Send + Sync {
    /// Short name of the source, used in play URLs.
    fn source_name(&self) -> &str;

    /// Makes sure a valid session exists.
    async fn authenticate(&self) -> Result<(), SourceError>;

    /// Fetches one page (1-based) of search results.
    async fn search_page(&self, term: &SearchTerm, page: u32) -> Result<SearchPage, SourceError>;

    /// Fetches the raw `.torrent` bytes for a source id.
    async fn fetch_torrent(&self, source_id: &str) -> Result<Vec<u8>, SourceError>;

    /// Reads the seeding obligation listing.
    async fn obligations(&self) -> Result<Vec<Obligation>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    total: u32,
    #[serde(default)]
    per_page: u32,
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ResultId {
    Number(u64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: ResultId,
    #[serde(default)]
    title: String,
    #[serde(default)]
    seeders: u32,
}

impl From<SearchResult> for RawHit {
    fn from(result: SearchResult) -> Self {
        let source_id = match result.id {
            ResultId::Number(id) => id.to_string(),
            ResultId::Text(id) => id,
        };
        RawHit {
            source_id,
            title: result.title,
            seeders: result.seeders,
        }
    }
}

/// Parses a search response body.
///
/// The tracker answers zero hits with an empty or HTML body instead of JSON.
///
/// # Errors
///
/// - `SourceError::Extraction` - Body looks like JSON but does not parse
pub fn parse_search_body(body: &str) -> Result<SearchPage, SourceError> {
    let trimmed = body.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('<') {
        return Ok(SearchPage::default());
    }

    let response: SearchResponse =
        serde_json::from_str(trimmed).map_err(|e| SourceError::Extraction {
            reason: format!("invalid search response: {e}"),
        })?;

    Ok(SearchPage {
        total: response.total,
        per_page: response.per_page,
        hits: response.results.into_iter().map(RawHit::from).collect(),
    })
}

/// Tracker index reached over HTTP with a shared login session.
#[derive(Debug)]
pub struct HttpTrackerIndex {
    client: reqwest::Client,
    base_url: url::Url,
    source_name: String,
    session: SessionManager,
}

impl HttpTrackerIndex {
    /// Creates an index client for the configured tracker.
    ///
    /// # Errors
    ///
    /// - `SourceError::SourceUnavailable` - Base URL invalid or client could not be built
    pub fn new(config: &TrackerConfig) -> Result<Self, SourceError> {
        let unavailable = |reason: String| SourceError::SourceUnavailable {
            source_name: config.source_name.clone(),
            reason,
        };

        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url =
            url::Url::parse(&base).map_err(|e| unavailable(format!("invalid base URL: {e}")))?;

        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            source_name: config.source_name.clone(),
            session: SessionManager::new(config)?,
        })
    }

    fn url(&self, path: &str) -> Result<url::Url, SourceError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| SourceError::Extraction {
                reason: format!("invalid URL {path}: {e}"),
            })
    }

    fn unavailable(&self, reason: String) -> SourceError {
        SourceError::SourceUnavailable {
            source_name: self.source_name.clone(),
            reason,
        }
    }

    /// Sends an authenticated GET and checks the status.
    async fn get(&self, url: url::Url, what: &str) -> Result<reqwest::Response, SourceError> {
        let cookie = self.session.cookie().await?;

        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::COOKIE, cookie)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    self.unavailable(format!("{what} timed out"))
                } else {
                    self.unavailable(format!("{what} failed: {e}"))
                }
            })?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.session.invalidate().await;
                Err(SourceError::AuthenticationFailed {
                    source_name: self.source_name.clone(),
                    reason: format!("{what} rejected the session"),
                })
            }
            StatusCode::NOT_FOUND => Err(SourceError::NotFound {
                source_name: self.source_name.clone(),
                what: what.to_string(),
            }),
            status => Err(self.unavailable(format!("{what} answered {status} for {url}"))),
        }
    }

    async fn text(&self, response: reqwest::Response, what: &str) -> Result<String, SourceError> {
        response
            .text()
            .await
            .map_err(|e| self.unavailable(format!("{what} body failed: {e}")))
    }
}

#[async_trait]
impl TorrentIndex for HttpTrackerIndex {
    fn source_name(&self) -> &str {
        &self.source_name
    }

    async fn authenticate(&self) -> Result<(), SourceError> {
        self.session.cookie().await.map(|_| ())
    }

    async fn search_page(&self, term: &SearchTerm, page: u32) -> Result<SearchPage, SourceError> {
        let mut url = self.url("api/search")?;
        {
            let mut query = url.query_pairs_mut();
            match term {
                SearchTerm::ImdbId(imdb_id) => query.append_pair("imdb", imdb_id),
                SearchTerm::Name(name) => query.append_pair("q", name),
            };
            query.append_pair("page", &page.to_string());
        }

        let response = self.get(url, "search").await?;
        let body = self.text(response, "search").await?;
        let page = parse_search_body(&body)?;

        tracing::debug!(
            "Search {:?} returned {} hits ({} total)",
            term,
            page.hits.len(),
            page.total
        );
        Ok(page)
    }

    async fn fetch_torrent(&self, source_id: &str) -> Result<Vec<u8>, SourceError> {
        let details_url = self.url(&format!("details/{}", urlencoding::encode(source_id)))?;
        let response = self
            .get(details_url.clone(), &format!("details {source_id}"))
            .await?;
        let html = self.text(response, "details").await?;

        let href = DetailsPageExtractor.extract(&html)?;
        let download_url = details_url
            .join(&href)
            .map_err(|e| SourceError::Extraction {
                reason: format!("invalid download link {href}: {e}"),
            })?;

        let response = self
            .get(download_url, &format!("torrent {source_id}"))
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.unavailable(format!("torrent download failed: {e}")))?;

        Ok(bytes.to_vec())
    }

    async fn obligations(&self) -> Result<Vec<Obligation>, SourceError> {
        let response = self.get(self.url("obligations")?, "obligations").await?;
        let html = self.text(response, "obligations").await?;
        ObligationPageExtractor.extract(&html)
    }
}
