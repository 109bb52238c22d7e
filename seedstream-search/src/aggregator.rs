//! Source aggregation: search, enrichment, fallback and ranking.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use seedstream_core::batch::{collect_successes, fail_fast};
use seedstream_core::SeedstreamConfig;
use seedstream_core::config::SearchConfig;
use seedstream_core::store::{RemovableTorrents, StoreError};
use seedstream_core::{BatchFetcher, InfoHash, QueryCache, TorrentMetainfo};

use crate::errors::SourceError;
use crate::index::{HttpTrackerIndex, TorrentIndex};
use crate::metadata::{OmdbMetadata, TitleMetadata};
use crate::selection::select_file;
use crate::types::{CandidateFile, RawHit, SearchTerm, StreamRequest, TorrentCandidate};

fn cache_key(key: &str) -> String {
    key.to_string()
}

/// Search outcome that must not be stored in the result cache.
enum Uncacheable {
    Source(SourceError),
    /// Hits were found but none could be enriched
    EnrichmentFailed,
}

impl From<SourceError> for Uncacheable {
    fn from(error: SourceError) -> Self {
        Self::Source(error)
    }
}

/// Finds ranked, playable torrents for a title across one tracker.
///
/// Identifier search runs first. When it yields no playable candidate the
/// title's display name is looked up and searched instead; those results
/// are marked speculative. Both result lists and display names are cached.
pub struct SourceAggregator {
    index: Arc<dyn TorrentIndex>,
    metadata: Arc<dyn TitleMetadata>,
    fetcher: BatchFetcher,
    max_pages: u32,
    results: QueryCache<str, Vec<TorrentCandidate>>,
    display_names: QueryCache<str, String>,
}

impl SourceAggregator {
    /// Creates an aggregator over an index and a metadata provider.
    pub fn new(
        index: Arc<dyn TorrentIndex>,
        metadata: Arc<dyn TitleMetadata>,
        config: &SearchConfig,
    ) -> Self {
        Self {
            index,
            metadata,
            fetcher: BatchFetcher::from_config(config),
            max_pages: config.max_pages.max(1),
            results: QueryCache::new(cache_key, config.cache_ttl, config.cache_capacity),
            display_names: QueryCache::new(cache_key, config.cache_ttl, config.cache_capacity),
        }
    }

    /// Builds the HTTP tracker and OMDb clients from configuration.
    ///
    /// # Errors
    ///
    /// - `SourceError::SourceUnavailable` - A client could not be constructed
    pub fn from_config(config: &SeedstreamConfig) -> Result<Self, SourceError> {
        let index = HttpTrackerIndex::new(&config.tracker)?;
        let metadata = OmdbMetadata::new(&config.metadata, config.tracker.request_timeout)
            .map_err(|e| SourceError::SourceUnavailable {
                source_name: "metadata".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self::new(Arc::new(index), Arc::new(metadata), &config.search))
    }

    /// Name of the underlying source.
    pub fn source_name(&self) -> &str {
        self.index.source_name()
    }

    /// Returns ranked candidates for a request.
    ///
    /// Ranking is non-speculative first, then seeders descending, then
    /// source id ascending. Fallback failures are logged and produce an
    /// empty list.
    ///
    /// # Errors
    ///
    /// - `SourceError::AuthenticationFailed` - Login failed before searching
    /// - `SourceError::SourceUnavailable` - Identifier search failed upstream
    pub async fn find(&self, request: &StreamRequest) -> Result<Vec<TorrentCandidate>, SourceError> {
        let identifier_key = request.identifier_cache_key();

        let primary = self
            .results
            .get_or_try_insert_with(&identifier_key, || async {
                self.index.authenticate().await?;
                let term = SearchTerm::ImdbId(request.imdb_id.clone());
                self.search_candidates(&term, request, false).await
            })
            .await;
        let primary = match primary {
            Ok(candidates) => candidates,
            Err(Uncacheable::EnrichmentFailed) => Vec::new(),
            Err(Uncacheable::Source(e)) => return Err(e),
        };

        if !primary.is_empty() {
            return Ok(primary);
        }

        match self.find_speculative(request).await {
            Ok(candidates) => Ok(candidates),
            Err(e) => {
                tracing::warn!(
                    "Fallback search for {} failed, returning no streams: {}",
                    request.imdb_id,
                    e
                );
                Ok(Vec::new())
            }
        }
    }

    async fn find_speculative(
        &self,
        request: &StreamRequest,
    ) -> Result<Vec<TorrentCandidate>, Box<dyn std::error::Error + Send + Sync>> {
        let display_name = self
            .display_names
            .get_or_try_insert_with(&request.imdb_id, || {
                self.metadata.display_name(&request.imdb_id)
            })
            .await?;

        let name_key = request.name_cache_key(&display_name);
        let candidates = self
            .results
            .get_or_try_insert_with(&name_key, || async {
                tracing::info!(
                    "No identifier hits for {}, searching by name '{}'",
                    request.imdb_id,
                    display_name
                );
                self.index.authenticate().await?;
                let term = SearchTerm::Name(display_name.clone());
                self.search_candidates(&term, request, true).await
            })
            .await;

        match candidates {
            Ok(candidates) => Ok(candidates),
            Err(Uncacheable::EnrichmentFailed) => Ok(Vec::new()),
            Err(Uncacheable::Source(e)) => Err(e.into()),
        }
    }

    /// Searches, enriches, filters and ranks.
    ///
    /// Fails with `Uncacheable::EnrichmentFailed` when hits were found but
    /// none of their torrents could be fetched.
    async fn search_candidates(
        &self,
        term: &SearchTerm,
        request: &StreamRequest,
        is_speculative: bool,
    ) -> Result<Vec<TorrentCandidate>, Uncacheable> {
        let hits = self.search_all_pages(term).await?;
        let hit_count = hits.len();

        let enriched = self
            .fetcher
            .map_concurrently(hits, move |hit| self.enrich(hit, request, is_speculative))
            .await;
        let enriched = collect_successes("Skipping search hit", enriched);
        if hit_count > 0 && enriched.is_empty() {
            tracing::warn!("Search {:?}: all {} hits failed to resolve", term, hit_count);
            return Err(Uncacheable::EnrichmentFailed);
        }

        let candidates: Vec<TorrentCandidate> = enriched.into_iter().flatten().collect();
        let mut candidates = dedup_by_info_hash(candidates);
        rank_candidates(&mut candidates);

        tracing::info!(
            "Search {:?}: {} hits, {} playable candidates",
            term,
            hit_count,
            candidates.len()
        );
        Ok(candidates)
    }

    /// First page, then every remaining page concurrently (fail-fast).
    async fn search_all_pages(&self, term: &SearchTerm) -> Result<Vec<RawHit>, SourceError> {
        let first = self.index.search_page(term, 1).await?;
        let page_count = first.page_count().min(self.max_pages);

        let mut hits = first.hits;
        if page_count > 1 {
            let rest = fail_fast((2..=page_count).map(|page| self.index.search_page(term, page))).await?;
            for page in rest {
                hits.extend(page.hits);
            }
        }

        let mut seen = std::collections::HashSet::new();
        hits.retain(|hit| seen.insert(hit.source_id.clone()));
        Ok(hits)
    }

    /// Fetches and parses a hit's torrent; `None` when nothing is playable.
    async fn enrich(
        &self,
        hit: RawHit,
        request: &StreamRequest,
        is_speculative: bool,
    ) -> Result<Option<TorrentCandidate>, SourceError> {
        let bytes = self.index.fetch_torrent(&hit.source_id).await?;
        let metainfo = parse_torrent(&hit.source_id, &bytes)?;

        let Some(file_index) = select_file(&metainfo, request) else {
            tracing::debug!("No playable file in {} ({})", hit.title, hit.source_id);
            return Ok(None);
        };

        Ok(Some(TorrentCandidate {
            source_name: self.index.source_name().to_string(),
            source_id: hit.source_id,
            title: hit.title,
            info_hash: metainfo.info_hash,
            seeders: hit.seeders,
            files: metainfo
                .files
                .iter()
                .map(|file| CandidateFile {
                    path: file.display_path(),
                    length: file.length,
                })
                .collect(),
            file_index,
            is_speculative,
        }))
    }

    /// Fetches raw torrent bytes for a source id.
    ///
    /// # Errors
    ///
    /// - `SourceError::NotFound` - Unknown source id
    /// - `SourceError::InvalidTorrent` - Bytes are not a torrent file
    /// - `SourceError::AuthenticationFailed` / `SourceError::SourceUnavailable` - Upstream failure
    pub async fn fetch_torrent(&self, source_id: &str) -> Result<Vec<u8>, SourceError> {
        self.index.authenticate().await?;
        let bytes = self.index.fetch_torrent(source_id).await?;
        parse_torrent(source_id, &bytes)?;
        Ok(bytes)
    }

    /// Info hashes of torrents the tracker no longer needs seeded.
    ///
    /// Source ids that cannot be resolved are logged and skipped.
    ///
    /// # Errors
    ///
    /// - `SourceError::AuthenticationFailed` / `SourceError::SourceUnavailable` - Obligation page unavailable
    pub async fn removable_info_hashes(&self) -> Result<Vec<InfoHash>, SourceError> {
        self.index.authenticate().await?;
        let source_ids: Vec<String> = self
            .index
            .obligations()
            .await?
            .into_iter()
            .filter(|obligation| obligation.is_removable())
            .map(|obligation| obligation.source_id)
            .collect();

        let resolved = self
            .fetcher
            .map_concurrently(source_ids, move |source_id| async move {
                let bytes = self.index.fetch_torrent(&source_id).await?;
                Ok::<_, SourceError>(parse_torrent(&source_id, &bytes)?.info_hash)
            })
            .await;
        let info_hashes = collect_successes("Skipping removable torrent", resolved);

        tracing::info!("{} torrents reported removable", info_hashes.len());
        Ok(info_hashes)
    }
}

#[async_trait]
impl RemovableTorrents for SourceAggregator {
    async fn removable_info_hashes(&self) -> Result<Vec<InfoHash>, StoreError> {
        SourceAggregator::removable_info_hashes(self)
            .await
            .map_err(|e| StoreError::Removable {
                reason: e.to_string(),
            })
    }
}

fn parse_torrent(source_id: &str, bytes: &[u8]) -> Result<TorrentMetainfo, SourceError> {
    TorrentMetainfo::from_bytes(bytes).map_err(|e| SourceError::InvalidTorrent {
        source_id: source_id.to_string(),
        reason: e.to_string(),
    })
}

fn dedup_by_info_hash(candidates: Vec<TorrentCandidate>) -> Vec<TorrentCandidate> {
    let mut by_hash: HashMap<InfoHash, TorrentCandidate> = HashMap::new();
    for candidate in candidates {
        match by_hash.get(&candidate.info_hash) {
            Some(existing) if compare_candidates(existing, &candidate) != Ordering::Greater => {}
            _ => {
                by_hash.insert(candidate.info_hash, candidate);
            }
        }
    }
    by_hash.into_values().collect()
}

/// Numeric ids compare numerically, anything else lexically.
fn compare_source_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

fn compare_candidates(a: &TorrentCandidate, b: &TorrentCandidate) -> Ordering {
    a.is_speculative
        .cmp(&b.is_speculative)
        .then_with(|| b.seeders.cmp(&a.seeders))
        .then_with(|| compare_source_ids(&a.source_id, &b.source_id))
}

/// Sorts into the total order used for stream listings.
pub fn rank_candidates(candidates: &mut [TorrentCandidate]) {
    candidates.sort_by(compare_candidates);
}
