//! Stream listing for a title.

use axum::Json;
use axum::extract::{Path, Query, State};
use seedstream_core::InfoHash;
use seedstream_search::{MediaType, StreamRequest, TorrentCandidate};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::server::AppState;

/// Optional episode selection for series.
#[derive(Debug, Default, Deserialize)]
pub struct EpisodeQuery {
    /// Season number
    pub season: Option<u32>,
    /// Episode number within the season
    pub episode: Option<u32>,
}

/// Caller-facing description of one playable stream.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    /// Source the torrent came from
    pub name: String,
    /// Human readable title with file name and size
    pub title: String,
    /// Play URL served by this server
    pub url: String,
    /// Info hash of the torrent
    pub info_hash: InfoHash,
    /// Index of the file the URL plays
    pub file_idx: usize,
    /// Seeder count reported by the source
    pub seeders: u32,
    /// Size of the selected file in bytes
    pub size: u64,
    /// Set on the first entry only
    pub recommended: bool,
    /// Found through the name-based fallback
    pub speculative: bool,
}

/// Response body of the stream listing.
#[derive(Debug, Serialize)]
pub struct StreamsResponse {
    /// Ranked streams, best first
    pub streams: Vec<StreamDescriptor>,
}

/// Parses path and query into a request.
///
/// # Errors
///
/// - `ApiError::Validation` - Unknown media type, malformed id or half an episode
pub fn parse_stream_request(
    media_type: &str,
    imdb_id: &str,
    query: &EpisodeQuery,
) -> Result<StreamRequest, ApiError> {
    let media_type: MediaType = media_type.parse::<MediaType>().map_err(|e| ApiError::Validation {
        reason: e.to_string(),
    })?;

    let imdb_id = imdb_id.trim();
    let valid_id = imdb_id
        .strip_prefix("tt")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()));
    if !valid_id {
        return Err(ApiError::Validation {
            reason: format!("invalid IMDb id: {imdb_id}"),
        });
    }

    match (media_type, query.season, query.episode) {
        (MediaType::Movie, _, _) => Ok(StreamRequest::movie(imdb_id)),
        (MediaType::Series, Some(season), Some(episode)) => {
            Ok(StreamRequest::episode(imdb_id, season, episode))
        }
        (MediaType::Series, None, None) => Ok(StreamRequest {
            media_type: MediaType::Series,
            ..StreamRequest::movie(imdb_id)
        }),
        (MediaType::Series, _, _) => Err(ApiError::Validation {
            reason: "season and episode must be given together".to_string(),
        }),
    }
}

/// Formats a byte count for display.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Builds descriptors in rank order, flagging the first as recommended.
pub fn describe_candidates(public_url: &str, candidates: &[TorrentCandidate]) -> Vec<StreamDescriptor> {
    let base = public_url.trim_end_matches('/');

    candidates
        .iter()
        .enumerate()
        .filter_map(|(rank, candidate)| {
            let file = candidate.selected_file()?;
            let file_name = file.path.rsplit('/').next().unwrap_or(&file.path);
            let marker = if candidate.is_speculative {
                "[speculative] "
            } else {
                ""
            };

            Some(StreamDescriptor {
                name: candidate.source_name.clone(),
                title: format!(
                    "{marker}{}\n{} ({}, {} seeders)",
                    candidate.title,
                    file_name,
                    format_size(file.length),
                    candidate.seeders
                ),
                url: format!(
                    "{base}/stream/play/{}/{}/{}/{}",
                    urlencoding::encode(&candidate.source_name),
                    urlencoding::encode(&candidate.source_id),
                    candidate.info_hash,
                    candidate.file_index
                ),
                info_hash: candidate.info_hash,
                file_idx: candidate.file_index,
                seeders: candidate.seeders,
                size: file.length,
                recommended: rank == 0,
                speculative: candidate.is_speculative,
            })
        })
        .collect()
}

/// `GET /stream/{type}/{imdb_id}`
///
/// Source failures are logged and answered with an empty list.
///
/// # Errors
///
/// - `ApiError::Validation` - Malformed media type, id or episode
pub async fn list_streams(
    State(state): State<AppState>,
    Path((media_type, imdb_id)): Path<(String, String)>,
    Query(query): Query<EpisodeQuery>,
) -> Result<Json<StreamsResponse>, ApiError> {
    let request = parse_stream_request(&media_type, &imdb_id, &query)?;

    let candidates = match state.aggregator.find(&request).await {
        Ok(candidates) => candidates,
        Err(e) => {
            tracing::error!(
                "Stream search for {} on {} failed: {}",
                request.imdb_id,
                state.aggregator.source_name(),
                e
            );
            Vec::new()
        }
    };

    let streams = describe_candidates(&state.config.server.public_url, &candidates);
    tracing::info!(
        "Listing {} streams for {} {}",
        streams.len(),
        request.media_type,
        request.imdb_id
    );
    Ok(Json(StreamsResponse { streams }))
}

#[cfg(test)]
mod tests {
    use seedstream_search::types::CandidateFile;

    use super::*;

    #[test]
    fn test_parse_stream_request() {
        let movie = parse_stream_request("movie", "tt0111161", &EpisodeQuery::default()).unwrap();
        assert_eq!(movie, StreamRequest::movie("tt0111161"));

        let episode = parse_stream_request(
            "series",
            "tt0000001",
            &EpisodeQuery {
                season: Some(1),
                episode: Some(2),
            },
        )
        .unwrap();
        assert_eq!(episode, StreamRequest::episode("tt0000001", 1, 2));

        assert!(parse_stream_request("music", "tt1", &EpisodeQuery::default()).is_err());
        assert!(parse_stream_request("movie", "0111161", &EpisodeQuery::default()).is_err());
        assert!(
            parse_stream_request(
                "series",
                "tt1",
                &EpisodeQuery {
                    season: Some(1),
                    episode: None,
                },
            )
            .is_err()
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_descriptors_flag_first_as_recommended() {
        let candidate = |id: &str, is_speculative| TorrentCandidate {
            source_name: "tracker".to_string(),
            source_id: id.to_string(),
            title: format!("Release {id}"),
            info_hash: InfoHash::new([7; 20]),
            seeders: 3,
            files: vec![CandidateFile {
                path: "Release/movie.mkv".to_string(),
                length: 2048,
            }],
            file_index: 0,
            is_speculative,
        };

        let streams = describe_candidates(
            "http://media.local:7000/",
            &[candidate("1", false), candidate("2", true)],
        );

        assert_eq!(streams.len(), 2);
        assert!(streams[0].recommended);
        assert!(!streams[1].recommended);
        assert!(streams[1].title.starts_with("[speculative] "));
        assert_eq!(
            streams[0].url,
            format!(
                "http://media.local:7000/stream/play/tracker/1/{}/0",
                InfoHash::new([7; 20])
            )
        );
    }
}
