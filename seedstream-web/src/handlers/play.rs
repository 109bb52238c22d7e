//! Range-serving play endpoint.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::Response;
use seedstream_core::{InfoHash, TorrentMetainfo, TorrentResource};

use crate::error::ApiError;
use crate::server::AppState;

/// Browsers and players may cache served bytes for a week.
const CACHE_CONTROL: &str = "public, max-age=604800";

/// Path segments of a play URL.
pub type PlayPath = (String, String, String, String);

/// `GET|HEAD /stream/play/{source_name}/{source_id}/{info_hash}/{file_index}`
///
/// HEAD reports the file size without a body. GET requires a satisfiable
/// `Range` header and answers 206 with the negotiated window.
///
/// # Errors
///
/// - `ApiError::Validation` - Malformed hash or file index out of range
/// - `ApiError::NotFound` - Unknown source or source id
/// - `ApiError::RangeUnsatisfiable` - Missing or invalid `Range`
pub async fn play(
    State(state): State<AppState>,
    method: Method,
    Path((source_name, source_id, info_hash, file_index)): Path<PlayPath>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let info_hash = InfoHash::from_hex(&info_hash).map_err(|_| ApiError::Validation {
        reason: format!("malformed info hash: {info_hash}"),
    })?;
    let file_index: usize = file_index.parse().map_err(|_| ApiError::Validation {
        reason: format!("malformed file index: {file_index}"),
    })?;

    let (resource, is_resume) =
        resolve_resource(&state, &source_name, &source_id, info_hash).await?;
    let file = resource.file(file_index)?;
    let content_type = mime_guess::from_path(&file.path)
        .first_or_octet_stream()
        .to_string();

    if method == Method::HEAD {
        return build_response(StatusCode::OK, &content_type, file.length, None, Body::empty());
    }

    let range_header = headers.get(header::RANGE).and_then(|value| value.to_str().ok());
    let outcome = state
        .negotiator
        .negotiate(range_header, file.length, is_resume)?;

    if let Err(e) = state
        .store
        .prioritize(&resource, file_index, outcome.priority.offset, outcome.priority.len)
        .await
    {
        tracing::warn!("Failed to prioritize {} file {}: {}", info_hash, file_index, e);
    }

    tracing::debug!(
        "Serving {} of {} file {} ({})",
        outcome.range.content_range(file.length),
        info_hash,
        file_index,
        if is_resume { "warm" } else { "cold" }
    );

    let stream = state.store.open_range(&resource, file_index, outcome.range)?;
    build_response(
        StatusCode::PARTIAL_CONTENT,
        &content_type,
        outcome.range.length(),
        Some(outcome.range.content_range(file.length)),
        Body::from_stream(stream),
    )
}

/// Returns the loaded resource, fetching and adding it if needed.
///
/// The flag is true when the resource was already loaded.
async fn resolve_resource(
    state: &AppState,
    source_name: &str,
    source_id: &str,
    info_hash: InfoHash,
) -> Result<(TorrentResource, bool), ApiError> {
    if let Some(resource) = state.store.get(info_hash) {
        return Ok((resource, true));
    }

    if source_name != state.aggregator.source_name() {
        return Err(ApiError::NotFound {
            what: format!("source {source_name}"),
        });
    }

    let bytes = state.aggregator.fetch_torrent(source_id).await?;
    let metainfo = TorrentMetainfo::from_bytes(&bytes)?;
    if metainfo.info_hash != info_hash {
        tracing::warn!(
            "Source id {} resolved to {} instead of {}",
            source_id,
            metainfo.info_hash,
            info_hash
        );
        return Err(ApiError::NotFound {
            what: format!("torrent {info_hash} for source id {source_id}"),
        });
    }

    let resource = state.store.add_torrent_bytes(&bytes).await?;
    tracing::info!("Loaded {} ({}) for playback", resource.name, info_hash);
    Ok((resource, false))
}

fn build_response(
    status: StatusCode,
    content_type: &str,
    content_length: u64,
    content_range: Option<String>,
    body: Body,
) -> Result<Response, ApiError> {
    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, content_length)
        .header(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"))
        .header(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    if let Some(content_range) = content_range {
        builder = builder.header(header::CONTENT_RANGE, content_range);
    }

    builder.body(body).map_err(|e| ApiError::Internal {
        reason: format!("failed to build response: {e}"),
    })
}
