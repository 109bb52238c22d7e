//! Endpoint tests driving the router in-process.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use seedstream_core::engine::test_mocks::{MockTransferEngine, mock_byte_at};
use seedstream_core::{InfoHash, SeedstreamConfig, TorrentMetainfo, TorrentStore};
use seedstream_search::extractors::Obligation;
use seedstream_search::types::{RawHit, SearchPage, SearchTerm};
use seedstream_search::{MetadataError, SourceAggregator, SourceError, TitleMetadata, TorrentIndex};
use seedstream_web::{AppState, create_router};
use tower::ServiceExt;

const MOVIE_TORRENT: &[u8] = b"d4:infod6:lengthi5000e4:name14:Movie.2019.mkv12:piece lengthi16384e6:pieces20:12345678901234567890ee";
const OTHER_TORRENT: &[u8] = b"d4:infod6:lengthi3000e4:name9:Other.mp412:piece lengthi16384e6:pieces20:12345678901234567890ee";

struct FakeIndex {
    torrents: HashMap<String, Vec<u8>>,
}

#[async_trait]
impl TorrentIndex for FakeIndex {
    fn source_name(&self) -> &str {
        "fake"
    }

    async fn authenticate(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn search_page(&self, term: &SearchTerm, _page: u32) -> Result<SearchPage, SourceError> {
        match term {
            SearchTerm::ImdbId(id) if id == "tt0111161" => Ok(SearchPage {
                total: 1,
                per_page: 20,
                hits: vec![RawHit {
                    source_id: "7".to_string(),
                    title: "Movie 2019 1080p".to_string(),
                    seeders: 12,
                }],
            }),
            _ => Ok(SearchPage::default()),
        }
    }

    async fn fetch_torrent(&self, source_id: &str) -> Result<Vec<u8>, SourceError> {
        self.torrents
            .get(source_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                source_name: "fake".to_string(),
                what: format!("details {source_id}"),
            })
    }

    async fn obligations(&self) -> Result<Vec<Obligation>, SourceError> {
        Ok(Vec::new())
    }
}

struct NoMetadata;

#[async_trait]
impl TitleMetadata for NoMetadata {
    async fn display_name(&self, imdb_id: &str) -> Result<String, MetadataError> {
        Err(MetadataError::NotFound {
            imdb_id: imdb_id.to_string(),
        })
    }
}

struct TestApp {
    _dir: tempfile::TempDir,
    router: Router,
    engine: MockTransferEngine,
    store: Arc<TorrentStore>,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = SeedstreamConfig::for_testing(dir.path());

    let engine = MockTransferEngine::new();
    let store = Arc::new(
        TorrentStore::open(config.storage.clone(), Arc::new(engine.clone()))
            .await
            .unwrap(),
    );

    let mut torrents = HashMap::new();
    torrents.insert("7".to_string(), MOVIE_TORRENT.to_vec());
    let aggregator = SourceAggregator::new(
        Arc::new(FakeIndex { torrents }),
        Arc::new(NoMetadata),
        &config.search,
    );

    let state = AppState::new(store.clone(), Arc::new(aggregator), config);
    TestApp {
        _dir: dir,
        router: create_router(state),
        engine,
        store,
    }
}

fn movie_hash() -> InfoHash {
    TorrentMetainfo::from_bytes(MOVIE_TORRENT).unwrap().info_hash
}

fn play_uri(source_id: &str, info_hash: &str, file_index: &str) -> String {
    format!("/stream/play/fake/{source_id}/{info_hash}/{file_index}")
}

async fn send(app: &TestApp, method: &str, uri: &str, range: Option<&str>) -> axum::response::Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }
    app.router
        .clone()
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn header_value(response: &axum::response::Response, name: header::HeaderName) -> String {
    response
        .headers()
        .get(name)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_head_reports_size_and_loads_torrent() {
    let app = test_app().await;
    let uri = play_uri("7", &movie_hash().to_string(), "0");

    let response = send(&app, "HEAD", &uri, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_value(&response, header::CONTENT_LENGTH), "5000");
    assert_eq!(header_value(&response, header::ACCEPT_RANGES), "bytes");
    assert_eq!(header_value(&response, header::CONTENT_TYPE), "video/x-matroska");
    assert!(body_bytes(response).await.is_empty());
    assert!(app.store.get(movie_hash()).is_some());
    assert_eq!(app.engine.registration_count(), 1);
}

#[tokio::test]
async fn test_explicit_range_is_served_verbatim() {
    let app = test_app().await;
    let info_hash = movie_hash();
    let uri = play_uri("7", &info_hash.to_string(), "0");

    let response = send(&app, "GET", &uri, Some("bytes=1000-2000")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_value(&response, header::CONTENT_RANGE), "bytes 1000-2000/5000");
    assert_eq!(header_value(&response, header::CONTENT_LENGTH), "1001");
    assert_eq!(
        header_value(&response, header::CACHE_CONTROL),
        "public, max-age=604800"
    );

    let body = body_bytes(response).await;
    let expected: Vec<u8> = (1000..=2000).map(mock_byte_at).collect();
    assert_eq!(body, expected);

    // Seek past zero prioritizes a forward window, clamped to the file
    assert_eq!(app.engine.priorities(), vec![(info_hash, 0, 1000..5000)]);
}

#[tokio::test]
async fn test_byte_zero_is_widened_on_every_request() {
    let app = test_app().await;
    let info_hash = movie_hash();
    let uri = play_uri("7", &info_hash.to_string(), "0");

    let cold = send(&app, "GET", &uri, Some("bytes=0-99")).await;
    assert_eq!(header_value(&cold, header::CONTENT_RANGE), "bytes 0-1023/5000");
    assert_eq!(body_bytes(cold).await.len(), 1024);

    let warm = send(&app, "GET", &uri, Some("bytes=0-99")).await;
    assert_eq!(header_value(&warm, header::CONTENT_RANGE), "bytes 0-1023/5000");
    assert_eq!(body_bytes(warm).await.len(), 1024);

    // The warm request also prefetches ahead, clamped to the file
    assert_eq!(
        app.engine.priorities(),
        vec![(info_hash, 0, 0..1024), (info_hash, 0, 0..4096)]
    );
}

#[tokio::test]
async fn test_first_get_after_head_is_widened() {
    let app = test_app().await;
    let uri = play_uri("7", &movie_hash().to_string(), "0");

    let head = send(&app, "HEAD", &uri, None).await;
    assert_eq!(head.status(), StatusCode::OK);

    let response = send(&app, "GET", &uri, Some("bytes=0-99")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(header_value(&response, header::CONTENT_RANGE), "bytes 0-1023/5000");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_cold_plays_all_succeed() {
    let app = test_app().await;
    let uri = play_uri("7", &movie_hash().to_string(), "0");

    let (a, b, c) = tokio::join!(
        send(&app, "GET", &uri, Some("bytes=0-99")),
        send(&app, "GET", &uri, Some("bytes=1000-1999")),
        send(&app, "GET", &uri, Some("bytes=4000-"))
    );

    for response in [a, b, c] {
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    }
    assert_eq!(app.engine.registration_count(), 1);
    assert_eq!(app.store.len(), 1);
}

#[tokio::test]
async fn test_missing_or_invalid_range_is_416() {
    let app = test_app().await;
    let uri = play_uri("7", &movie_hash().to_string(), "0");

    for range in [None, Some("bytes=6000-"), Some("bytes=200-100"), Some("items=0-1")] {
        let response = send(&app, "GET", &uri, range).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{range:?}");
        assert_eq!(header_value(&response, header::CONTENT_RANGE), "bytes */5000");
    }
}

#[tokio::test]
async fn test_bad_parameters_are_400() {
    let app = test_app().await;
    let info_hash = movie_hash().to_string();

    let bad_index = send(&app, "GET", &play_uri("7", &info_hash, "3"), Some("bytes=0-1")).await;
    assert_eq!(bad_index.status(), StatusCode::BAD_REQUEST);

    let not_a_number = send(&app, "GET", &play_uri("7", &info_hash, "first"), None).await;
    assert_eq!(not_a_number.status(), StatusCode::BAD_REQUEST);

    let bad_hash = send(&app, "GET", &play_uri("7", "not-a-hash", "0"), None).await;
    assert_eq!(bad_hash.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unresolvable_torrent_is_404() {
    let app = test_app().await;
    let other_hash = TorrentMetainfo::from_bytes(OTHER_TORRENT)
        .unwrap()
        .info_hash
        .to_string();

    let unknown_id = send(&app, "HEAD", &play_uri("404", &other_hash, "0"), None).await;
    assert_eq!(unknown_id.status(), StatusCode::NOT_FOUND);

    // Source id resolves, but to a different torrent
    let mismatch = send(&app, "HEAD", &play_uri("7", &other_hash, "0"), None).await;
    assert_eq!(mismatch.status(), StatusCode::NOT_FOUND);

    let unknown_source = format!("/stream/play/elsewhere/7/{}/0", movie_hash());
    let response = send(&app, "HEAD", &unknown_source, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(app.store.is_empty());
}

#[tokio::test]
async fn test_stream_listing() {
    let app = test_app().await;

    let response = send(&app, "GET", "/stream/movie/tt0111161", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let streams = body["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["recommended"], true);
    assert_eq!(streams[0]["speculative"], false);
    assert_eq!(streams[0]["fileIdx"], 0);
    assert!(
        streams[0]["url"]
            .as_str()
            .unwrap()
            .ends_with(&format!("/stream/play/fake/7/{}/0", movie_hash()))
    );
}

#[tokio::test]
async fn test_stream_listing_without_hits_is_empty() {
    let app = test_app().await;

    let response = send(&app, "GET", "/stream/series/tt7654321?season=1&episode=3", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body["streams"], serde_json::json!([]));
}

#[tokio::test]
async fn test_invalid_media_type_is_400() {
    let app = test_app().await;

    let response = send(&app, "GET", "/stream/music/tt0111161", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;

    let response = send(&app, "GET", "/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(body, serde_json::json!({"status": "ok", "torrents": 0}));
}
