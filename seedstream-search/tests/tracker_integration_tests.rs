//! Aggregator tests against an in-process mock tracker.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use seedstream_core::{SeedstreamConfig, TorrentMetainfo};
use seedstream_search::{SessionManager, SourceAggregator, SourceError, StreamRequest};
use serde_json::json;

const PASSWORD: &str = "hunter2";
const SESSION_COOKIE: &str = "sid=f00d";

fn single_file_torrent(name: &str, length: u64) -> Vec<u8> {
    format!(
        "d4:infod6:lengthi{length}e4:name{}:{name}12:piece lengthi16384e6:pieces20:12345678901234567890ee",
        name.len()
    )
    .into_bytes()
}

fn season_pack_torrent() -> Vec<u8> {
    let files = ["The.Show.S01E01.mkv", "The.Show.S01E02.mkv", "The.Show.S01E03.mkv"]
        .iter()
        .map(|name| format!("d6:lengthi700e4:pathl{}:{name}ee", name.len()))
        .collect::<String>();
    format!(
        "d4:infod5:filesl{files}e4:name12:The.Show.S0112:piece lengthi16384e6:pieces20:12345678901234567890ee"
    )
    .into_bytes()
}

#[derive(Default)]
struct MockTracker {
    logins: AtomicUsize,
    searches: AtomicUsize,
    torrents: HashMap<String, Vec<u8>>,
    /// Overrides the one hour session lifetime
    session_max_age: Option<u64>,
    /// Rejects every issued cookie while set
    revoked: AtomicBool,
}

type Shared = Arc<MockTracker>;

fn authorized(tracker: &MockTracker, headers: &HeaderMap) -> bool {
    !tracker.revoked.load(Ordering::SeqCst)
        && headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|cookie| cookie.contains(SESSION_COOKIE))
}

async fn login(State(tracker): State<Shared>, Form(form): Form<HashMap<String, String>>) -> Response {
    tracker.logins.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(20)).await;
    if form.get("password").map(String::as_str) != Some(PASSWORD) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                format!(
                    "{SESSION_COOKIE}; Path=/; Max-Age={}",
                    tracker.session_max_age.unwrap_or(3600)
                ),
            ),
        ],
    )
        .into_response()
}

async fn search(
    State(tracker): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&tracker, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    tracker.searches.fetch_add(1, Ordering::SeqCst);

    let page = params.get("page").map(String::as_str).unwrap_or("1");
    match (params.get("imdb").map(String::as_str), params.get("q").map(String::as_str)) {
        (Some("tt1234567"), _) => {
            let results = match page {
                "1" => json!([{"id": 1, "title": "Movie 2019 720p", "seeders": 10}]),
                _ => json!([{"id": 2, "title": "Movie 2019 1080p", "seeders": 25}]),
            };
            Json(json!({"total": 2, "per_page": 1, "results": results})).into_response()
        }
        (_, Some("The Show")) => Json(json!({
            "total": 1,
            "per_page": 20,
            "results": [{"id": "3", "title": "The Show S01 Complete", "seeders": 4}]
        }))
        .into_response(),
        _ => Html("<html><body>No torrents found</body></html>").into_response(),
    }
}

async fn details(State(tracker): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !authorized(&tracker, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    Html(format!(
        r#"<html><body><h1>Torrent {id}</h1><a class="download-link" href="/download/{id}">Download</a></body></html>"#
    ))
    .into_response()
}

async fn download(State(tracker): State<Shared>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    if !authorized(&tracker, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    match tracker.torrents.get(&id) {
        Some(bytes) => Bytes::from(bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn obligations(State(tracker): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&tracker, &headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    Html(
        r#"<table>
             <tr data-source-id="1"><td>Movie 720p</td><td class="status">Complete</td></tr>
             <tr data-source-id="2"><td>Movie 1080p</td><td class="status">Seeding</td></tr>
           </table>"#,
    )
    .into_response()
}

async fn omdb(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    match params.get("i").map(String::as_str) {
        Some("tt0000001") => Json(json!({"Title": "The Show", "Response": "True"})),
        _ => Json(json!({"Response": "False", "Error": "Incorrect IMDb ID."})),
    }
}

/// Starts the mock tracker and returns its base URL.
async fn start_tracker(tracker: Shared) -> String {
    let app = Router::new()
        .route("/login", post(login))
        .route("/api/search", get(search))
        .route("/details/{id}", get(details))
        .route("/download/{id}", get(download))
        .route("/obligations", get(obligations))
        .route("/omdb/", get(omdb))
        .with_state(tracker);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

fn tracker_with_torrents() -> Shared {
    let mut torrents = HashMap::new();
    torrents.insert("1".to_string(), single_file_torrent("Movie.2019.720p.mkv", 7_000));
    torrents.insert("2".to_string(), single_file_torrent("Movie.2019.1080p.mkv", 9_000));
    torrents.insert("3".to_string(), season_pack_torrent());
    Arc::new(MockTracker {
        torrents,
        ..MockTracker::default()
    })
}

fn config_for(dir: &tempfile::TempDir, base_url: &str, password: &str) -> SeedstreamConfig {
    let mut config = SeedstreamConfig::for_testing(dir.path());
    config.tracker.source_name = "mock".to_string();
    config.tracker.base_url = base_url.to_string();
    config.tracker.username = "viewer".to_string();
    config.tracker.password = password.to_string();
    config.metadata.base_url = format!("{base_url}/omdb");
    config
}

async fn aggregator_for(base_url: &str, password: &str) -> (tempfile::TempDir, SourceAggregator) {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, base_url, password);

    let aggregator = SourceAggregator::from_config(&config).unwrap();
    (dir, aggregator)
}

#[tokio::test]
async fn test_movie_search_across_pages() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker.clone()).await;
    let (_dir, aggregator) = aggregator_for(&base_url, PASSWORD).await;

    let candidates = aggregator.find(&StreamRequest::movie("tt1234567")).await.unwrap();

    let ids: Vec<_> = candidates.iter().map(|c| c.source_id.as_str()).collect();
    assert_eq!(ids, vec!["2", "1"]);
    assert!(candidates.iter().all(|c| !c.is_speculative));
    assert_eq!(candidates[0].source_name, "mock");
    assert_eq!(candidates[0].selected_file().unwrap().length, 9_000);
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 1);
    assert_eq!(tracker.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_repeat_query_served_from_cache() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker.clone()).await;
    let (_dir, aggregator) = aggregator_for(&base_url, PASSWORD).await;
    let request = StreamRequest::movie("tt1234567");

    let first = aggregator.find(&request).await.unwrap();
    let second = aggregator.find(&request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(tracker.searches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_episode_falls_back_to_name_search() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker.clone()).await;
    let (_dir, aggregator) = aggregator_for(&base_url, PASSWORD).await;

    let candidates = aggregator
        .find(&StreamRequest::episode("tt0000001", 1, 2))
        .await
        .unwrap();

    assert_eq!(candidates.len(), 1);
    let candidate = &candidates[0];
    assert!(candidate.is_speculative);
    assert_eq!(candidate.source_id, "3");
    assert_eq!(candidate.file_index, 1);
    assert_eq!(
        candidate.selected_file().unwrap().path,
        "The.Show.S01E02.mkv"
    );
}

#[tokio::test]
async fn test_unknown_title_yields_no_streams() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker).await;
    let (_dir, aggregator) = aggregator_for(&base_url, PASSWORD).await;

    let candidates = aggregator.find(&StreamRequest::movie("tt9999999")).await.unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_rejected_login_is_authentication_failure() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker.clone()).await;
    let (_dir, aggregator) = aggregator_for(&base_url, "wrong").await;

    let result = aggregator.find(&StreamRequest::movie("tt1234567")).await;

    assert!(matches!(result, Err(SourceError::AuthenticationFailed { .. })));
    assert_eq!(tracker.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fetch_torrent_and_unknown_id() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker).await;
    let (_dir, aggregator) = aggregator_for(&base_url, PASSWORD).await;

    let bytes = aggregator.fetch_torrent("2").await.unwrap();
    let metainfo = TorrentMetainfo::from_bytes(&bytes).unwrap();
    assert_eq!(metainfo.name, "Movie.2019.1080p.mkv");

    let missing = aggregator.fetch_torrent("404").await;
    assert!(matches!(missing, Err(SourceError::NotFound { .. })));
}

#[tokio::test]
async fn test_removable_torrents_from_obligations() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker).await;
    let (_dir, aggregator) = aggregator_for(&base_url, PASSWORD).await;

    let removable = aggregator.removable_info_hashes().await.unwrap();

    let expected = TorrentMetainfo::from_bytes(&single_file_torrent("Movie.2019.720p.mkv", 7_000))
        .unwrap()
        .info_hash;
    assert_eq!(removable, vec![expected]);
}

fn session_manager(base_url: &str) -> (tempfile::TempDir, SessionManager) {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(&dir, base_url, PASSWORD);
    let manager = SessionManager::new(&config.tracker).unwrap();
    (dir, manager)
}

#[tokio::test]
async fn test_concurrent_callers_share_one_login() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker.clone()).await;
    let (_dir, sessions) = session_manager(&base_url);

    let (a, b, c, d) = tokio::join!(
        sessions.cookie(),
        sessions.cookie(),
        sessions.cookie(),
        sessions.cookie()
    );

    for cookie in [a, b, c, d] {
        assert_eq!(cookie.unwrap(), SESSION_COOKIE);
    }
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expiring_session_is_refreshed() {
    let tracker = Arc::new(MockTracker {
        session_max_age: Some(2),
        ..MockTracker::default()
    });
    let base_url = start_tracker(tracker.clone()).await;
    let (_dir, sessions) = session_manager(&base_url);

    sessions.cookie().await.unwrap();
    sessions.cookie().await.unwrap();
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 1);

    // Inside the one second margin the session counts as expired
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    sessions.cookie().await.unwrap();
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_login_without_usable_lifetime_is_rejected() {
    let tracker = Arc::new(MockTracker {
        session_max_age: Some(1),
        ..MockTracker::default()
    });
    let base_url = start_tracker(tracker).await;
    let (_dir, sessions) = session_manager(&base_url);

    let result = sessions.cookie().await;
    assert!(matches!(result, Err(SourceError::AuthenticationFailed { .. })));
}

#[tokio::test]
async fn test_rejected_session_triggers_login() {
    let tracker = tracker_with_torrents();
    let base_url = start_tracker(tracker.clone()).await;
    let (_dir, aggregator) = aggregator_for(&base_url, PASSWORD).await;

    aggregator.fetch_torrent("1").await.unwrap();
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 1);

    tracker.revoked.store(true, Ordering::SeqCst);
    let rejected = aggregator.fetch_torrent("1").await;
    assert!(matches!(rejected, Err(SourceError::AuthenticationFailed { .. })));

    tracker.revoked.store(false, Ordering::SeqCst);
    aggregator.fetch_torrent("1").await.unwrap();
    assert_eq!(tracker.logins.load(Ordering::SeqCst), 2);
}
