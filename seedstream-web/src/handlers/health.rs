//! Liveness check.

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::server::AppState;

/// Health report.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers
    pub status: &'static str,
    /// Number of loaded torrents
    pub torrents: usize,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        torrents: state.store.len(),
    })
}
