//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

use crate::AppState;

/// Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": hirelens_common::VERSION,
    }))
}

/// Readiness probe: verifies database connectivity
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "not_ready", "error": e.to_string() })),
        ),
    }
}
