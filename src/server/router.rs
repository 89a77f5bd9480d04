//! HTTP surface: the websocket endpoint, screenshot artifacts, and health.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::fs;

use crate::server::state::ServeState;
use crate::server::ws::ws_handler;

pub fn build_router(state: ServeState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(health_handler))
        .route("/artifacts/:session_id/:file", get(artifact_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<ServeState>) -> impl IntoResponse {
    let snapshot = state.health.snapshot();
    let status = if snapshot.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "live": snapshot.live,
            "ready": snapshot.ready,
            "lastReadyCheck": snapshot.last_ready_check,
            "lastError": snapshot.last_error,
            "activeSessions": state.orchestrator.active_session_count(),
        })),
    )
}

async fn artifact_handler(
    State(state): State<ServeState>,
    Path((session_id, file)): Path<(String, String)>,
) -> impl IntoResponse {
    // Artifact names are generated server-side; anything else is rejected.
    if session_id.contains("..")
        || session_id.contains('/')
        || file.contains("..")
        || file.contains('/')
    {
        return (StatusCode::BAD_REQUEST, "invalid artifact path").into_response();
    }
    let path = state.artifacts_root.join(&session_id).join(&file);
    match fs::read(&path).await {
        Ok(bytes) => {
            let content_type = if file.ends_with(".png") {
                "image/png"
            } else if file.ends_with(".json") {
                "application/json"
            } else {
                "application/octet-stream"
            };
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(_) => (StatusCode::NOT_FOUND, "artifact not found").into_response(),
    }
}
