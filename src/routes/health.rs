use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health_check))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .route("/metrics", get(metrics))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "uptimeSecs": state.uptime_secs(),
        "sessions": state.orchestrator().sessions().len().await,
        "sseConnections": state.hub().sse_connections(),
    }))
}

pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "pipeline": state.metrics().snapshot(),
        "publishChannels": state.hub().channel_count().await,
        "analyses": state.analyses().len().await,
    }))
}
