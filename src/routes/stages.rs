//! 视线、眨眼、评分阶段的 HTTP 入口，报文与编排器的阶段客户端一致

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::clients::{BlinkReading, BlinkRequest, GazeReading, GazeRequest, ResetRequest, ScoreReading, ScoreRequest};
use crate::response::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/gaze/track", post(track_gaze))
        .route("/gaze/reset", post(reset_gaze))
        .route("/blink/detect", post(detect_blink))
        .route("/blink/reset", post(reset_blink))
        .route("/attention/score", post(score_attention))
        .route("/attention/reset", post(reset_attention))
}

fn reset_ack() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true }))
}

pub async fn track_gaze(
    State(state): State<AppState>,
    Json(request): Json<GazeRequest>,
) -> Result<Json<GazeReading>, AppError> {
    Ok(Json(state.stages().gaze.track(&request).await?))
}

pub async fn reset_gaze(State(state): State<AppState>, Json(request): Json<ResetRequest>) -> impl IntoResponse {
    state.stages().gaze.reset(&request).await;
    reset_ack()
}

pub async fn detect_blink(
    State(state): State<AppState>,
    Json(request): Json<BlinkRequest>,
) -> Result<Json<BlinkReading>, AppError> {
    Ok(Json(state.stages().blink.detect(&request).await?))
}

pub async fn reset_blink(State(state): State<AppState>, Json(request): Json<ResetRequest>) -> impl IntoResponse {
    state.stages().blink.reset(&request).await;
    reset_ack()
}

pub async fn score_attention(
    State(state): State<AppState>,
    Json(request): Json<ScoreRequest>,
) -> Json<ScoreReading> {
    Json(state.stages().attention.score(&request).await)
}

pub async fn reset_attention(
    State(state): State<AppState>,
    Json(request): Json<ResetRequest>,
) -> impl IntoResponse {
    state.stages().attention.reset(&request).await;
    reset_ack()
}
