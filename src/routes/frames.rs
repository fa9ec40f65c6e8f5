use axum::extract::State;
use axum::routing::post;
use axum::{Extension, Json, Router};

use crate::middleware::RequestId;
use crate::orchestrator::{FrameRequest, FrameResponse};
use crate::response::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/process", post(process_frame))
}

/// 未携带 request_id 时沿用 `x-request-id`
pub async fn process_frame(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    Json(mut request): Json<FrameRequest>,
) -> Result<Json<FrameResponse>, AppError> {
    if request.frame_data.trim().is_empty() {
        return Err(AppError::bad_request("INVALID_FRAME", "frame_data is required"));
    }
    if request.session_id.as_deref().is_some_and(|s| s.trim().is_empty()) {
        request.session_id = None;
    }
    if request.request_id.is_none() {
        request.request_id = request_id.map(|Extension(RequestId(id))| id);
    }

    Ok(Json(state.orchestrator().process_frame(request).await))
}
