use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::analysis::AnalysisJob;
use crate::response::{accepted, ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_analysis))
        .route("/:id", get(get_analysis).delete(cancel_analysis))
}

/// 立即返回，进度通过状态接收方回调
pub async fn start_analysis(
    State(state): State<AppState>,
    Json(job): Json<AnalysisJob>,
) -> Result<impl IntoResponse, AppError> {
    let analysis_id = job.analysis_id.clone();
    state.analyzer().start(job).await?;
    tracing::info!(analysis_id = %analysis_id, "video analysis started");
    Ok(Json(serde_json::json!({
        "status": "processing",
        "analysis_id": analysis_id,
    })))
}

pub async fn get_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let record = state
        .analyses()
        .get(&analysis_id)
        .await
        .ok_or_else(|| AppError::not_found("Analysis not found"))?;
    Ok(ok(record))
}

pub async fn cancel_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.analyses().cancel(&analysis_id).await?;
    Ok(accepted(serde_json::json!({
        "analysis_id": analysis_id,
        "status": "cancelling",
    })))
}
