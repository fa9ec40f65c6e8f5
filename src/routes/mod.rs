pub mod analysis;
pub mod frames;
pub mod health;
pub mod sessions;
pub mod stages;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router};

use crate::middleware::request_id_middleware;
use crate::response::ErrorBody;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config().limits.max_body_bytes);

    let api_routes = Router::new()
        .nest("/frames", frames::router())
        .nest("/sessions", sessions::router())
        .nest("/video-analysis", analysis::router());

    Router::new()
        .nest("/api", api_routes)
        .nest("/stages", stages::router())
        .layer(body_limit)
        .nest("/health", health::router())
        .fallback(fallback_404)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            code: "NOT_FOUND".to_string(),
            message: "Not found".to_string(),
            trace_id: None,
        }),
    )
}
