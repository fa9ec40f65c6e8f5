use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use futures::Stream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::hub::channel_name;
use crate::response::{ok, AppError};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:id/events", get(session_events))
        .route("/:id/reset", post(reset_session))
        .route("/:id", delete(remove_session))
}

/// 订阅会话的逐帧结果；只推送订阅之后发布的帧，不补发
pub async fn session_events(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let guard = state
        .hub()
        .try_acquire_sse(state.config().limits.max_sse_connections)
        .ok_or_else(|| AppError::too_many_requests("Too many SSE connections"))?;

    let mut shutdown_rx = state.shutdown_rx();
    let mut updates = BroadcastStream::new(state.hub().subscribe(&session_id).await);
    tracing::debug!(channel = %channel_name(&session_id), "sse subscriber attached");

    let stream = async_stream::stream! {
        let _guard = guard;
        loop {
            tokio::select! {
                item = updates.next() => match item {
                    Some(Ok(payload)) => {
                        yield Ok(Event::default().event("frame").data(&*payload));
                    }
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        tracing::debug!(session_id = %session_id, skipped, "sse subscriber lagged");
                    }
                    None => break,
                },
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.orchestrator().reset_session(&session_id).await {
        return Err(AppError::not_found("Session not found"));
    }
    Ok(ok(serde_json::json!({ "sessionId": session_id, "reset": true })))
}

pub async fn remove_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if !state.orchestrator().remove_session(&session_id).await {
        return Err(AppError::not_found("Session not found"));
    }
    Ok(ok(serde_json::json!({ "sessionId": session_id, "removed": true })))
}
