mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::{spawn_test_app, spawn_with, test_config};
use common::http::{post_json, request, response_json};
use common::mocks::MockPipeline;

#[tokio::test]
async fn it_health_live_and_ready() {
    let app = spawn_test_app().await;

    let live = request(&app.app, Method::GET, "/health/live", None, &[]).await;
    assert_eq!(live.status(), StatusCode::OK);

    let ready = request(&app.app, Method::GET, "/health/ready", None, &[]).await;
    assert_eq!(ready.status(), StatusCode::OK);

    let health = request(&app.app, Method::GET, "/health", None, &[]).await;
    let (status, _, body) = response_json(health).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 0);
}

#[tokio::test]
async fn it_metrics_count_frames_and_faces() {
    let app = spawn_with(test_config(), MockPipeline::with_faces(2)).await;

    post_json(&app.app, "/api/frames/process", json!({"frame_data": "aGVsbG8=", "session_id": "s"})).await;
    post_json(&app.app, "/api/frames/process", json!({"frame_data": "aGVsbG8=", "session_id": "s"})).await;

    let resp = request(&app.app, Method::GET, "/health/metrics", None, &[]).await;
    let (status, _, body) = response_json(resp).await;
    assert_eq!(status, StatusCode::OK);
    let pipeline = &body["pipeline"];
    assert_eq!(pipeline["requestsTotal"], 2);
    assert_eq!(pipeline["requestsSuccess"], 2);
    assert_eq!(pipeline["requestsFailed"], 0);
    assert_eq!(pipeline["facesDetectedTotal"], 4);
    assert_eq!(pipeline["processingTimeCount"], 2);
}
