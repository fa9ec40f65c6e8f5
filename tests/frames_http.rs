mod common;

use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::{spawn_test_app, spawn_with, test_config};
use attention_backend::clients::WireAlert;
use common::http::{post_json, request, response_json};
use common::mocks::MockPipeline;

#[tokio::test]
async fn it_zero_detections_yield_empty_success() {
    let app = spawn_test_app().await;

    let (status, _, body) = post_json(
        &app.app,
        "/api/frames/process",
        json!({"frame_data": "aGVsbG8=", "session_id": "room-1", "request_id": "r-1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["request_id"], "r-1");
    assert_eq!(body["session_id"], "room-1");
    assert_eq!(body["participants"], json!([]));
    assert!(app.pipeline.score_requests().is_empty());
}

#[tokio::test]
async fn it_faces_are_scored_with_persistent_track_ids() {
    let app = spawn_with(test_config(), MockPipeline::with_faces(2)).await;

    let frame = json!({"frame_data": "aGVsbG8=", "session_id": "room-1"});
    let (_, _, first) = post_json(&app.app, "/api/frames/process", frame.clone()).await;
    let (_, _, second) = post_json(&app.app, "/api/frames/process", frame).await;

    assert_eq!(first["success"], true);
    let ids = |body: &serde_json::Value| -> Vec<u64> {
        body["participants"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["track_id"].as_u64().unwrap())
            .collect()
    };
    assert_eq!(ids(&first), vec![1, 2]);
    assert_eq!(ids(&second), vec![1, 2]);
    assert_eq!(first["participants"][0]["attention_score"], 88.0);
    assert_eq!(first["participants"][0]["degraded_stages"], json!([]));

    let scored = app.pipeline.score_requests();
    assert_eq!(scored.len(), 4);
    assert!(scored.iter().all(|r| r.session_id.as_deref() == Some("room-1")));
}

#[tokio::test]
async fn it_head_pose_timeout_is_scored_with_neutral_pose() {
    let pipeline = MockPipeline::with_faces(1);
    {
        let mut state = pipeline.lock();
        state.head_pose = attention_core::HeadPose { yaw: 40.0, pitch: 0.0, roll: 0.0 };
        state.head_pose_delay = Some(Duration::from_secs(2));
    }
    let app = spawn_with(test_config(), pipeline).await;

    let (status, _, body) = post_json(
        &app.app,
        "/api/frames/process",
        json!({"frame_data": "aGVsbG8=", "session_id": "room-1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let participant = &body["participants"][0];
    assert_eq!(participant["head_pose"], json!({"yaw": 0.0, "pitch": 0.0, "roll": 0.0}));
    assert_eq!(participant["degraded_stages"], json!(["head_pose"]));
    assert_eq!(participant["attention_score"], 88.0);

    let scored = app.pipeline.score_requests();
    assert_eq!(scored.len(), 1);
    assert_eq!(scored[0].head_pose.yaw, 0.0);
}

#[tokio::test]
async fn it_gaze_and_blink_failures_use_neutral_readings() {
    let pipeline = MockPipeline::with_faces(1);
    {
        let mut state = pipeline.lock();
        state.gaze_error = true;
        state.blink_error = true;
    }
    let app = spawn_with(test_config(), pipeline).await;

    let (status, _, body) = post_json(
        &app.app,
        "/api/frames/process",
        json!({"frame_data": "aGVsbG8=", "session_id": "room-1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let participant = &body["participants"][0];
    assert_eq!(
        participant["gaze"],
        json!({"gaze_x": 0.0, "gaze_y": 0.0, "is_looking_at_camera": true, "gaze_angle": 0.0})
    );
    assert_eq!(participant["blink"]["avg_ear"], 0.25);
    assert_eq!(participant["blink"]["perclos"], 0.0);
    assert_eq!(participant["blink"]["is_drowsy"], false);
    assert_eq!(participant["degraded_stages"], json!(["gaze", "blink"]));
    assert_eq!(participant["attention_score"], 88.0);

    let scored = app.pipeline.score_requests();
    assert_eq!(scored.len(), 1);
    assert!(scored[0].gaze.is_looking_at_camera);
    assert_eq!(scored[0].blink.avg_ear, 0.25);
}

#[tokio::test]
async fn it_scorer_failure_uses_neutral_score_without_alerts() {
    let pipeline = MockPipeline::with_faces(1);
    {
        let mut state = pipeline.lock();
        state.scorer_error = true;
        state.alerts = vec![WireAlert {
            alert_type: "LOOKING_AWAY".to_string(),
            message: "Looking away".to_string(),
            severity: "medium".to_string(),
            duration_seconds: 5.0,
            triggered_at: None,
        }];
    }
    let app = spawn_with(test_config(), pipeline).await;

    let (status, _, body) = post_json(
        &app.app,
        "/api/frames/process",
        json!({"frame_data": "aGVsbG8=", "session_id": "room-1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let participant = &body["participants"][0];
    assert_eq!(participant["attention_score"], 75.0);
    assert_eq!(participant["alerts"], json!([]));
    assert_eq!(participant["degraded_stages"], json!(["scorer"]));
    // 其他阶段正常时读数原样透传
    assert_eq!(participant["gaze"]["gaze_x"], 0.4);
    assert_eq!(participant["gaze"]["is_looking_at_camera"], false);
    assert_eq!(participant["blink"]["avg_ear"], 0.3);
    assert_eq!(participant["blink"]["blink_count"], 2);
}

#[tokio::test]
async fn it_scorer_timeout_uses_neutral_score() {
    let pipeline = MockPipeline::with_faces(2);
    pipeline.lock().scorer_delay = Some(Duration::from_secs(2));
    let app = spawn_with(test_config(), pipeline).await;

    let (status, _, body) = post_json(
        &app.app,
        "/api/frames/process",
        json!({"frame_data": "aGVsbG8=", "session_id": "room-1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let participants = body["participants"].as_array().cloned().unwrap_or_default();
    assert_eq!(participants.len(), 2);
    for participant in &participants {
        assert_eq!(participant["attention_score"], 75.0);
        assert_eq!(participant["degraded_stages"], json!(["scorer"]));
    }
}

#[tokio::test]
async fn it_detection_failure_fails_the_frame() {
    let pipeline = MockPipeline::with_faces(1);
    pipeline.lock().detection_error = true;
    let app = spawn_with(test_config(), pipeline).await;

    let (status, _, body) = post_json(&app.app, "/api/frames/process", json!({"frame_data": "aGVsbG8="})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("face-detection"));
    assert_eq!(body["participants"], json!([]));

    let metrics = app.state.metrics().snapshot();
    assert_eq!(metrics.requests_failed, 1);
}

#[tokio::test]
async fn it_landmark_failure_scores_zero() {
    let pipeline = MockPipeline::with_faces(1);
    pipeline.lock().landmark_error = true;
    let app = spawn_with(test_config(), pipeline).await;

    let (_, _, body) = post_json(
        &app.app,
        "/api/frames/process",
        json!({"frame_data": "aGVsbG8=", "session_id": "room-1"}),
    )
    .await;

    assert_eq!(body["success"], true);
    let participant = &body["participants"][0];
    assert_eq!(participant["attention_score"], 0.0);
    assert_eq!(participant["alerts"], json!([]));
    assert_eq!(participant["degraded_stages"], json!(["landmarks"]));
}

#[tokio::test]
async fn it_request_id_defaults_to_header() {
    let app = spawn_test_app().await;

    let resp = request(
        &app.app,
        Method::POST,
        "/api/frames/process",
        Some(json!({"frame_data": "aGVsbG8="})),
        &[("x-request-id", "trace-abc".to_string())],
    )
    .await;
    let (status, headers, body) = response_json(resp).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-request-id"], "trace-abc");
    assert_eq!(body["request_id"], "trace-abc");
}

#[tokio::test]
async fn it_empty_frame_is_rejected() {
    let app = spawn_test_app().await;

    let (status, _, body) = post_json(&app.app, "/api/frames/process", json!({"frame_data": "  "})).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_FRAME");
    assert!(body["traceId"].is_string());
}

#[tokio::test]
async fn it_malformed_body_gets_error_envelope() {
    let app = spawn_test_app().await;

    let (status, _, body) = post_json(&app.app, "/api/frames/process", json!({"session_id": "x"})).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "INVALID_PAYLOAD");
}
