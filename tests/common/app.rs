use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast;

use attention_backend::analysis::ImageSequenceOpener;
use attention_backend::config::{
    AnalysisConfig, Config, LimitsConfig, OrchestratorConfig, ServicesConfig, StageConfig, WorkerConfig,
};
use attention_backend::routes::build_router;
use attention_backend::state::{AppState, Collaborators};
use attention_core::VisionConfig;

use super::mocks::{MockPipeline, RecordingSink};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub pipeline: MockPipeline,
    pub sink: Arc<RecordingSink>,
    pub shutdown_tx: broadcast::Sender<()>,
}

/// 直接构造 Config，避免 set_var 造成多线程测试的环境变量竞态
pub fn test_config() -> Config {
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        cors_origin: "http://localhost:5173".to_string(),
        services: ServicesConfig {
            face_detection_url: "http://127.0.0.1:9".to_string(),
            landmark_detection_url: "http://127.0.0.1:9".to_string(),
            head_pose_url: "http://127.0.0.1:9".to_string(),
            gaze_tracking_url: "http://127.0.0.1:9".to_string(),
            blink_detection_url: "http://127.0.0.1:9".to_string(),
            attention_scorer_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 500,
            connect_attempts: 1,
        },
        orchestrator: OrchestratorConfig {
            stage_timeout_ms: 200,
            publish_capacity: 16,
            default_frame_width: 640,
            default_frame_height: 480,
            session_idle_secs: 1800,
        },
        vision: VisionConfig::default(),
        stages: StageConfig {
            score_window: 30,
            track_idle_secs: 1800,
        },
        analysis: AnalysisConfig {
            status_sink_url: "http://127.0.0.1:9".to_string(),
            default_fps: 30.0,
            progress_every: 10,
            retain_secs: 86_400,
            sink_timeout_ms: 500,
        },
        limits: LimitsConfig {
            max_sse_connections: 4,
            max_body_bytes: 1024 * 1024,
        },
        worker: WorkerConfig {
            is_leader: false,
            enable_analysis_cleanup: false,
        },
    }
}

pub async fn spawn_with(config: Config, pipeline: MockPipeline) -> TestApp {
    let sink = Arc::new(RecordingSink::default());
    let collaborators = Collaborators {
        clients: pipeline.clients(),
        opener: Arc::new(ImageSequenceOpener::new(config.analysis.default_fps)),
        sink: sink.clone(),
    };
    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::new(&config, collaborators, shutdown_tx.clone());
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        pipeline,
        sink,
        shutdown_tx,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_with(test_config(), MockPipeline::default()).await
}
