//! 检测阶段的类型化客户端
//!
//! 每个阶段一个 trait，编排器只依赖 trait；生产环境使用 [`http`] 中基于 reqwest 的实现，
//! 测试中可替换为内存实现。

pub mod http;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use attention_core::HeadPose;

use crate::config::ServicesConfig;

pub use wire::{
    BlinkReading, BlinkRequest, ComponentScores, FaceBox, FaceLandmarkSet, GazeReading,
    GazeRequest, HeadPoseRequest, ResetRequest, ScoreReading, ScoreRequest, WireAlert,
    WireLandmark,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("{service} timed out")]
    Timeout { service: &'static str },
    #[error("{service} unreachable: {message}")]
    Connect {
        service: &'static str,
        message: String,
    },
    #[error("{service} returned HTTP {status}")]
    Status { service: &'static str, status: u16 },
    #[error("{service} rejected request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
    #[error("{service} response could not be decoded: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
    #[error("{service} request failed: {message}")]
    Transport {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn service(&self) -> &'static str {
        match self {
            Self::Timeout { service }
            | Self::Connect { service, .. }
            | Self::Status { service, .. }
            | Self::Rejected { service, .. }
            | Self::Decode { service, .. }
            | Self::Transport { service, .. } => service,
        }
    }
}

#[async_trait]
pub trait FaceDetectionClient: Send + Sync {
    async fn detect(&self, frame_data: &str, request_id: &str) -> Result<Vec<FaceBox>, ServiceError>;
}

#[async_trait]
pub trait LandmarkClient: Send + Sync {
    /// 一次批量调用返回本帧所有人脸的关键点
    async fn detect(
        &self,
        frame_data: &str,
        faces: &[FaceBox],
        request_id: &str,
    ) -> Result<Vec<FaceLandmarkSet>, ServiceError>;
}

#[async_trait]
pub trait HeadPoseClient: Send + Sync {
    async fn estimate(&self, request: &HeadPoseRequest) -> Result<HeadPose, ServiceError>;
}

#[async_trait]
pub trait GazeClient: Send + Sync {
    async fn track(&self, request: &GazeRequest) -> Result<GazeReading, ServiceError>;

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait BlinkClient: Send + Sync {
    async fn detect(&self, request: &BlinkRequest) -> Result<BlinkReading, ServiceError>;

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait ScorerClient: Send + Sync {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreReading, ServiceError>;

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError>;
}

/// 编排器使用的全部阶段客户端
#[derive(Clone)]
pub struct StageClients {
    pub face_detection: Arc<dyn FaceDetectionClient>,
    pub landmarks: Arc<dyn LandmarkClient>,
    pub head_pose: Arc<dyn HeadPoseClient>,
    pub gaze: Arc<dyn GazeClient>,
    pub blink: Arc<dyn BlinkClient>,
    pub scorer: Arc<dyn ScorerClient>,
}

impl StageClients {
    pub fn http(config: &ServicesConfig) -> Self {
        let client = http::build_client(config.timeout_ms);
        let endpoint = |url: &str, service: &'static str| {
            http::JsonEndpoint::new(client.clone(), url, service, config.connect_attempts)
        };

        Self {
            face_detection: Arc::new(http::HttpFaceDetection(endpoint(
                &config.face_detection_url,
                "face-detection",
            ))),
            landmarks: Arc::new(http::HttpLandmarks(endpoint(
                &config.landmark_detection_url,
                "landmark-detection",
            ))),
            head_pose: Arc::new(http::HttpHeadPose(endpoint(&config.head_pose_url, "head-pose"))),
            gaze: Arc::new(http::HttpGaze(endpoint(&config.gaze_tracking_url, "gaze-tracking"))),
            blink: Arc::new(http::HttpBlink(endpoint(
                &config.blink_detection_url,
                "blink-detection",
            ))),
            scorer: Arc::new(http::HttpScorer(endpoint(
                &config.attention_scorer_url,
                "attention-scorer",
            ))),
        }
    }
}
