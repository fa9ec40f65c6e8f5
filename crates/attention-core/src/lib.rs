//! 注意力检测核心算法库
//!
//! 在人脸检测与关键点模型之上运行的纯算法层，与具体推理框架无关。
//!
//! ## 模块
//! - `geometry`: 点、边界框与 IoU
//! - `landmarks`: 关键点集合及眼部/虹膜/姿态子集
//! - `tracker`: 多人脸跟踪（贪心 IoU 匹配，持久 ID）
//! - `blink`: EAR、PERCLOS 与眨眼检测
//! - `gaze`: 基于虹膜偏移的视线估计与平滑
//! - `head_pose`: 头部姿态求解器适配层
//! - `scorer`: 注意力评分与告警去抖状态机
//! - `pipeline`: 单进程逐帧处理流水线

pub mod blink;
pub mod config;
pub mod error;
pub mod gaze;
pub mod geometry;
pub mod head_pose;
pub mod landmarks;
pub mod pipeline;
pub mod scorer;
pub mod tracker;
pub mod types;

pub use blink::BlinkDetector;
pub use config::{AttentionConfig, BlinkConfig, GazeConfig, TrackerConfig, VisionConfig};
pub use error::CoreError;
pub use gaze::{GazeSmoother, GazeTracker};
pub use geometry::{BoundingBox, Point};
pub use head_pose::{GeometricPoseSolver, HeadPoseEstimator, HeadPoseSolver};
pub use landmarks::FaceLandmarks;
pub use pipeline::{AttentionPipeline, FaceDetector, Frame, LandmarkDetector};
pub use scorer::AttentionScorer;
pub use tracker::{FaceTracker, TrackerOutput};
pub use types::{
    Alert, AlertSeverity, AlertType, AttentionMetrics, AttentionResult, BlinkInfo, Detection, FrameResult,
    GazeInfo, HeadPose, TrackInfo, TrackedFace,
};

/// 跟踪 ID，单调递增且永不复用
pub type TrackId = u64;
