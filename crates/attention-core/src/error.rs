use thiserror::Error;

/// 外部协作者（检测、关键点、姿态求解）可能返回的错误
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("landmark detection failed: {0}")]
    Landmarks(String),
    #[error("head pose solver failed: {0}")]
    HeadPose(String),
    #[error("insufficient landmarks: need {needed}, got {got}")]
    InsufficientLandmarks { needed: usize, got: usize },
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}
