//! 头部姿态适配层
//!
//! 从关键点中取出 6 个标准点（鼻尖、下巴、左右眼外角、左右嘴角），
//! 连同画面尺寸交给外部求解器（透视投影求解视为黑盒），得到 yaw/pitch/roll（度）。

use crate::error::CoreError;
use crate::geometry::Point;
use crate::landmarks::{FaceLandmarks, HEAD_POSE};
use crate::types::HeadPose;

/// 由 6 个标准点求解欧拉角
pub trait HeadPoseSolver: Send + Sync {
    /// `points` 顺序：鼻尖、下巴、左眼外角、右眼外角、左嘴角、右嘴角
    fn solve(&self, points: &[Point; 6], frame_width: u32, frame_height: u32) -> Result<HeadPose, CoreError>;

    /// 释放底层资源
    fn release(&self) {}
}

pub struct HeadPoseEstimator<S> {
    solver: S,
}

impl<S: HeadPoseSolver> HeadPoseEstimator<S> {
    pub fn new(solver: S) -> Self {
        Self { solver }
    }

    /// 标准点不全时返回 `InsufficientLandmarks`
    pub fn estimate(&self, landmarks: &FaceLandmarks, frame_width: u32, frame_height: u32) -> Result<HeadPose, CoreError> {
        let points = landmarks.head_pose_points();
        let points: [Point; 6] = points.try_into().map_err(|got: Vec<Point>| CoreError::InsufficientLandmarks {
            needed: HEAD_POSE.len(),
            got: got.len(),
        })?;
        self.solver.solve(&points, frame_width, frame_height)
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn release(&self) {
        self.solver.release();
    }
}

/// 不依赖相机标定的近似求解：
/// - roll：两眼外角连线与水平线夹角
/// - yaw：鼻尖相对两眼中点的水平偏移 / 眼距
/// - pitch：鼻尖在眼线与下巴之间的相对位置偏离中性位置
#[derive(Debug, Clone, Copy)]
pub struct GeometricPoseSolver {
    /// 中性姿态下鼻尖位于眼线到下巴的比例
    pub neutral_nose_ratio: f64,
}

impl Default for GeometricPoseSolver {
    fn default() -> Self {
        Self {
            neutral_nose_ratio: 0.4,
        }
    }
}

impl HeadPoseSolver for GeometricPoseSolver {
    fn solve(&self, points: &[Point; 6], _frame_width: u32, _frame_height: u32) -> Result<HeadPose, CoreError> {
        let [nose, chin, left_eye, right_eye, _, _] = *points;

        let eye_span = left_eye.distance(&right_eye);
        if eye_span < 1.0 {
            return Err(CoreError::HeadPose("degenerate eye span".into()));
        }
        let eye_mid = left_eye.midpoint(&right_eye);
        let face_height = eye_mid.distance(&chin);
        if face_height < 1.0 {
            return Err(CoreError::HeadPose("degenerate face height".into()));
        }

        let (dx, dy) = (left_eye.x - right_eye.x, left_eye.y - right_eye.y);
        let roll = dy.atan2(dx).to_degrees();

        let yaw_ratio = ((nose.x - eye_mid.x) / (eye_span / 2.0)).clamp(-1.0, 1.0);
        let yaw = yaw_ratio.asin().to_degrees();

        let nose_ratio = (nose.y - eye_mid.y) / face_height;
        let pitch_ratio = ((nose_ratio - self.neutral_nose_ratio) / self.neutral_nose_ratio).clamp(-1.0, 1.0);
        let pitch = pitch_ratio.asin().to_degrees();

        Ok(HeadPose { yaw, pitch, roll })
    }
}
