//! 视线估计模块
//!
//! 以虹膜中心相对眼眶中心的偏移估计视线方向，按半眼宽/半眼高归一化到 [-1, 1]。
//! 左右眼都有效时取平均，否则取有效的一只。

use std::collections::HashMap;

use crate::config::GazeConfig;
use crate::geometry::Point;
use crate::landmarks::FaceLandmarks;
use crate::types::GazeInfo;
use crate::TrackId;

/// 单眼视线；眼部点 < 6、虹膜点 < 5 或眼宽/眼高 < 1 像素时为 None
pub fn single_eye_gaze(eye: &[Point], iris: &[Point]) -> Option<GazeInfo> {
    if eye.len() < 6 || iris.len() < 5 {
        return None;
    }
    let width = eye[0].distance(&eye[3]);
    let height = eye[1].distance(&eye[5]);
    if width < 1.0 || height < 1.0 {
        return None;
    }
    let iris_center = Point::centroid(iris)?;
    let eye_center = eye[0].midpoint(&eye[3]);

    Some(GazeInfo {
        x: ((iris_center.x - eye_center.x) / (width / 2.0)).clamp(-1.0, 1.0),
        y: ((iris_center.y - eye_center.y) / (height / 2.0)).clamp(-1.0, 1.0),
    })
}

/// 视线指数平滑：smoothed = α·current + (1-α)·previous，首个样本直接通过
#[derive(Debug, Clone)]
pub struct GazeSmoother {
    alpha: f64,
    previous: Option<GazeInfo>,
}

impl GazeSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            previous: None,
        }
    }

    pub fn smooth(&mut self, gaze: GazeInfo) -> GazeInfo {
        let smoothed = match self.previous {
            None => gaze,
            Some(prev) => GazeInfo {
                x: self.alpha * gaze.x + (1.0 - self.alpha) * prev.x,
                y: self.alpha * gaze.y + (1.0 - self.alpha) * prev.y,
            },
        };
        self.previous = Some(smoothed);
        smoothed
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}

pub struct GazeTracker {
    config: GazeConfig,
    smoothers: HashMap<TrackId, GazeSmoother>,
}

impl GazeTracker {
    pub fn new(config: GazeConfig) -> Self {
        Self {
            config,
            smoothers: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }

    pub fn estimate(&self, landmarks: &FaceLandmarks) -> Option<GazeInfo> {
        let left = single_eye_gaze(&landmarks.left_eye(), &landmarks.left_iris());
        let right = single_eye_gaze(&landmarks.right_eye(), &landmarks.right_iris());
        match (left, right) {
            (Some(l), Some(r)) => Some(GazeInfo {
                x: (l.x + r.x) / 2.0,
                y: (l.y + r.y) / 2.0,
            }),
            (Some(g), None) | (None, Some(g)) => Some(g),
            (None, None) => None,
        }
    }

    /// 估计并经该轨迹的平滑器处理；平滑器按需创建
    pub fn estimate_smoothed(&mut self, landmarks: &FaceLandmarks, track_id: TrackId) -> Option<GazeInfo> {
        let raw = self.estimate(landmarks)?;
        let alpha = self.config.smoothing_alpha;
        let smoother = self
            .smoothers
            .entry(track_id)
            .or_insert_with(|| GazeSmoother::new(alpha));
        Some(smoother.smooth(raw))
    }

    /// 1 表示正视中心，偏离达到阈值时为 0
    pub fn score(&self, gaze: &GazeInfo) -> f64 {
        gaze_score(gaze, self.config.gaze_threshold)
    }

    pub fn is_looking_at_camera(&self, gaze: &GazeInfo) -> bool {
        gaze.distance_from_center() < self.config.gaze_threshold
    }

    pub fn reset_track(&mut self, track_id: TrackId) {
        self.smoothers.remove(&track_id);
    }

    pub fn reset_all(&mut self) {
        self.smoothers.clear();
    }

    pub fn tracked_ids(&self) -> Vec<TrackId> {
        self.smoothers.keys().copied().collect()
    }
}

impl Default for GazeTracker {
    fn default() -> Self {
        Self::new(GazeConfig::default())
    }
}

pub fn gaze_score(gaze: &GazeInfo, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 0.0;
    }
    let distance = gaze.distance_from_center();
    (1.0 - (distance / threshold).min(1.0)).max(0.0)
}
