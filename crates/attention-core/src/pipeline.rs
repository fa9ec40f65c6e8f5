//! 单进程逐帧处理流水线
//!
//! 检测 → 跟踪 → 对每张人脸：关键点 → 头部姿态 → 视线 → 眨眼 → 评分 → 告警。
//! 同一会话的所有按轨迹状态都归本流水线所有；跟踪器淘汰的轨迹会级联清理眨眼、视线与告警状态。

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::blink::BlinkDetector;
use crate::config::VisionConfig;
use crate::error::CoreError;
use crate::gaze::GazeTracker;
use crate::geometry::BoundingBox;
use crate::head_pose::{HeadPoseEstimator, HeadPoseSolver};
use crate::landmarks::FaceLandmarks;
use crate::scorer::AttentionScorer;
use crate::tracker::FaceTracker;
use crate::types::{Alert, AttentionResult, Detection, FrameResult, TrackedFace};
use crate::TrackId;

/// 已解码的一帧图像
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self { width, height, data }
    }
}

pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, CoreError>;

    fn release(&mut self) {}
}

pub trait LandmarkDetector: Send {
    /// `Ok(None)` 表示该区域未能定位到关键点（人脸仍计为存在于画面，但信号缺失）
    fn detect(&mut self, frame: &Frame, face: &BoundingBox) -> Result<Option<FaceLandmarks>, CoreError>;

    fn release(&mut self) {}
}

pub struct AttentionPipeline<D, L, S> {
    detector: D,
    landmarker: L,
    head_pose: HeadPoseEstimator<S>,
    tracker: FaceTracker,
    blink: BlinkDetector,
    gaze: GazeTracker,
    scorer: AttentionScorer,
    session_id: Option<String>,
    frame_count: u64,
}

impl<D, L, S> AttentionPipeline<D, L, S>
where
    D: FaceDetector,
    L: LandmarkDetector,
    S: HeadPoseSolver,
{
    pub fn new(config: VisionConfig, detector: D, landmarker: L, solver: S) -> Self {
        Self {
            detector,
            landmarker,
            head_pose: HeadPoseEstimator::new(solver),
            tracker: FaceTracker::new(config.tracker),
            blink: BlinkDetector::new(config.blink),
            gaze: GazeTracker::new(config.gaze),
            scorer: AttentionScorer::new(config.attention),
            session_id: None,
            frame_count: 0,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameResult, CoreError> {
        self.process_frame_at(frame, Utc::now())
    }

    /// 以给定时刻作为告警判定时间处理一帧
    pub fn process_frame_at(&mut self, frame: &Frame, now: DateTime<Utc>) -> Result<FrameResult, CoreError> {
        let started = Instant::now();
        self.frame_count += 1;

        let detections = self.detector.detect(frame)?;
        let output = self.tracker.update(&detections);
        for id in &output.evicted {
            self.forget_track(*id);
        }

        let mut results = Vec::with_capacity(output.tracked.len());
        let mut alerts = Vec::new();
        for face in &output.tracked {
            match self.process_face(frame, face, now) {
                Ok((result, face_alerts)) => {
                    results.push(result);
                    alerts.extend(face_alerts);
                }
                Err(err) => {
                    warn!(track_id = face.track_id(), error = %err, "face dropped from frame");
                }
            }
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            frame_id = self.frame_count,
            faces = results.len(),
            alerts = alerts.len(),
            latency_ms,
            "frame processed"
        );

        Ok(FrameResult {
            frame_id: self.frame_count,
            session_id: self.session_id.clone(),
            timestamp: now,
            results,
            alerts,
            latency_ms,
        })
    }

    fn process_face(
        &mut self,
        frame: &Frame,
        face: &TrackedFace,
        now: DateTime<Utc>,
    ) -> Result<(AttentionResult, Vec<Alert>), CoreError> {
        let track_id = face.track_id();
        let bbox = face.detection.bbox;

        let landmarks = self.landmarker.detect(frame, &bbox)?;

        let (pose, gaze, blink, is_present) = match landmarks {
            Some(lm) => {
                let pose = match self.head_pose.estimate(&lm, frame.width, frame.height) {
                    Ok(pose) => Some(pose),
                    Err(err) => {
                        debug!(track_id, error = %err, "head pose unavailable");
                        None
                    }
                };
                let gaze = self.gaze.estimate_smoothed(&lm, track_id);
                let blink = self.blink.analyze(&lm, track_id);
                (pose, gaze, Some(blink), true)
            }
            None => (None, None, None, false),
        };

        let mut result =
            self.scorer
                .process_face(track_id, bbox, pose.as_ref(), gaze.as_ref(), blink.as_ref(), is_present);
        result.timestamp = now;
        let alerts = self
            .scorer
            .check_alerts_at(track_id, &result.metrics, result.attention_score, now);
        Ok((result, alerts))
    }

    fn forget_track(&mut self, track_id: TrackId) {
        self.blink.reset_track(track_id);
        self.gaze.reset_track(track_id);
        self.scorer.reset_track(track_id);
    }

    /// 清空跟踪器与全部按轨迹状态
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.blink.reset_all();
        self.gaze.reset_all();
        self.scorer.reset_all();
        self.frame_count = 0;
    }

    /// 释放检测、关键点与姿态求解器的资源
    pub fn release(&mut self) {
        self.detector.release();
        self.landmarker.release();
        self.head_pose.release();
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn tracker(&self) -> &FaceTracker {
        &self.tracker
    }

    pub fn blink(&self) -> &BlinkDetector {
        &self.blink
    }

    pub fn gaze(&self) -> &GazeTracker {
        &self.gaze
    }

    pub fn scorer(&self) -> &AttentionScorer {
        &self.scorer
    }
}
