use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};

use attention_core::landmarks::{HEAD_POSE, LEFT_EYE, LEFT_IRIS, RIGHT_EYE, RIGHT_IRIS};
use attention_core::{
    AlertType, AttentionPipeline, BoundingBox, CoreError, Detection, FaceDetector, FaceLandmarks, Frame,
    HeadPose, HeadPoseSolver, LandmarkDetector, Point, TrackerConfig, VisionConfig,
};

struct ScriptedDetector {
    frames: VecDeque<Result<Vec<Detection>, CoreError>>,
    released: Arc<AtomicUsize>,
}

impl FaceDetector for ScriptedDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, CoreError> {
        self.frames.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }

    fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// 返回睁眼正视的关键点；x 落在 `missing_left_of` 左侧的人脸返回 None，宽度为 0 的框报错
struct StubLandmarks {
    missing_left_of: f64,
}

impl LandmarkDetector for StubLandmarks {
    fn detect(&mut self, _frame: &Frame, face: &BoundingBox) -> Result<Option<FaceLandmarks>, CoreError> {
        if face.width == 0.0 {
            return Err(CoreError::Landmarks("empty region".into()));
        }
        if face.x < self.missing_left_of {
            return Ok(None);
        }
        Ok(Some(open_eyes_at(face.x)))
    }
}

struct FixedPose(HeadPose);

impl HeadPoseSolver for FixedPose {
    fn solve(&self, _points: &[Point; 6], _w: u32, _h: u32) -> Result<HeadPose, CoreError> {
        Ok(self.0)
    }
}

fn open_eyes_at(ox: f64) -> FaceLandmarks {
    let eye = [
        Point::new(ox, 0.0),
        Point::new(ox + 10.0, -6.0),
        Point::new(ox + 20.0, -6.0),
        Point::new(ox + 30.0, 0.0),
        Point::new(ox + 20.0, 6.0),
        Point::new(ox + 10.0, 6.0),
    ];
    let iris = [Point::new(ox + 15.0, 0.0); 5];
    // 姿态点先写入，眼角索引随后被眼部坐标覆盖
    let mut pts: Vec<(usize, Point)> = HEAD_POSE.iter().map(|&i| (i, Point::new(ox, 50.0))).collect();
    pts.extend(LEFT_EYE.iter().copied().zip(eye));
    pts.extend(RIGHT_EYE.iter().copied().zip(eye));
    pts.extend(LEFT_IRIS.iter().copied().zip(iris));
    pts.extend(RIGHT_IRIS.iter().copied().zip(iris));
    FaceLandmarks::from_indexed(pts)
}

fn face_at(x: f64) -> Detection {
    Detection::new(BoundingBox::new(x, 0.0, 100.0, 100.0), 0.9)
}

fn frame() -> Frame {
    Frame::new(640, 480, Vec::new())
}

fn pipeline(
    script: Vec<Result<Vec<Detection>, CoreError>>,
    pose: HeadPose,
    config: VisionConfig,
) -> (AttentionPipeline<ScriptedDetector, StubLandmarks, FixedPose>, Arc<AtomicUsize>) {
    let released = Arc::new(AtomicUsize::new(0));
    let detector = ScriptedDetector {
        frames: script.into(),
        released: released.clone(),
    };
    let p = AttentionPipeline::new(config, detector, StubLandmarks { missing_left_of: 0.0 }, FixedPose(pose))
        .with_session("room-1");
    (p, released)
}

#[test]
fn frontal_face_scores_full_attention() {
    let (mut p, _) = pipeline(vec![Ok(vec![face_at(10.0)])], HeadPose::default(), VisionConfig::default());
    let result = p.process_frame(&frame()).expect("frame");
    assert_eq!(result.frame_id, 1);
    assert_eq!(result.session_id.as_deref(), Some("room-1"));
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].track_id, 1);
    assert_eq!(result.results[0].attention_score, 100.0);
    assert!(result.alerts.is_empty());
}

#[test]
fn zero_detections_produce_empty_frame() {
    let (mut p, _) = pipeline(vec![Ok(vec![])], HeadPose::default(), VisionConfig::default());
    let result = p.process_frame(&frame()).expect("frame");
    assert!(result.results.is_empty());
    assert!(result.alerts.is_empty());
}

#[test]
fn missing_landmarks_score_absent_face() {
    let (mut p, _) = pipeline(vec![Ok(vec![face_at(-50.0)])], HeadPose::default(), VisionConfig::default());
    let result = p.process_frame(&frame()).expect("frame");
    assert_eq!(result.results.len(), 1);
    let r = &result.results[0];
    assert!(!r.metrics.is_present);
    assert_eq!(r.attention_score, 0.0);
}

#[test]
fn landmark_failure_drops_only_that_face() {
    let broken = Detection::new(BoundingBox::new(500.0, 0.0, 0.0, 100.0), 0.9);
    let (mut p, _) = pipeline(
        vec![Ok(vec![face_at(10.0), broken])],
        HeadPose::default(),
        VisionConfig::default(),
    );
    let result = p.process_frame(&frame()).expect("frame");
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.results[0].track_id, 1);
}

#[test]
fn detector_error_fails_the_frame() {
    let (mut p, _) = pipeline(
        vec![Err(CoreError::Detection("model offline".into()))],
        HeadPose::default(),
        VisionConfig::default(),
    );
    assert!(matches!(p.process_frame(&frame()), Err(CoreError::Detection(_))));
}

#[test]
fn looking_away_alert_fires_after_debounce() {
    let turned = HeadPose { yaw: 60.0, pitch: 0.0, roll: 0.0 };
    let script = (0..7).map(|_| Ok(vec![face_at(10.0)])).collect();
    let (mut p, _) = pipeline(script, turned, VisionConfig::default());
    let t0 = Utc::now();
    let mut away_alerts = Vec::new();
    for sec in 0..7 {
        let result = p.process_frame_at(&frame(), t0 + Duration::seconds(sec)).expect("frame");
        for alert in result.alerts {
            if alert.alert_type == AlertType::LookingAway {
                away_alerts.push(sec);
            }
        }
    }
    assert_eq!(away_alerts, vec![5]);
}

#[test]
fn eviction_cascades_into_per_track_state() {
    let config = VisionConfig {
        tracker: TrackerConfig {
            track_buffer: 1,
            ..TrackerConfig::default()
        },
        ..VisionConfig::default()
    };
    let script = vec![Ok(vec![face_at(10.0)]), Ok(vec![]), Ok(vec![])];
    let (mut p, _) = pipeline(script, HeadPose::default(), config);
    p.process_frame(&frame()).expect("frame");
    assert_eq!(p.blink().tracked_ids(), vec![1]);
    assert_eq!(p.scorer().tracked_ids(), vec![1]);
    p.process_frame(&frame()).expect("frame");
    assert_eq!(p.tracker().active_tracks(), 1);
    p.process_frame(&frame()).expect("frame");
    assert_eq!(p.tracker().active_tracks(), 0);
    assert!(p.blink().tracked_ids().is_empty());
    assert!(p.gaze().tracked_ids().is_empty());
    assert!(p.scorer().tracked_ids().is_empty());
}

#[test]
fn reset_and_release() {
    let (mut p, released) = pipeline(
        vec![Ok(vec![face_at(10.0)]), Ok(vec![face_at(10.0)])],
        HeadPose::default(),
        VisionConfig::default(),
    );
    p.process_frame(&frame()).expect("frame");
    p.reset();
    assert_eq!(p.frame_count(), 0);
    assert!(p.blink().tracked_ids().is_empty());
    let result = p.process_frame(&frame()).expect("frame");
    assert_eq!(result.results[0].track_id, 1);
    p.release();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}
