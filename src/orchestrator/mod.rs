//! 分布式逐帧编排
//!
//! 人脸检测 → 会话跟踪器分配轨迹号 → 一次批量关键点调用 → 每张人脸并发调用
//! 头部姿态 / 视线 / 眨眼 → 评分 → 汇总并发布到会话通道。
//! 除人脸检测外，任何阶段失败或超时都会被兜底值替换，并记录在 `degraded_stages` 中。

mod session;
mod stage;

use std::sync::Arc;
use std::time::{Duration, Instant};

use attention_core::{FaceLandmarks, FaceTracker, HeadPose, TrackId, TrackedFace};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::clients::wire::{from_face_landmarks, to_face_landmarks};
use crate::clients::{
    BlinkClient, BlinkReading, BlinkRequest, ComponentScores, FaceBox, FaceDetectionClient,
    FaceLandmarkSet, GazeClient, GazeReading, GazeRequest, HeadPoseClient, HeadPoseRequest,
    LandmarkClient, ResetRequest, ScoreReading, ScoreRequest, ScorerClient, ServiceError,
    StageClients, WireAlert,
};
use crate::config::OrchestratorConfig;
use crate::hub::RealtimeHub;
use crate::metrics::PipelineMetrics;

pub use session::{SessionRegistry, SessionState};
pub use stage::{with_fallback, Stage, StageOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct FrameRequest {
    /// base64 编码的图像
    pub frame_data: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub frame_width: Option<u32>,
    #[serde(default)]
    pub frame_height: Option<u32>,
}

impl FrameRequest {
    pub fn new(frame_data: impl Into<String>) -> Self {
        Self {
            frame_data: frame_data.into(),
            session_id: None,
            request_id: None,
            frame_width: None,
            frame_height: None,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub track_id: TrackId,
    pub face_index: usize,
    pub bbox: FaceBox,
    pub head_pose: HeadPose,
    pub gaze: GazeReading,
    pub blink: BlinkReading,
    pub attention_score: f64,
    pub component_scores: ComponentScores,
    pub alerts: Vec<WireAlert>,
    #[serde(default)]
    pub degraded_stages: Vec<Stage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameResponse {
    pub request_id: String,
    pub session_id: Option<String>,
    pub participants: Vec<Participant>,
    pub processing_time_ms: f64,
    pub success: bool,
    pub error: Option<String>,
}

struct FaceContext<'a> {
    session_id: Option<&'a str>,
    request_id: &'a str,
    frame_width: u32,
    frame_height: u32,
}

pub struct Orchestrator {
    clients: StageClients,
    sessions: SessionRegistry,
    hub: Arc<RealtimeHub>,
    metrics: Arc<PipelineMetrics>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        clients: StageClients,
        sessions: SessionRegistry,
        hub: Arc<RealtimeHub>,
        metrics: Arc<PipelineMetrics>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            clients,
            sessions,
            hub,
            metrics,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.config.stage_timeout_ms)
    }

    pub async fn process_frame(&self, request: FrameRequest) -> FrameResponse {
        let started = Instant::now();
        let request_id = request
            .request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.metrics.record_request();

        let outcome = match request.session_id.as_deref() {
            Some(session_id) => {
                let session = self.sessions.get_or_create(session_id).await;
                let mut state = session.lock().await;
                let outcome = self
                    .run_frame(&mut state.tracker, &request, &request_id)
                    .await;
                state.touch();
                outcome
            }
            None => {
                let mut tracker = FaceTracker::new(self.sessions.tracker_config().clone());
                self.run_frame(&mut tracker, &request, &request_id).await
            }
        };

        let elapsed = started.elapsed();
        self.metrics.record_processing_time(elapsed);
        let processing_time_ms = elapsed.as_secs_f64() * 1000.0;

        match outcome {
            Ok(participants) => {
                self.metrics.record_success(participants.len());
                if let Some(session_id) = request.session_id.as_deref() {
                    self.hub.publish(session_id, &participants).await;
                }
                tracing::debug!(
                    request_id = %request_id,
                    faces = participants.len(),
                    processing_time_ms,
                    "frame processed"
                );
                FrameResponse {
                    request_id,
                    session_id: request.session_id,
                    participants,
                    processing_time_ms,
                    success: true,
                    error: None,
                }
            }
            Err(err) => {
                self.metrics.record_failure();
                tracing::warn!(request_id = %request_id, error = %err, "frame failed");
                FrameResponse {
                    request_id,
                    session_id: request.session_id,
                    participants: Vec::new(),
                    processing_time_ms,
                    success: false,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn run_frame(
        &self,
        tracker: &mut FaceTracker,
        request: &FrameRequest,
        request_id: &str,
    ) -> Result<Vec<Participant>, ServiceError> {
        let boxes = self.detect_faces(&request.frame_data, request_id).await?;
        let detections: Vec<_> = boxes.iter().map(FaceBox::to_detection).collect();

        let output = tracker.update(&detections);
        if let Some(session_id) = request.session_id.as_deref() {
            if !output.evicted.is_empty() {
                self.reset_evicted(session_id, &output.evicted).await;
            }
        }
        if output.tracked.is_empty() {
            return Ok(Vec::new());
        }

        let tracked_boxes: Vec<FaceBox> = output
            .tracked
            .iter()
            .map(|face| FaceBox::from_detection(&face.detection))
            .collect();

        let landmarks = with_fallback(
            Stage::Landmarks,
            self.stage_timeout(),
            self.clients
                .landmarks
                .detect(&request.frame_data, &tracked_boxes, request_id),
            Vec::new(),
        )
        .await;
        let landmark_failed = landmarks.is_fallback();
        if landmark_failed {
            self.metrics.record_fallback();
        }
        let assigned = assign_landmarks(&output.tracked, landmarks.into_inner());

        let ctx = FaceContext {
            session_id: request.session_id.as_deref(),
            request_id,
            frame_width: request
                .frame_width
                .unwrap_or(self.config.default_frame_width),
            frame_height: request
                .frame_height
                .unwrap_or(self.config.default_frame_height),
        };

        let faces = output
            .tracked
            .iter()
            .zip(tracked_boxes)
            .zip(assigned)
            .enumerate()
            .map(|(face_index, ((face, bbox), lm))| {
                self.process_face(&ctx, face_index, face, bbox, lm)
            });
        Ok(join_all(faces).await)
    }

    async fn detect_faces(&self, frame_data: &str, request_id: &str) -> Result<Vec<FaceBox>, ServiceError> {
        match tokio::time::timeout(
            self.stage_timeout(),
            self.clients.face_detection.detect(frame_data, request_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout {
                service: "face-detection",
            }),
        }
    }

    async fn process_face(
        &self,
        ctx: &FaceContext<'_>,
        face_index: usize,
        face: &TrackedFace,
        bbox: FaceBox,
        landmarks: Option<FaceLandmarks>,
    ) -> Participant {
        let track_id = face.track_id();
        let Some(landmarks) = landmarks else {
            // 没有关键点：人脸在场但无信号，按 0 分处理
            return Participant {
                track_id,
                face_index,
                bbox,
                head_pose: HeadPose::default(),
                gaze: GazeReading::default(),
                blink: BlinkReading::default(),
                attention_score: 0.0,
                component_scores: ComponentScores::default(),
                alerts: Vec::new(),
                degraded_stages: vec![Stage::Landmarks],
            };
        };

        let points = from_face_landmarks(&landmarks);
        let session_id = ctx.session_id.map(str::to_string);
        let request_id = Some(ctx.request_id.to_string());
        let timeout = self.stage_timeout();

        let pose_req = HeadPoseRequest {
            landmarks: points.clone(),
            frame_width: ctx.frame_width,
            frame_height: ctx.frame_height,
            request_id: request_id.clone(),
        };
        let gaze_req = GazeRequest {
            landmarks: points.clone(),
            session_id: session_id.clone(),
            track_id: Some(track_id),
            request_id: request_id.clone(),
        };
        let blink_req = BlinkRequest {
            landmarks: points,
            session_id: session_id.clone(),
            track_id,
            request_id: request_id.clone(),
        };

        let (pose, gaze, blink) = tokio::join!(
            with_fallback(
                Stage::HeadPose,
                timeout,
                self.clients.head_pose.estimate(&pose_req),
                HeadPose::default()
            ),
            with_fallback(
                Stage::Gaze,
                timeout,
                self.clients.gaze.track(&gaze_req),
                GazeReading::default()
            ),
            with_fallback(
                Stage::Blink,
                timeout,
                self.clients.blink.detect(&blink_req),
                BlinkReading::default()
            ),
        );

        let mut degraded = Vec::new();
        for (stage, fell_back) in [
            (Stage::HeadPose, pose.is_fallback()),
            (Stage::Gaze, gaze.is_fallback()),
            (Stage::Blink, blink.is_fallback()),
        ] {
            if fell_back {
                degraded.push(stage);
            }
        }
        let (head_pose, gaze, blink) = (pose.into_inner(), gaze.into_inner(), blink.into_inner());

        let score_req = ScoreRequest {
            session_id,
            track_id,
            head_pose,
            gaze,
            blink,
            request_id,
        };
        let score = with_fallback(
            Stage::Scorer,
            timeout,
            self.clients.scorer.score(&score_req),
            ScoreReading::fallback(),
        )
        .await;
        if score.is_fallback() {
            degraded.push(Stage::Scorer);
        }
        for _ in &degraded {
            self.metrics.record_fallback();
        }
        let score = score.into_inner();

        Participant {
            track_id,
            face_index,
            bbox,
            head_pose,
            gaze,
            blink,
            attention_score: score.attention_score,
            component_scores: score.component_scores,
            alerts: score.alerts,
            degraded_stages: degraded,
        }
    }

    /// 跟踪器淘汰的轨迹：通知有状态阶段清理，失败只记录
    ///
    /// 调用方持有会话锁，清理完成前同一会话不会分配新的轨迹号。
    async fn reset_evicted(&self, session_id: &str, evicted: &[TrackId]) {
        let timeout = self.stage_timeout();
        let resets = evicted.iter().map(|&track_id| {
            tracing::debug!(session_id, track_id, "track evicted");
            let req = ResetRequest {
                session_id: Some(session_id.to_string()),
                track_id: Some(track_id),
            };
            async move { reset_stages(&self.clients, &req, timeout).await }
        });
        join_all(resets).await;
    }

    /// 清空会话的跟踪器与各阶段状态；会话不存在时返回 false
    pub async fn reset_session(&self, session_id: &str) -> bool {
        let Some(session) = self.sessions.get(session_id).await else {
            return false;
        };
        let mut state = session.lock().await;
        state.tracker.reset();
        let req = ResetRequest {
            session_id: Some(session_id.to_string()),
            track_id: None,
        };
        // 阶段清理完成后才放开会话锁，新帧不会与清理交错
        reset_stages(&self.clients, &req, self.stage_timeout()).await;
        drop(state);
        tracing::info!(session_id, "session reset");
        true
    }

    /// 删除会话并关闭其发布通道
    pub async fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.sessions.remove(session_id).await;
        self.hub.close(session_id).await;
        if removed {
            let req = ResetRequest {
                session_id: Some(session_id.to_string()),
                track_id: None,
            };
            reset_stages(&self.clients, &req, self.stage_timeout()).await;
            tracing::info!(session_id, "session removed");
        }
        removed
    }

    pub async fn evict_idle_sessions(&self, max_idle: Duration) -> usize {
        let idle = self.sessions.idle_sessions(max_idle).await;
        let mut evicted = 0;
        for session_id in idle {
            if self.remove_session(&session_id).await {
                evicted += 1;
            }
        }
        evicted
    }
}

async fn reset_stages(clients: &StageClients, req: &ResetRequest, timeout: Duration) {
    let (gaze, blink, scorer) = tokio::join!(
        tokio::time::timeout(timeout, clients.gaze.reset(req)),
        tokio::time::timeout(timeout, clients.blink.reset(req)),
        tokio::time::timeout(timeout, clients.scorer.reset(req)),
    );
    for (stage, result) in [(Stage::Gaze, gaze), (Stage::Blink, blink), (Stage::Scorer, scorer)] {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::debug!(stage = stage.as_str(), error = %err, "stage reset failed"),
            Err(_) => tracing::debug!(stage = stage.as_str(), "stage reset timed out"),
        }
    }
}

/// 把关键点结果对应到本帧的跟踪人脸
///
/// 带框的结果按 IoU 取最接近且尚未占用的人脸，否则退回 `face_index`。
/// 无法对应的结果被丢弃。
pub fn assign_landmarks(tracked: &[TrackedFace], sets: Vec<FaceLandmarkSet>) -> Vec<Option<FaceLandmarks>> {
    let mut slots: Vec<Option<FaceLandmarks>> = vec![None; tracked.len()];

    for set in sets {
        let by_overlap = set.bbox.and_then(|b| {
            let region = b.bbox();
            tracked
                .iter()
                .enumerate()
                .filter(|(i, _)| slots[*i].is_none())
                .map(|(i, face)| (i, face.detection.bbox.iou(&region)))
                .filter(|(_, iou)| *iou > 0.0)
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _)| i)
        });
        let target = by_overlap
            .or_else(|| Some(set.face_index).filter(|i| *i < slots.len() && slots[*i].is_none()));

        match target {
            Some(i) => slots[i] = Some(to_face_landmarks(&set.landmarks)),
            None => tracing::debug!(face_index = set.face_index, "landmark set matched no tracked face"),
        }
    }
    slots
}
