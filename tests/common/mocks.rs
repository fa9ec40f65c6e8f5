use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use attention_backend::analysis::{ProgressSink, ProgressUpdate};
use attention_backend::clients::{
    BlinkClient, BlinkReading, BlinkRequest, FaceBox, FaceDetectionClient, FaceLandmarkSet, GazeClient,
    GazeReading, GazeRequest, HeadPoseClient, HeadPoseRequest, LandmarkClient, ResetRequest, ScoreReading,
    ScoreRequest, ScorerClient, ServiceError, StageClients, WireAlert, WireLandmark,
};
use attention_core::landmarks::{LEFT_EYE, LEFT_IRIS, RIGHT_EYE, RIGHT_IRIS};
use attention_core::HeadPose;

pub struct MockState {
    pub faces: Vec<FaceBox>,
    pub detection_error: bool,
    pub landmark_error: bool,
    pub head_pose: HeadPose,
    pub head_pose_delay: Option<Duration>,
    pub gaze: GazeReading,
    pub gaze_error: bool,
    pub blink: BlinkReading,
    pub blink_error: bool,
    pub score: f64,
    pub scorer_error: bool,
    pub scorer_delay: Option<Duration>,
    pub alerts: Vec<WireAlert>,
    pub score_requests: Vec<ScoreRequest>,
    pub resets: Vec<(&'static str, ResetRequest)>,
    pub detect_calls: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            faces: Vec::new(),
            detection_error: false,
            landmark_error: false,
            head_pose: HeadPose::default(),
            head_pose_delay: None,
            // 正常读数与各阶段兜底值刻意不同
            gaze: GazeReading {
                gaze_x: 0.4,
                gaze_y: -0.2,
                is_looking_at_camera: false,
                gaze_angle: -26.5,
            },
            gaze_error: false,
            blink: BlinkReading {
                left_ear: 0.3,
                right_ear: 0.3,
                avg_ear: 0.3,
                perclos: 0.1,
                blink_count: 2,
                ..BlinkReading::default()
            },
            blink_error: false,
            score: 88.0,
            scorer_error: false,
            scorer_delay: None,
            alerts: Vec::new(),
            score_requests: Vec::new(),
            resets: Vec::new(),
            detect_calls: 0,
        }
    }
}

/// 所有阶段共用的内存实现，行为由 `MockState` 控制
#[derive(Clone, Default)]
pub struct MockPipeline {
    state: Arc<Mutex<MockState>>,
}

pub fn face_box(index: usize) -> FaceBox {
    let x = 100.0 * index as f64;
    FaceBox {
        x1: x,
        y1: 0.0,
        x2: x + 80.0,
        y2: 80.0,
        confidence: 0.9,
    }
}

fn eye_and_iris_points(face: &FaceBox) -> Vec<WireLandmark> {
    let shape = [(0.0, 0.0), (10.0, -6.0), (20.0, -6.0), (30.0, 0.0), (20.0, 6.0), (10.0, 6.0)];
    let mut points = Vec::new();
    for (eye, iris, ox) in [(LEFT_EYE, LEFT_IRIS, 45.0), (RIGHT_EYE, RIGHT_IRIS, 5.0)] {
        let ox = face.x1 + ox;
        let oy = face.y1 + 30.0;
        points.extend(eye.iter().zip(shape).map(|(&index, (x, y))| WireLandmark {
            index,
            x: ox + x,
            y: oy + y,
            z: 0.0,
        }));
        points.extend(iris.iter().map(|&index| WireLandmark {
            index,
            x: ox + 15.0,
            y: oy,
            z: 0.0,
        }));
    }
    points
}

impl MockPipeline {
    pub fn with_faces(count: usize) -> Self {
        let pipeline = Self::default();
        pipeline.set_faces(count);
        pipeline
    }

    pub fn set_faces(&self, count: usize) {
        self.lock().faces = (0..count).map(face_box).collect();
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state")
    }

    pub fn score_requests(&self) -> Vec<ScoreRequest> {
        self.lock().score_requests.clone()
    }

    pub fn resets(&self) -> Vec<(&'static str, ResetRequest)> {
        self.lock().resets.clone()
    }

    pub fn clients(&self) -> StageClients {
        StageClients {
            face_detection: Arc::new(self.clone()),
            landmarks: Arc::new(self.clone()),
            head_pose: Arc::new(self.clone()),
            gaze: Arc::new(self.clone()),
            blink: Arc::new(self.clone()),
            scorer: Arc::new(self.clone()),
        }
    }

    fn record_reset(&self, stage: &'static str, request: &ResetRequest) {
        self.lock().resets.push((stage, request.clone()));
    }
}

#[async_trait]
impl FaceDetectionClient for MockPipeline {
    async fn detect(&self, _frame_data: &str, _request_id: &str) -> Result<Vec<FaceBox>, ServiceError> {
        let mut state = self.lock();
        state.detect_calls += 1;
        if state.detection_error {
            return Err(ServiceError::Connect {
                service: "face-detection",
                message: "connection refused".to_string(),
            });
        }
        Ok(state.faces.clone())
    }
}

#[async_trait]
impl LandmarkClient for MockPipeline {
    async fn detect(
        &self,
        _frame_data: &str,
        faces: &[FaceBox],
        _request_id: &str,
    ) -> Result<Vec<FaceLandmarkSet>, ServiceError> {
        if self.lock().landmark_error {
            return Err(ServiceError::Status {
                service: "landmark-detection",
                status: 503,
            });
        }
        Ok(faces
            .iter()
            .enumerate()
            .map(|(face_index, face)| FaceLandmarkSet {
                face_index,
                landmarks: eye_and_iris_points(face),
                bbox: Some(*face),
            })
            .collect())
    }
}

#[async_trait]
impl HeadPoseClient for MockPipeline {
    async fn estimate(&self, _request: &HeadPoseRequest) -> Result<HeadPose, ServiceError> {
        let (delay, pose) = {
            let state = self.lock();
            (state.head_pose_delay, state.head_pose)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(pose)
    }
}

#[async_trait]
impl GazeClient for MockPipeline {
    async fn track(&self, _request: &GazeRequest) -> Result<GazeReading, ServiceError> {
        let state = self.lock();
        if state.gaze_error {
            return Err(ServiceError::Status {
                service: "gaze-tracking",
                status: 422,
            });
        }
        Ok(state.gaze)
    }

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError> {
        self.record_reset("gaze", request);
        Ok(())
    }
}

#[async_trait]
impl BlinkClient for MockPipeline {
    async fn detect(&self, _request: &BlinkRequest) -> Result<BlinkReading, ServiceError> {
        let state = self.lock();
        if state.blink_error {
            return Err(ServiceError::Connect {
                service: "blink-detection",
                message: "connection refused".to_string(),
            });
        }
        Ok(state.blink)
    }

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError> {
        self.record_reset("blink", request);
        Ok(())
    }
}

#[async_trait]
impl ScorerClient for MockPipeline {
    async fn score(&self, request: &ScoreRequest) -> Result<ScoreReading, ServiceError> {
        let delay = {
            let mut state = self.lock();
            state.score_requests.push(request.clone());
            state.scorer_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.lock();
        if state.scorer_error {
            return Err(ServiceError::Status {
                service: "attention-scorer",
                status: 500,
            });
        }
        Ok(ScoreReading {
            attention_score: state.score,
            raw_score: state.score,
            component_scores: Default::default(),
            alerts: state.alerts.clone(),
        })
    }

    async fn reset(&self, request: &ResetRequest) -> Result<(), ServiceError> {
        self.record_reset("scorer", request);
        Ok(())
    }
}

/// 记录所有进度上报的接收方
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<(String, ProgressUpdate)>>,
}

impl RecordingSink {
    pub fn updates_for(&self, analysis_id: &str) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .expect("sink lock")
            .iter()
            .filter(|(id, _)| id == analysis_id)
            .map(|(_, update)| update.clone())
            .collect()
    }

    /// 轮询直到出现终态上报
    pub async fn wait_for_terminal(&self, analysis_id: &str) -> ProgressUpdate {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(update) = self
                .updates_for(analysis_id)
                .into_iter()
                .find(|u| u.status.is_terminal())
            {
                return update;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "analysis {analysis_id} did not finish"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn report(&self, analysis_id: &str, update: &ProgressUpdate) {
        self.updates
            .lock()
            .expect("sink lock")
            .push((analysis_id.to_string(), update.clone()));
    }
}
