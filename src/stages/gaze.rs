use std::time::Duration;

use attention_core::landmarks::{LEFT_EYE, LEFT_IRIS, RIGHT_EYE, RIGHT_IRIS};
use attention_core::{CoreError, GazeConfig, GazeInfo, GazeTracker};

use super::{session_key, SessionTable};
use crate::clients::wire::to_face_landmarks;
use crate::clients::{GazeReading, GazeRequest, ResetRequest};

pub struct GazeStage {
    config: GazeConfig,
    stateless: GazeTracker,
    sessions: SessionTable<GazeTracker>,
}

impl GazeStage {
    pub fn new(config: GazeConfig) -> Self {
        Self {
            stateless: GazeTracker::new(config.clone()),
            config,
            sessions: SessionTable::default(),
        }
    }

    /// 两侧虹膜点缺失时返回 `InsufficientLandmarks`；带轨迹号的请求做平滑
    pub async fn track(&self, request: &GazeRequest) -> Result<GazeReading, CoreError> {
        let landmarks = to_face_landmarks(&request.landmarks);
        let iris_present = LEFT_IRIS
            .iter()
            .chain(RIGHT_IRIS.iter())
            .filter(|&&i| landmarks.get(i).is_some())
            .count();
        if iris_present < LEFT_IRIS.len() + RIGHT_IRIS.len() {
            return Err(CoreError::InsufficientLandmarks {
                needed: LEFT_IRIS.len() + RIGHT_IRIS.len(),
                got: iris_present,
            });
        }

        let gaze = match request.track_id {
            Some(track_id) => {
                let session = session_key(request.session_id.as_deref());
                self.sessions
                    .with(
                        session,
                        || GazeTracker::new(self.config.clone()),
                        |tracker| tracker.estimate_smoothed(&landmarks, track_id),
                    )
                    .await
            }
            None => self.stateless.estimate(&landmarks),
        };

        let gaze = gaze.ok_or_else(|| CoreError::InsufficientLandmarks {
            needed: LEFT_EYE.len() + RIGHT_EYE.len(),
            got: landmarks.left_eye().len() + landmarks.right_eye().len(),
        })?;
        Ok(self.reading(&gaze))
    }

    fn reading(&self, gaze: &GazeInfo) -> GazeReading {
        GazeReading {
            gaze_x: gaze.x,
            gaze_y: gaze.y,
            is_looking_at_camera: self.stateless.is_looking_at_camera(gaze),
            gaze_angle: gaze.y.atan2(gaze.x).to_degrees(),
        }
    }

    pub async fn reset(&self, request: &ResetRequest) {
        let session = session_key(request.session_id.as_deref());
        match request.track_id {
            Some(track_id) => {
                self.sessions
                    .with_existing(session, |tracker| tracker.reset_track(track_id))
                    .await;
            }
            None => {
                self.sessions.remove(session).await;
            }
        }
    }

    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        self.sessions.evict_idle(max_idle).await
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }
}
