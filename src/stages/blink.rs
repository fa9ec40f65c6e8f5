use std::time::Duration;

use attention_core::landmarks::{LEFT_EYE, RIGHT_EYE};
use attention_core::{BlinkConfig, BlinkDetector, BlinkInfo, CoreError};

use super::{session_key, SessionTable};
use crate::clients::wire::to_face_landmarks;
use crate::clients::{BlinkReading, BlinkRequest, ResetRequest};

pub struct BlinkStage {
    config: BlinkConfig,
    sessions: SessionTable<BlinkDetector>,
}

fn reading(info: &BlinkInfo, is_drowsy: bool) -> BlinkReading {
    BlinkReading {
        left_ear: info.left_ear,
        right_ear: info.right_ear,
        avg_ear: info.avg_ear,
        perclos: info.perclos,
        is_drowsy,
        is_blinking: info.is_blinking,
        blink_count: info.blink_count,
        blink_rate: info.blink_rate,
    }
}

impl BlinkStage {
    pub fn new(config: BlinkConfig) -> Self {
        Self {
            config,
            sessions: SessionTable::default(),
        }
    }

    pub async fn detect(&self, request: &BlinkRequest) -> Result<BlinkReading, CoreError> {
        let landmarks = to_face_landmarks(&request.landmarks);
        let got = landmarks.left_eye().len() + landmarks.right_eye().len();
        let needed = LEFT_EYE.len() + RIGHT_EYE.len();
        if got < needed {
            return Err(CoreError::InsufficientLandmarks { needed, got });
        }

        let session = session_key(request.session_id.as_deref());
        let track_id = request.track_id;
        let reading = self
            .sessions
            .with(
                session,
                || BlinkDetector::new(self.config.clone()),
                |detector| {
                    let info = detector.analyze(&landmarks, track_id);
                    reading(&info, detector.is_drowsy(track_id))
                },
            )
            .await;
        Ok(reading)
    }

    pub async fn reset(&self, request: &ResetRequest) {
        let session = session_key(request.session_id.as_deref());
        match request.track_id {
            Some(track_id) => {
                self.sessions
                    .with_existing(session, |detector| detector.reset_track(track_id))
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
