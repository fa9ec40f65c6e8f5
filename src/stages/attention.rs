use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use attention_core::scorer::round2;
use attention_core::{AttentionConfig, AttentionScorer, BlinkInfo, GazeInfo, TrackId};

use super::{session_key, SessionTable};
use crate::clients::{ComponentScores, ResetRequest, ScoreReading, ScoreRequest, WireAlert};

/// 一个会话的评分状态：告警防抖 + 每条轨迹的滚动平均窗口
struct ScoreSession {
    scorer: AttentionScorer,
    windows: HashMap<TrackId, VecDeque<f64>>,
}

pub struct AttentionStage {
    config: AttentionConfig,
    window: usize,
    sessions: SessionTable<ScoreSession>,
}

impl AttentionStage {
    pub fn new(config: AttentionConfig, window: usize) -> Self {
        Self {
            config,
            window: window.max(1),
            sessions: SessionTable::default(),
        }
    }

    /// 对外分数是最近 `window` 次原始分的均值；告警基于平滑后的分数判定
    pub async fn score(&self, request: &ScoreRequest) -> ScoreReading {
        let session = session_key(request.session_id.as_deref());
        let track_id = request.track_id;
        let gaze = GazeInfo {
            x: request.gaze.gaze_x,
            y: request.gaze.gaze_y,
        };
        let blink = BlinkInfo {
            left_ear: request.blink.left_ear,
            right_ear: request.blink.right_ear,
            avg_ear: request.blink.avg_ear,
            is_blinking: request.blink.is_blinking,
            blink_rate: request.blink.blink_rate,
            perclos: request.blink.perclos,
            blink_count: request.blink.blink_count,
        };
        let window = self.window;

        self.sessions
            .with(
                session,
                || ScoreSession {
                    scorer: AttentionScorer::new(self.config.clone()),
                    windows: HashMap::new(),
                },
                |state| {
                    let mut metrics =
                        state
                            .scorer
                            .calculate(Some(&request.head_pose), Some(&gaze), Some(&blink), true);
                    metrics.is_drowsy |= request.blink.is_drowsy;
                    let raw_score = state.scorer.calculate_attention_score(&metrics);

                    let history = state.windows.entry(track_id).or_default();
                    history.push_back(raw_score);
                    while history.len() > window {
                        history.pop_front();
                    }
                    let smoothed = round2(history.iter().sum::<f64>() / history.len() as f64);

                    let alerts = state.scorer.check_alerts(track_id, &metrics, smoothed);
                    ScoreReading {
                        attention_score: smoothed,
                        raw_score,
                        component_scores: ComponentScores::from(&metrics),
                        alerts: alerts.iter().map(WireAlert::from).collect(),
                    }
                },
            )
            .await
    }

    pub async fn reset(&self, request: &ResetRequest) {
        let session = session_key(request.session_id.as_deref());
        match request.track_id {
            Some(track_id) => {
                self.sessions
                    .with_existing(session, |state| {
                        state.scorer.reset_track(track_id);
                        state.windows.remove(&track_id);
                    })
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
