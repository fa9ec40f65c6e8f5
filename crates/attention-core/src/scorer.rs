//! 注意力评分模块
//!
//! 将视线、头部姿态、睁眼程度、在场四项分量（各 0-1）加权融合为 0-100 的注意力分数。
//!
//! 告警去抖：注意力过低、视线偏离、疲劳三类条件各自记录起始时间，
//! 持续达到阈值时长后每个连续片段只触发一次；条件一旦为假立即清除起始时间。

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::config::AttentionConfig;
use crate::gaze::gaze_score;
use crate::geometry::BoundingBox;
use crate::types::{Alert, AlertType, AttentionMetrics, AttentionResult, BlinkInfo, GazeInfo, HeadPose};
use crate::TrackId;

#[derive(Debug, Clone, Copy)]
struct Episode {
    started_at: DateTime<Utc>,
    fired: bool,
}

#[derive(Debug, Default)]
struct AlertState {
    low_attention: Option<Episode>,
    looking_away: Option<Episode>,
    drowsy: Option<Episode>,
}

/// 推进一个去抖片段，达到时长且本片段尚未触发时返回持续秒数
fn advance(slot: &mut Option<Episode>, active: bool, now: DateTime<Utc>, threshold_secs: f64) -> Option<f64> {
    if !active {
        *slot = None;
        return None;
    }
    let episode = slot.get_or_insert(Episode {
        started_at: now,
        fired: false,
    });
    let elapsed = (now - episode.started_at).num_milliseconds() as f64 / 1000.0;
    if !episode.fired && elapsed >= threshold_secs {
        episode.fired = true;
        Some(elapsed)
    } else {
        None
    }
}

pub struct AttentionScorer {
    config: AttentionConfig,
    alert_states: HashMap<TrackId, AlertState>,
}

impl AttentionScorer {
    pub fn new(config: AttentionConfig) -> Self {
        Self {
            config,
            alert_states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &AttentionConfig {
        &self.config
    }

    pub fn calculate(
        &self,
        head_pose: Option<&HeadPose>,
        gaze: Option<&GazeInfo>,
        blink: Option<&BlinkInfo>,
        is_present: bool,
    ) -> AttentionMetrics {
        let cfg = &self.config;

        let gaze_score = gaze.map_or(0.0, |g| gaze_score(g, cfg.gaze_threshold));
        let head_pose_score = head_pose.map_or(0.0, |p| self.head_pose_score(p));
        let eye_openness_score = blink.map_or(0.0, |b| self.eye_openness_score(b));

        AttentionMetrics {
            gaze_score,
            head_pose_score,
            eye_openness_score,
            presence_score: if is_present { 1.0 } else { 0.0 },
            head_yaw: head_pose.map_or(0.0, |p| p.yaw),
            head_pitch: head_pose.map_or(0.0, |p| p.pitch),
            head_roll: head_pose.map_or(0.0, |p| p.roll),
            avg_ear: blink.map_or(0.0, |b| b.avg_ear),
            blink_rate: blink.map_or(0.0, |b| b.blink_rate),
            perclos: blink.map_or(0.0, |b| b.perclos),
            gaze_x: gaze.map_or(0.0, |g| g.x),
            gaze_y: gaze.map_or(0.0, |g| g.y),
            is_looking_away: head_pose.is_some_and(|p| p.yaw.abs() > cfg.looking_away_yaw),
            is_drowsy: blink.is_some_and(|b| b.perclos > cfg.drowsy_perclos),
            is_present,
        }
    }

    /// 加权和 ×100，保留两位小数；权重不做归一化
    pub fn calculate_attention_score(&self, metrics: &AttentionMetrics) -> f64 {
        let cfg = &self.config;
        let weighted = cfg.gaze_weight * metrics.gaze_score
            + cfg.head_pose_weight * metrics.head_pose_score
            + cfg.eye_openness_weight * metrics.eye_openness_score
            + cfg.presence_weight * metrics.presence_score;
        round2(weighted * 100.0)
    }

    pub fn process_face(
        &self,
        track_id: TrackId,
        bbox: BoundingBox,
        head_pose: Option<&HeadPose>,
        gaze: Option<&GazeInfo>,
        blink: Option<&BlinkInfo>,
        is_present: bool,
    ) -> AttentionResult {
        let metrics = self.calculate(head_pose, gaze, blink, is_present);
        AttentionResult {
            track_id,
            attention_score: self.calculate_attention_score(&metrics),
            metrics,
            bbox,
            timestamp: Utc::now(),
        }
    }

    pub fn check_alerts(&mut self, track_id: TrackId, metrics: &AttentionMetrics, score: f64) -> Vec<Alert> {
        self.check_alerts_at(track_id, metrics, score, Utc::now())
    }

    pub fn check_alerts_at(
        &mut self,
        track_id: TrackId,
        metrics: &AttentionMetrics,
        score: f64,
        now: DateTime<Utc>,
    ) -> Vec<Alert> {
        let cfg = &self.config;
        let state = self.alert_states.entry(track_id).or_default();

        let checks = [
            (
                AlertType::NotAttentive,
                advance(
                    &mut state.low_attention,
                    score < cfg.not_attentive_score * 100.0,
                    now,
                    cfg.not_attentive_duration,
                ),
            ),
            (
                AlertType::LookingAway,
                advance(&mut state.looking_away, metrics.is_looking_away, now, cfg.looking_away_duration),
            ),
            (
                AlertType::Drowsy,
                advance(&mut state.drowsy, metrics.is_drowsy, now, cfg.drowsy_duration),
            ),
        ];

        checks
            .into_iter()
            .filter_map(|(kind, elapsed)| elapsed.map(|d| Alert::new(kind, track_id, d, now)))
            .inspect(|alert| {
                tracing::info!(
                    track_id,
                    alert = alert.alert_type.as_str(),
                    duration = alert.duration_seconds,
                    "attention alert"
                );
            })
            .collect()
    }

    pub fn tracked_ids(&self) -> Vec<TrackId> {
        self.alert_states.keys().copied().collect()
    }

    pub fn reset_track(&mut self, track_id: TrackId) {
        self.alert_states.remove(&track_id);
    }

    pub fn reset_all(&mut self) {
        self.alert_states.clear();
    }

    fn head_pose_score(&self, pose: &HeadPose) -> f64 {
        let yaw_penalty = (pose.yaw.abs() / self.config.head_yaw_threshold).min(1.0);
        let pitch_penalty = (pose.pitch.abs() / self.config.head_pitch_threshold).min(1.0);
        (1.0 - (0.6 * yaw_penalty + 0.4 * pitch_penalty)).max(0.0)
    }

    fn eye_openness_score(&self, blink: &BlinkInfo) -> f64 {
        if blink.avg_ear <= 0.0 || self.config.ear_threshold <= 0.0 {
            return 0.0;
        }
        let mut score = (blink.avg_ear / self.config.ear_threshold).min(1.0);
        if blink.perclos > 0.5 {
            score *= 1.0 - blink.perclos;
        }
        score
    }
}

impl Default for AttentionScorer {
    fn default() -> Self {
        Self::new(AttentionConfig::default())
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
