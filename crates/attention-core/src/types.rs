//! 各组件之间传递的数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Point};
use crate::TrackId;

/// 单帧中的一个人脸检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keypoints: Vec<Point>,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self {
            bbox,
            confidence: confidence.clamp(0.0, 1.0),
            keypoints: Vec::new(),
        }
    }
}

/// 轨迹状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub id: TrackId,
    pub bbox: BoundingBox,
    pub confirmed: bool,
    pub hit_streak: u32,
    pub frames_since_update: u32,
    pub age: u32,
}

/// 跟踪器对本帧某个检测的输出
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedFace {
    pub detection: Detection,
    pub track: TrackInfo,
}

impl TrackedFace {
    pub fn track_id(&self) -> TrackId {
        self.track.id
    }
}

/// 头部姿态（角度制）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

/// 归一化视线偏移，x/y 均在 [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GazeInfo {
    pub x: f64,
    pub y: f64,
}

impl GazeInfo {
    pub fn distance_from_center(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlinkInfo {
    pub left_ear: f64,
    pub right_ear: f64,
    pub avg_ear: f64,
    pub is_blinking: bool,
    /// 次/分钟
    pub blink_rate: f64,
    /// 0-1
    pub perclos: f64,
    pub blink_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionMetrics {
    pub gaze_score: f64,
    pub head_pose_score: f64,
    pub eye_openness_score: f64,
    pub presence_score: f64,

    pub head_yaw: f64,
    pub head_pitch: f64,
    pub head_roll: f64,
    pub avg_ear: f64,
    pub blink_rate: f64,
    pub perclos: f64,
    pub gaze_x: f64,
    pub gaze_y: f64,

    pub is_looking_away: bool,
    pub is_drowsy: bool,
    pub is_present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionResult {
    pub track_id: TrackId,
    /// 0-100，保留两位小数
    pub attention_score: f64,
    pub metrics: AttentionMetrics,
    pub bbox: BoundingBox,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    NotAttentive,
    LookingAway,
    Drowsy,
    Absent,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAttentive => "NOT_ATTENTIVE",
            Self::LookingAway => "LOOKING_AWAY",
            Self::Drowsy => "DROWSY",
            Self::Absent => "ABSENT",
        }
    }

    /// 告警消息模板，`duration` 为持续秒数
    pub fn message(&self, duration: f64) -> String {
        match self {
            Self::NotAttentive => format!("Attention score below threshold for {duration:.1}s"),
            Self::LookingAway => format!("Looking away from screen for {duration:.1}s"),
            Self::Drowsy => format!("Signs of drowsiness detected for {duration:.1}s"),
            Self::Absent => "Participant not visible in frame".to_string(),
        }
    }

    pub fn severity(&self) -> AlertSeverity {
        match self {
            Self::NotAttentive => AlertSeverity::Warning,
            Self::LookingAway => AlertSeverity::Info,
            Self::Drowsy => AlertSeverity::Critical,
            Self::Absent => AlertSeverity::Info,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub track_id: TrackId,
    pub duration_seconds: f64,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(alert_type: AlertType, track_id: TrackId, duration_seconds: f64, now: DateTime<Utc>) -> Self {
        Self {
            alert_type,
            severity: alert_type.severity(),
            track_id,
            duration_seconds,
            message: alert_type.message(duration_seconds),
            triggered_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    pub frame_id: u64,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub results: Vec<AttentionResult>,
    pub alerts: Vec<Alert>,
    pub latency_ms: f64,
}

impl FrameResult {
    pub fn mean_attention(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.results.iter().map(|r| r.attention_score).sum::<f64>() / self.results.len() as f64
    }
}
