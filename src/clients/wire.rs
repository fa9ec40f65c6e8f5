//! 各阶段服务之间的 JSON 载荷（snake_case，与既有检测服务保持兼容）

use attention_core::{
    Alert, AttentionMetrics, BoundingBox, Detection, FaceLandmarks, HeadPose, Point, TrackId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WireLandmark {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

pub fn to_face_landmarks(points: &[WireLandmark]) -> FaceLandmarks {
    FaceLandmarks::from_indexed(
        points
            .iter()
            .map(|p| (p.index, Point::with_z(p.x, p.y, p.z))),
    )
}

pub fn from_face_landmarks(landmarks: &FaceLandmarks) -> Vec<WireLandmark> {
    landmarks
        .iter_indexed()
        .map(|(index, p)| WireLandmark {
            index,
            x: p.x,
            y: p.y,
            z: p.z,
        })
        .collect()
}

/// 角点形式的人脸框
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    #[serde(default)]
    pub confidence: f64,
}

impl FaceBox {
    pub fn bbox(&self) -> BoundingBox {
        BoundingBox::from_xyxy(self.x1, self.y1, self.x2, self.y2)
    }

    pub fn to_detection(&self) -> Detection {
        Detection::new(self.bbox(), self.confidence)
    }

    pub fn from_detection(detection: &Detection) -> Self {
        let b = detection.bbox;
        Self {
            x1: b.x,
            y1: b.y,
            x2: b.x2(),
            y2: b.y2(),
            confidence: detection.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetectRequest<'a> {
    pub frame_data: &'a str,
    pub request_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub faces: Vec<FaceBox>,
}

#[derive(Debug, Serialize)]
pub struct LandmarkRequest<'a> {
    pub frame_data: &'a str,
    pub faces: &'a [FaceBox],
    pub request_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LandmarkResponse {
    #[serde(default)]
    pub faces: Vec<FaceLandmarkSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceLandmarkSet {
    #[serde(default)]
    pub face_index: usize,
    pub landmarks: Vec<WireLandmark>,
    #[serde(default)]
    pub bbox: Option<FaceBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadPoseRequest {
    pub landmarks: Vec<WireLandmark>,
    pub frame_width: u32,
    pub frame_height: u32,
    #[serde(default)]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GazeRequest {
    pub landmarks: Vec<WireLandmark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_track_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub track_id: Option<TrackId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GazeReading {
    pub gaze_x: f64,
    pub gaze_y: f64,
    pub is_looking_at_camera: bool,
    /// 视线偏移方向（度）
    pub gaze_angle: f64,
}

/// 缺省值同时也是视线阶段失败时的兜底：视为正视镜头
impl Default for GazeReading {
    fn default() -> Self {
        Self {
            gaze_x: 0.0,
            gaze_y: 0.0,
            is_looking_at_camera: true,
            gaze_angle: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlinkRequest {
    pub landmarks: Vec<WireLandmark>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(deserialize_with = "de_track_id")]
    pub track_id: TrackId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlinkReading {
    pub left_ear: f64,
    pub right_ear: f64,
    pub avg_ear: f64,
    pub perclos: f64,
    pub is_drowsy: bool,
    pub is_blinking: bool,
    pub blink_count: u32,
    pub blink_rate: f64,
}

/// 睁眼、无闭眼记录；同样用作眨眼阶段的兜底
impl Default for BlinkReading {
    fn default() -> Self {
        Self {
            left_ear: 0.25,
            right_ear: 0.25,
            avg_ear: 0.25,
            perclos: 0.0,
            is_drowsy: false,
            is_blinking: false,
            blink_count: 0,
            blink_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(deserialize_with = "de_track_id")]
    pub track_id: TrackId,
    #[serde(default)]
    pub head_pose: HeadPose,
    #[serde(default)]
    pub gaze: GazeReading,
    #[serde(default)]
    pub blink: BlinkReading,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentScores {
    pub gaze: f64,
    pub head_pose: f64,
    pub eye_openness: f64,
    pub presence: f64,
}

impl From<&AttentionMetrics> for ComponentScores {
    fn from(m: &AttentionMetrics) -> Self {
        Self {
            gaze: m.gaze_score,
            head_pose: m.head_pose_score,
            eye_openness: m.eye_openness_score,
            presence: m.presence_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAlert {
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub severity: String,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_at: Option<DateTime<Utc>>,
}

impl From<&Alert> for WireAlert {
    fn from(alert: &Alert) -> Self {
        Self {
            alert_type: alert.alert_type.as_str().to_string(),
            message: alert.message.clone(),
            severity: alert.severity.as_str().to_string(),
            duration_seconds: alert.duration_seconds,
            triggered_at: Some(alert.triggered_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReading {
    pub attention_score: f64,
    #[serde(default)]
    pub raw_score: f64,
    #[serde(default)]
    pub component_scores: ComponentScores,
    #[serde(default)]
    pub alerts: Vec<WireAlert>,
}

impl ScoreReading {
    pub const FALLBACK_SCORE: f64 = 75.0;

    /// 评分阶段不可用时的中性分，不带告警
    pub fn fallback() -> Self {
        Self {
            attention_score: Self::FALLBACK_SCORE,
            raw_score: Self::FALLBACK_SCORE,
            component_scores: ComponentScores::default(),
            alerts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResetRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_track_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub track_id: Option<TrackId>,
}

/// 既有服务把轨迹号作为字符串传递，这里两种形式都接受
#[derive(Deserialize)]
#[serde(untagged)]
enum TrackIdRepr {
    Number(TrackId),
    Text(String),
}

impl TrackIdRepr {
    fn parse<E: serde::de::Error>(self) -> Result<TrackId, E> {
        match self {
            Self::Number(n) => Ok(n),
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid track_id: {s}"))),
        }
    }
}

fn de_track_id<'de, D>(deserializer: D) -> Result<TrackId, D::Error>
where
    D: Deserializer<'de>,
{
    TrackIdRepr::deserialize(deserializer)?.parse()
}

fn de_opt_track_id<'de, D>(deserializer: D) -> Result<Option<TrackId>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<TrackIdRepr>::deserialize(deserializer)?
        .map(TrackIdRepr::parse)
        .transpose()
}
