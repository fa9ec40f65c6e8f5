use serde::{Deserialize, Serialize};

/// 跟踪器参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// 低于此置信度的未匹配检测不会新建轨迹
    pub track_thresh: f64,
    /// 连续丢失超过该帧数后淘汰轨迹
    pub track_buffer: u32,
    /// 匹配所需的最小 IoU
    pub match_thresh: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.5,
            track_buffer: 30,
            match_thresh: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlinkConfig {
    pub ear_threshold: f64,
    /// 闭眼至少持续的帧数才计为一次眨眼
    pub blink_consec_frames: u32,
    /// PERCLOS 窗口（帧），约 3 秒 @30fps
    pub perclos_window: usize,
    pub drowsy_perclos_threshold: f64,
    /// 保留的眨眼时间点数量
    pub blink_history: usize,
    /// 帧序号换算为秒时假定的帧率
    pub assumed_fps: f64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            ear_threshold: 0.25,
            blink_consec_frames: 2,
            perclos_window: 90,
            drowsy_perclos_threshold: 0.8,
            blink_history: 100,
            assumed_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GazeConfig {
    /// 视线偏离中心的距离阈值（归一化单位）
    pub gaze_threshold: f64,
    /// EMA 系数，越大越跟手
    pub smoothing_alpha: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            gaze_threshold: 0.3,
            smoothing_alpha: 0.3,
        }
    }
}

/// 评分权重与告警阈值。权重名义上和为 1，但不会被重新归一化。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttentionConfig {
    pub gaze_weight: f64,
    pub head_pose_weight: f64,
    pub eye_openness_weight: f64,
    pub presence_weight: f64,

    pub head_yaw_threshold: f64,
    pub head_pitch_threshold: f64,
    pub ear_threshold: f64,
    pub gaze_threshold: f64,

    /// 0-1，与 score/100 比较
    pub not_attentive_score: f64,
    pub not_attentive_duration: f64,
    pub looking_away_yaw: f64,
    pub looking_away_duration: f64,
    pub drowsy_perclos: f64,
    pub drowsy_duration: f64,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            gaze_weight: 0.35,
            head_pose_weight: 0.30,
            eye_openness_weight: 0.20,
            presence_weight: 0.15,
            head_yaw_threshold: 30.0,
            head_pitch_threshold: 25.0,
            ear_threshold: 0.25,
            gaze_threshold: 0.3,
            not_attentive_score: 0.3,
            not_attentive_duration: 10.0,
            looking_away_yaw: 45.0,
            looking_away_duration: 5.0,
            drowsy_perclos: 0.8,
            drowsy_duration: 3.0,
        }
    }
}

/// 构造一次、按值传入各组件的完整算法配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub blink: BlinkConfig,
    #[serde(default)]
    pub gaze: GazeConfig,
    #[serde(default)]
    pub attention: AttentionConfig,
}
