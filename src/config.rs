use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

use attention_core::{AttentionConfig, BlinkConfig, GazeConfig, TrackerConfig, VisionConfig};

#[derive(Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub cors_origin: String,
    pub services: ServicesConfig,
    pub orchestrator: OrchestratorConfig,
    pub vision: VisionConfig,
    pub stages: StageConfig,
    pub analysis: AnalysisConfig,
    pub limits: LimitsConfig,
    pub worker: WorkerConfig,
}

/// 各检测阶段服务的地址与传输参数
#[derive(Clone)]
pub struct ServicesConfig {
    pub face_detection_url: String,
    pub landmark_detection_url: String,
    pub head_pose_url: String,
    pub gaze_tracking_url: String,
    pub blink_detection_url: String,
    pub attention_scorer_url: String,
    pub timeout_ms: u64,
    /// 连接失败时的总尝试次数（含首次）
    pub connect_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// 单个阶段调用的超时，超时即使用兜底值
    pub stage_timeout_ms: u64,
    pub publish_capacity: usize,
    /// 请求未携带帧尺寸时用于头部姿态求解
    pub default_frame_width: u32,
    pub default_frame_height: u32,
    pub session_idle_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StageConfig {
    pub score_window: usize,
    pub track_idle_secs: u64,
}

#[derive(Clone)]
pub struct AnalysisConfig {
    pub status_sink_url: String,
    pub default_fps: f64,
    pub progress_every: u64,
    pub retain_secs: u64,
    pub sink_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub max_sse_connections: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_analysis_cleanup: bool,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("enable_file_logs", &self.enable_file_logs)
            .field("log_dir", &self.log_dir)
            .field("cors_origin", &self.cors_origin)
            .field("services", &self.services)
            .field("orchestrator", &self.orchestrator)
            .field("vision", &self.vision)
            .field("stages", &self.stages)
            .field("analysis", &self.analysis)
            .field("limits", &self.limits)
            .field("worker", &self.worker)
            .finish()
    }
}

impl fmt::Debug for ServicesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicesConfig")
            .field("face_detection_url", &redact_url(&self.face_detection_url))
            .field("landmark_detection_url", &redact_url(&self.landmark_detection_url))
            .field("head_pose_url", &redact_url(&self.head_pose_url))
            .field("gaze_tracking_url", &redact_url(&self.gaze_tracking_url))
            .field("blink_detection_url", &redact_url(&self.blink_detection_url))
            .field("attention_scorer_url", &redact_url(&self.attention_scorer_url))
            .field("timeout_ms", &self.timeout_ms)
            .field("connect_attempts", &self.connect_attempts)
            .finish()
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("status_sink_url", &redact_url(&self.status_sink_url))
            .field("default_fps", &self.default_fps)
            .field("progress_every", &self.progress_every)
            .field("retain_secs", &self.retain_secs)
            .field("sink_timeout_ms", &self.sink_timeout_ms)
            .finish()
    }
}

/// 去掉 URL 中可能携带的 userinfo
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.find('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}

impl Config {
    pub fn from_env() -> Self {
        let port = env_or_parse("PORT", 3000_u16);
        let local_stage = |name: &str| format!("http://127.0.0.1:{port}/stages/{name}");

        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port,
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            services: ServicesConfig {
                face_detection_url: env_or("FACE_DETECTION_URL", "http://localhost:8052"),
                landmark_detection_url: env_or("LANDMARK_DETECTION_URL", "http://localhost:8053"),
                head_pose_url: env_or("HEAD_POSE_URL", "http://localhost:8054"),
                gaze_tracking_url: env_or("GAZE_TRACKING_URL", &local_stage("gaze")),
                blink_detection_url: env_or("BLINK_DETECTION_URL", &local_stage("blink")),
                attention_scorer_url: env_or("ATTENTION_SCORER_URL", &local_stage("attention")),
                timeout_ms: env_or_parse("SERVICE_TIMEOUT_MS", 5000_u64),
                connect_attempts: env_or_parse("SERVICE_CONNECT_ATTEMPTS", 2_u32).max(1),
            },
            orchestrator: OrchestratorConfig {
                stage_timeout_ms: env_or_parse("STAGE_TIMEOUT_MS", 5000_u64),
                publish_capacity: env_or_parse("PUBLISH_CAPACITY", 64_usize).max(1),
                default_frame_width: env_or_parse("DEFAULT_FRAME_WIDTH", 640_u32),
                default_frame_height: env_or_parse("DEFAULT_FRAME_HEIGHT", 480_u32),
                session_idle_secs: env_or_parse("SESSION_IDLE_SECS", 1800_u64),
            },
            vision: vision_from_env(),
            stages: StageConfig {
                score_window: env_or_parse("SCORE_SMOOTHING_WINDOW", 30_usize).max(1),
                track_idle_secs: env_or_parse("STAGE_TRACK_IDLE_SECS", 1800_u64),
            },
            analysis: AnalysisConfig {
                status_sink_url: env_or("API_GATEWAY_URL", "http://api-gateway:8080"),
                default_fps: env_or_parse("ANALYSIS_DEFAULT_FPS", 30.0_f64),
                progress_every: env_or_parse("ANALYSIS_PROGRESS_EVERY", 10_u64).max(1),
                retain_secs: env_or_parse("ANALYSIS_RETAIN_SECS", 86_400_u64),
                sink_timeout_ms: env_or_parse("ANALYSIS_SINK_TIMEOUT_MS", 5000_u64),
            },
            limits: LimitsConfig {
                max_sse_connections: env_or_parse("MAX_SSE_CONNECTIONS", 256_usize),
                max_body_bytes: env_or_parse("MAX_BODY_BYTES", 8 * 1024 * 1024_usize),
            },
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_analysis_cleanup: env_or_bool("ENABLE_ANALYSIS_CLEANUP_WORKER", true),
            },
        }
    }
}

fn vision_from_env() -> VisionConfig {
    let tracker = TrackerConfig::default();
    let blink = BlinkConfig::default();
    let gaze = GazeConfig::default();
    let attention = AttentionConfig::default();

    VisionConfig {
        tracker: TrackerConfig {
            track_thresh: env_or_parse("TRACK_THRESH", tracker.track_thresh),
            track_buffer: env_or_parse("TRACK_BUFFER", tracker.track_buffer),
            match_thresh: env_or_parse("MATCH_THRESH", tracker.match_thresh),
        },
        blink: BlinkConfig {
            ear_threshold: env_or_parse("EAR_THRESHOLD", blink.ear_threshold),
            blink_consec_frames: env_or_parse("BLINK_CONSEC_FRAMES", blink.blink_consec_frames),
            perclos_window: env_or_parse("PERCLOS_WINDOW", blink.perclos_window),
            drowsy_perclos_threshold: env_or_parse("DROWSY_PERCLOS_THRESHOLD", blink.drowsy_perclos_threshold),
            ..blink
        },
        gaze: GazeConfig {
            gaze_threshold: env_or_parse("GAZE_THRESHOLD", gaze.gaze_threshold),
            smoothing_alpha: env_or_parse("GAZE_SMOOTHING_ALPHA", gaze.smoothing_alpha),
        },
        attention: AttentionConfig {
            gaze_weight: env_or_parse("ATTENTION_GAZE_WEIGHT", attention.gaze_weight),
            head_pose_weight: env_or_parse("ATTENTION_HEAD_POSE_WEIGHT", attention.head_pose_weight),
            eye_openness_weight: env_or_parse("ATTENTION_EYE_OPENNESS_WEIGHT", attention.eye_openness_weight),
            presence_weight: env_or_parse("ATTENTION_PRESENCE_WEIGHT", attention.presence_weight),
            not_attentive_score: env_or_parse("NOT_ATTENTIVE_SCORE", attention.not_attentive_score),
            not_attentive_duration: env_or_parse("NOT_ATTENTIVE_DURATION", attention.not_attentive_duration),
            looking_away_yaw: env_or_parse("LOOKING_AWAY_YAW", attention.looking_away_yaw),
            looking_away_duration: env_or_parse("LOOKING_AWAY_DURATION", attention.looking_away_duration),
            drowsy_perclos: env_or_parse("DROWSY_PERCLOS", attention.drowsy_perclos),
            drowsy_duration: env_or_parse("DROWSY_DURATION", attention.drowsy_duration),
            ..attention
        },
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
