//! 眨眼检测模块
//!
//! 基于 EAR（Eye Aspect Ratio）判断睁闭眼，按轨迹维护：
//! - EAR 滑动窗口（用于 PERCLOS）
//! - 闭眼段起点（闭眼持续足够帧数且重新睁眼才计一次眨眼）
//! - 最近 100 次眨眼所在帧序号（用于估算眨眼频率）
//!
//! PERCLOS 为窗口内 EAR 低于阈值的帧占比，取值 0-1。

use std::collections::{HashMap, VecDeque};

use crate::config::BlinkConfig;
use crate::geometry::Point;
use crate::landmarks::FaceLandmarks;
use crate::types::BlinkInfo;
use crate::TrackId;

const MAX_BLINK_RATE: f64 = 60.0;

/// 计算单眼 EAR
///
/// EAR = (|p1 - p5| + |p2 - p4|) / (2 * |p0 - p3|)
///
/// 点数不足 6 或水平距离小于 1 像素时返回 0。
pub fn eye_aspect_ratio(eye: &[Point]) -> f64 {
    if eye.len() < 6 {
        return 0.0;
    }
    let v1 = eye[1].distance(&eye[5]);
    let v2 = eye[2].distance(&eye[4]);
    let h = eye[0].distance(&eye[3]);
    if h < 1.0 {
        return 0.0;
    }
    (v1 + v2) / (2.0 * h)
}

/// 窗口内低于阈值的样本占比；空窗口为 0
pub fn perclos<'a, I>(history: I, ear_threshold: f64) -> f64
where
    I: IntoIterator<Item = &'a f64>,
{
    let (closed, total) = history.into_iter().fold((0usize, 0usize), |(c, t), &ear| {
        (c + usize::from(ear < ear_threshold), t + 1)
    });
    if total == 0 {
        0.0
    } else {
        closed as f64 / total as f64
    }
}

/// 眼睛睁开程度评分（0-1），EAR 0.15 视为闭眼、0.35 视为完全睁开
pub fn eye_openness_score(info: &BlinkInfo) -> f64 {
    if info.avg_ear <= 0.0 {
        return 0.0;
    }
    let mut score = ((info.avg_ear - 0.15) / (0.35 - 0.15)).clamp(0.0, 1.0);
    if info.perclos > 0.5 {
        score *= 1.0 - info.perclos;
    }
    score
}

#[derive(Debug)]
struct BlinkState {
    ear_history: VecDeque<f64>,
    is_closed: bool,
    closed_start_frame: u64,
    frames_processed: u64,
    blink_count: u32,
    blink_frames: VecDeque<u64>,
}

impl BlinkState {
    fn new(window: usize) -> Self {
        Self {
            ear_history: VecDeque::with_capacity(window),
            is_closed: false,
            closed_start_frame: 0,
            frames_processed: 0,
            blink_count: 0,
            blink_frames: VecDeque::new(),
        }
    }
}

pub struct BlinkDetector {
    config: BlinkConfig,
    states: HashMap<TrackId, BlinkState>,
}

impl BlinkDetector {
    pub fn new(config: BlinkConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &BlinkConfig {
        &self.config
    }

    /// 分析一帧的眼部关键点并更新该轨迹的状态
    pub fn analyze(&mut self, landmarks: &FaceLandmarks, track_id: TrackId) -> BlinkInfo {
        let left_ear = eye_aspect_ratio(&landmarks.left_eye());
        let right_ear = eye_aspect_ratio(&landmarks.right_eye());
        let info = self.observe(track_id, left_ear, right_ear);
        tracing::trace!(track_id, avg_ear = info.avg_ear, perclos = info.perclos, "blink analyzed");
        info
    }

    /// 直接以左右眼 EAR 更新状态
    pub fn observe(&mut self, track_id: TrackId, left_ear: f64, right_ear: f64) -> BlinkInfo {
        let window = self.config.perclos_window.max(1);
        let state = self
            .states
            .entry(track_id)
            .or_insert_with(|| BlinkState::new(window));

        let avg_ear = (left_ear + right_ear) / 2.0;

        if state.ear_history.len() >= window {
            state.ear_history.pop_front();
        }
        state.ear_history.push_back(avg_ear);
        state.frames_processed += 1;

        if avg_ear < self.config.ear_threshold {
            if !state.is_closed {
                state.is_closed = true;
                state.closed_start_frame = state.frames_processed;
            }
        } else if state.is_closed {
            let closed_frames = state.frames_processed - state.closed_start_frame;
            if closed_frames >= u64::from(self.config.blink_consec_frames) {
                state.blink_count += 1;
                if state.blink_frames.len() >= self.config.blink_history.max(1) {
                    state.blink_frames.pop_front();
                }
                state.blink_frames.push_back(state.frames_processed);
            }
            state.is_closed = false;
        }

        BlinkInfo {
            left_ear,
            right_ear,
            avg_ear,
            is_blinking: state.is_closed,
            blink_rate: blink_rate(&state.blink_frames, self.config.assumed_fps),
            perclos: perclos(&state.ear_history, self.config.ear_threshold),
            blink_count: state.blink_count,
        }
    }

    /// 窗口至少填满一半且 PERCLOS 超过阈值
    pub fn is_drowsy(&self, track_id: TrackId) -> bool {
        let Some(state) = self.states.get(&track_id) else {
            return false;
        };
        if state.ear_history.is_empty() || state.ear_history.len() < self.config.perclos_window / 2 {
            return false;
        }
        perclos(&state.ear_history, self.config.ear_threshold) > self.config.drowsy_perclos_threshold
    }

    pub fn tracked_ids(&self) -> Vec<TrackId> {
        self.states.keys().copied().collect()
    }

    pub fn reset_track(&mut self, track_id: TrackId) {
        self.states.remove(&track_id);
    }

    pub fn reset_all(&mut self) {
        self.states.clear();
    }
}

impl Default for BlinkDetector {
    fn default() -> Self {
        Self::new(BlinkConfig::default())
    }
}

/// 眨眼频率（次/分钟），按帧序号与假定帧率换算，上限 60
fn blink_rate(blink_frames: &VecDeque<u64>, fps: f64) -> f64 {
    let (Some(first), Some(last)) = (blink_frames.front(), blink_frames.back()) else {
        return 0.0;
    };
    if blink_frames.len() < 2 || fps <= 0.0 {
        return 0.0;
    }
    let span_secs = (last - first) as f64 / fps;
    if span_secs < 1.0 {
        return 0.0;
    }
    let blinks = (blink_frames.len() - 1) as f64;
    (blinks / span_secs * 60.0).min(MAX_BLINK_RATE)
}
