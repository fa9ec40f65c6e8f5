//! 多人脸跟踪模块
//!
//! 用贪心 IoU 匹配把每帧检测关联到已有轨迹，为每张人脸分配跨帧稳定的 ID。
//!
//! 轨迹生命周期：
//! 新建（hit_streak=1）→ 确认（连续命中 ≥ 3）→ 丢失（未匹配，hit_streak 清零）
//! → 淘汰（frames_since_update > track_buffer）
//!
//! ID 单调递增，淘汰后不复用。每次 `update` 返回本帧被淘汰的 ID，
//! 调用方据此清理眨眼、视线、告警等按轨迹保存的状态。

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::TrackerConfig;
use crate::geometry::BoundingBox;
use crate::types::{Detection, TrackInfo, TrackedFace};
use crate::TrackId;

const CONFIRM_HITS: u32 = 3;

#[derive(Debug, Clone)]
struct Track {
    id: TrackId,
    bbox: BoundingBox,
    confirmed: bool,
    hit_streak: u32,
    frames_since_update: u32,
    age: u32,
}

impl Track {
    fn spawn(id: TrackId, bbox: BoundingBox) -> Self {
        Self {
            id,
            bbox,
            confirmed: false,
            hit_streak: 1,
            frames_since_update: 0,
            age: 1,
        }
    }

    fn hit(&mut self, bbox: BoundingBox) {
        self.bbox = bbox;
        self.hit_streak += 1;
        self.age += 1;
        self.frames_since_update = 0;
        self.confirmed = self.confirmed || self.hit_streak >= CONFIRM_HITS;
    }

    fn miss(&mut self) {
        self.frames_since_update += 1;
        self.hit_streak = 0;
    }

    fn info(&self) -> TrackInfo {
        TrackInfo {
            id: self.id,
            bbox: self.bbox,
            confirmed: self.confirmed,
            hit_streak: self.hit_streak,
            frames_since_update: self.frames_since_update,
            age: self.age,
        }
    }
}

/// 一次 `update` 的结果
#[derive(Debug, Clone, Default)]
pub struct TrackerOutput {
    /// 按检测输入顺序排列；低置信度且未匹配的检测不会出现
    pub tracked: Vec<TrackedFace>,
    /// 本帧被淘汰的轨迹 ID
    pub evicted: Vec<TrackId>,
}

pub struct FaceTracker {
    config: TrackerConfig,
    tracks: BTreeMap<TrackId, Track>,
    next_id: TrackId,
    frame_count: u64,
}

impl FaceTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: 1,
            frame_count: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn update(&mut self, detections: &[Detection]) -> TrackerOutput {
        self.frame_count += 1;

        let mut assigned: Vec<Option<TrackId>> = vec![None; detections.len()];
        let mut matched_tracks: Vec<TrackId> = Vec::new();

        if !self.tracks.is_empty() && !detections.is_empty() {
            let mut pairs: Vec<(usize, TrackId, f64)> =
                Vec::with_capacity(detections.len() * self.tracks.len());
            for (det_idx, det) in detections.iter().enumerate() {
                for track in self.tracks.values() {
                    pairs.push((det_idx, track.id, track.bbox.iou(&det.bbox)));
                }
            }
            // IoU 降序；相同 IoU 时按检测序号、轨迹 ID 升序，保证结果可复现
            pairs.sort_by(|a, b| {
                b.2.total_cmp(&a.2)
                    .then_with(|| a.0.cmp(&b.0))
                    .then_with(|| a.1.cmp(&b.1))
            });

            for (det_idx, track_id, iou) in pairs {
                if iou < self.config.match_thresh {
                    break;
                }
                if assigned[det_idx].is_some() || matched_tracks.contains(&track_id) {
                    continue;
                }
                if let Some(track) = self.tracks.get_mut(&track_id) {
                    track.hit(detections[det_idx].bbox);
                    assigned[det_idx] = Some(track_id);
                    matched_tracks.push(track_id);
                }
            }
        }

        for (det_idx, det) in detections.iter().enumerate() {
            if assigned[det_idx].is_none() && det.confidence >= self.config.track_thresh {
                let id = self.next_id;
                self.next_id += 1;
                self.tracks.insert(id, Track::spawn(id, det.bbox));
                assigned[det_idx] = Some(id);
                matched_tracks.push(id);
            }
        }

        let mut evicted = Vec::new();
        for track in self.tracks.values_mut() {
            if !matched_tracks.contains(&track.id) {
                track.miss();
                if track.frames_since_update > self.config.track_buffer {
                    evicted.push(track.id);
                }
            }
        }
        for id in &evicted {
            self.tracks.remove(id);
        }
        if !evicted.is_empty() {
            debug!(frame = self.frame_count, evicted = ?evicted, "tracks evicted");
        }

        let tracked = detections
            .iter()
            .zip(assigned)
            .filter_map(|(det, id)| {
                let id = id?;
                let track = self.tracks.get(&id)?;
                Some(TrackedFace {
                    detection: det.clone(),
                    track: track.info(),
                })
            })
            .collect();

        TrackerOutput { tracked, evicted }
    }

    pub fn track(&self, id: TrackId) -> Option<TrackInfo> {
        self.tracks.get(&id).map(Track::info)
    }

    pub fn tracks(&self) -> Vec<TrackInfo> {
        self.tracks.values().map(Track::info).collect()
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// 清空全部轨迹，ID 从 1 重新开始
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.next_id = 1;
        self.frame_count = 0;
    }
}

impl Default for FaceTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
