use serde::{Deserialize, Serialize};

use crate::clients::WireAlert;
use crate::orchestrator::Participant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub timestamp_ms: u64,
    pub faces: Vec<Participant>,
    pub avg_attention: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedAlert {
    #[serde(flatten)]
    pub alert: WireAlert,
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub duration: f64,
    pub total_frames: u64,
    pub analyzed_frames: usize,
    pub avg_attention: f64,
    pub min_attention: f64,
    pub max_attention: f64,
    pub total_alerts: usize,
    pub timeline: Vec<TimelineEntry>,
    pub alerts: Vec<TimedAlert>,
}

/// 逐帧累积时间线与告警；平均/最值只统计有人脸的帧（均分为 0 的帧不计入）
#[derive(Debug, Default)]
pub struct SummaryBuilder {
    timeline: Vec<TimelineEntry>,
    alerts: Vec<TimedAlert>,
}

impl SummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, timestamp_ms: u64, faces: Vec<Participant>) {
        let avg_attention = if faces.is_empty() {
            0.0
        } else {
            faces.iter().map(|p| p.attention_score).sum::<f64>() / faces.len() as f64
        };
        for face in &faces {
            self.alerts.extend(face.alerts.iter().map(|alert| TimedAlert {
                alert: alert.clone(),
                timestamp_ms,
            }));
        }
        self.timeline.push(TimelineEntry {
            timestamp_ms,
            faces,
            avg_attention,
        });
    }

    pub fn analyzed_frames(&self) -> usize {
        self.timeline.len()
    }

    pub fn finish(self, duration: f64, total_frames: u64) -> AnalysisSummary {
        let scored: Vec<f64> = self
            .timeline
            .iter()
            .map(|t| t.avg_attention)
            .filter(|&s| s > 0.0)
            .collect();
        let (avg, min, max) = if scored.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                scored.iter().sum::<f64>() / scored.len() as f64,
                scored.iter().copied().fold(f64::INFINITY, f64::min),
                scored.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };
        AnalysisSummary {
            duration,
            total_frames,
            analyzed_frames: self.timeline.len(),
            avg_attention: avg,
            min_attention: min,
            max_attention: max,
            total_alerts: self.alerts.len(),
            timeline: self.timeline,
            alerts: self.alerts,
        }
    }
}
