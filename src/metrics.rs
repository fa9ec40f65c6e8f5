use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// 编排器处理计数，进程内累计
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    requests_total: AtomicU64,
    requests_success: AtomicU64,
    requests_failed: AtomicU64,
    faces_detected_total: AtomicU64,
    stage_fallbacks_total: AtomicU64,
    processing_time_us_sum: AtomicU64,
    processing_time_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub faces_detected_total: u64,
    pub stage_fallbacks_total: u64,
    pub processing_time_sum_ms: f64,
    pub processing_time_count: u64,
    pub avg_processing_time_ms: f64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, faces: usize) {
        self.requests_success.fetch_add(1, Ordering::Relaxed);
        self.faces_detected_total
            .fetch_add(faces as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.stage_fallbacks_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing_time(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.processing_time_us_sum
            .fetch_add(micros, Ordering::Relaxed);
        self.processing_time_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let sum_ms = self.processing_time_us_sum.load(Ordering::Relaxed) as f64 / 1000.0;
        let count = self.processing_time_count.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success: self.requests_success.load(Ordering::Relaxed),
            requests_failed: self.requests_failed.load(Ordering::Relaxed),
            faces_detected_total: self.faces_detected_total.load(Ordering::Relaxed),
            stage_fallbacks_total: self.stage_fallbacks_total.load(Ordering::Relaxed),
            processing_time_sum_ms: sum_ms,
            processing_time_count: count,
            avg_processing_time_ms: if count > 0 { sum_ms / count as f64 } else { 0.0 },
        }
    }
}
