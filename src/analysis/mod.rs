//! 离线视频分析
//!
//! 打开视频源，每秒抽取一帧送入编排器，累积时间线与带时间戳的告警，
//! 并把进度和最终结果推送给外部状态接收方。

mod progress;
mod registry;
mod runner;
mod source;
mod summary;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

pub use progress::{AnalysisStatus, HttpProgressSink, ProgressSink, ProgressUpdate};
pub use registry::{AnalysisRecord, AnalysisRegistry};
pub use runner::{AnalysisJob, VideoAnalyzer};
pub use source::{ImageSequenceOpener, ImageSequenceSource, VideoOpener, VideoSource};
pub use summary::{AnalysisSummary, SummaryBuilder, TimedAlert, TimelineEntry};

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// 对外只暴露固定文案，具体原因进日志
    #[error("Cannot open video file")]
    CannotOpen { path: String, reason: String },
    #[error("failed to read frame {index}: {reason}")]
    FrameRead { index: u64, reason: String },
    #[error("analysis {0} is already running")]
    AlreadyRunning(String),
    #[error("analysis {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error("cancelled")]
    Cancelled,
    #[error("failed to encode results: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 跨任务共享的取消标记
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
