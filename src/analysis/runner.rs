use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;

use super::{
    AnalysisError, AnalysisRegistry, AnalysisSummary, CancelFlag, ProgressSink, ProgressUpdate,
    SummaryBuilder, VideoOpener,
};
use crate::config::AnalysisConfig;
use crate::orchestrator::{FrameRequest, Orchestrator};

const MAX_RUNNING_PROGRESS: u64 = 95;

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisJob {
    pub analysis_id: String,
    pub video_path: String,
}

impl AnalysisJob {
    fn session_id(&self) -> String {
        format!("analysis:{}", self.analysis_id)
    }
}

#[derive(Clone)]
pub struct VideoAnalyzer {
    orchestrator: Arc<Orchestrator>,
    opener: Arc<dyn VideoOpener>,
    sink: Arc<dyn ProgressSink>,
    registry: Arc<AnalysisRegistry>,
    config: AnalysisConfig,
}

impl VideoAnalyzer {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        opener: Arc<dyn VideoOpener>,
        sink: Arc<dyn ProgressSink>,
        registry: Arc<AnalysisRegistry>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            orchestrator,
            opener,
            sink,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<AnalysisRegistry> {
        &self.registry
    }

    /// 登记任务并在后台执行；同一 id 正在处理时返回 `AlreadyRunning`
    pub async fn start(&self, job: AnalysisJob) -> Result<(), AnalysisError> {
        if job.analysis_id.trim().is_empty() {
            return Err(AnalysisError::Invalid("analysis_id is required".to_string()));
        }
        if job.video_path.trim().is_empty() {
            return Err(AnalysisError::Invalid("video_path is required".to_string()));
        }
        let cancel = self.registry.begin(&job.analysis_id, &job.video_path).await?;
        let analyzer = self.clone();
        tokio::spawn(async move {
            analyzer.run(job, cancel).await;
        });
        Ok(())
    }

    /// 执行到终态；无论成功失败都会向接收方推送最终状态
    pub async fn run(&self, job: AnalysisJob, cancel: CancelFlag) -> Option<AnalysisSummary> {
        let id = job.analysis_id.as_str();
        self.sink.report(id, &ProgressUpdate::processing(0)).await;

        let session_id = job.session_id();
        let outcome = self.analyze(&job, &session_id, &cancel).await;
        self.orchestrator.remove_session(&session_id).await;

        match outcome {
            Ok((summary, results)) => {
                self.registry.complete(id, summary.duration).await;
                self.sink
                    .report(id, &ProgressUpdate::completed(summary.duration, results))
                    .await;
                tracing::info!(
                    analysis_id = id,
                    analyzed_frames = summary.analyzed_frames,
                    total_alerts = summary.total_alerts,
                    "video analysis completed"
                );
                Some(summary)
            }
            Err(e) => {
                match &e {
                    AnalysisError::CannotOpen { path, reason } => {
                        tracing::warn!(analysis_id = id, path = %path, reason = %reason, "cannot open video");
                    }
                    other => tracing::warn!(analysis_id = id, error = %other, "video analysis failed"),
                }
                let message = e.to_string();
                self.registry.fail(id, &message).await;
                self.sink.report(id, &ProgressUpdate::failed(message)).await;
                None
            }
        }
    }

    async fn analyze(
        &self,
        job: &AnalysisJob,
        session_id: &str,
        cancel: &CancelFlag,
    ) -> Result<(AnalysisSummary, String), AnalysisError> {
        let id = job.analysis_id.as_str();
        let mut source = self.opener.open(&job.video_path).await?;

        let fps = if source.fps() > 0.0 {
            source.fps()
        } else {
            self.config.default_fps
        };
        let total_frames = source.total_frames();
        let duration = total_frames as f64 / fps;
        // 每秒视频抽一帧
        let interval = (fps as u64).max(1);
        let progress_every = self.config.progress_every.max(1);

        let mut builder = SummaryBuilder::new();
        let mut frame_idx: u64 = 0;
        let mut processed: u64 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(AnalysisError::Cancelled);
            }
            if !source.grab() {
                break;
            }
            if frame_idx % interval == 0 {
                let bytes = source.retrieve().await?;
                let request = FrameRequest::new(STANDARD.encode(&bytes))
                    .with_session(session_id)
                    .with_request_id(format!("frame_{frame_idx}"));
                let response = self.orchestrator.process_frame(request).await;
                if !response.success {
                    tracing::debug!(analysis_id = id, frame_idx, error = ?response.error, "frame failed");
                }

                let timestamp_ms = (frame_idx as f64 / fps * 1000.0) as u64;
                builder.push_frame(timestamp_ms, response.participants);

                processed += 1;
                if processed % progress_every == 0 && total_frames > 0 {
                    let progress = (frame_idx * 100 / total_frames).min(MAX_RUNNING_PROGRESS) as u8;
                    self.registry.set_progress(id, progress).await;
                    self.sink.report(id, &ProgressUpdate::processing(progress)).await;
                }
            }
            frame_idx += 1;
        }

        let summary = builder.finish(duration, total_frames);
        let results = serde_json::to_string(&summary)?;
        Ok((summary, results))
    }
}
