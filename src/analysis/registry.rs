use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use super::{AnalysisError, AnalysisStatus, CancelFlag};

/// 一个分析任务的可观察状态
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub video_path: String,
    pub status: AnalysisStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

struct Entry {
    record: AnalysisRecord,
    cancel: CancelFlag,
}

/// 进程内的任务表；同一个 analysis_id 在处理中时不可重复提交
#[derive(Default)]
pub struct AnalysisRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin(&self, analysis_id: &str, video_path: &str) -> Result<CancelFlag, AnalysisError> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(analysis_id) {
            if existing.record.status == AnalysisStatus::Processing {
                return Err(AnalysisError::AlreadyRunning(analysis_id.to_string()));
            }
        }
        let cancel = CancelFlag::default();
        entries.insert(
            analysis_id.to_string(),
            Entry {
                record: AnalysisRecord {
                    analysis_id: analysis_id.to_string(),
                    video_path: video_path.to_string(),
                    status: AnalysisStatus::Processing,
                    progress: 0,
                    duration: None,
                    error: None,
                    started_at: Utc::now(),
                    finished_at: None,
                },
                cancel: cancel.clone(),
            },
        );
        Ok(cancel)
    }

    pub async fn set_progress(&self, analysis_id: &str, progress: u8) {
        if let Some(entry) = self.entries.write().await.get_mut(analysis_id) {
            if entry.record.status == AnalysisStatus::Processing {
                entry.record.progress = progress.min(100);
            }
        }
    }

    pub async fn complete(&self, analysis_id: &str, duration: f64) {
        self.finish(analysis_id, AnalysisStatus::Completed, Some(duration), None)
            .await;
    }

    pub async fn fail(&self, analysis_id: &str, error: &str) {
        self.finish(analysis_id, AnalysisStatus::Failed, None, Some(error.to_string()))
            .await;
    }

    async fn finish(
        &self,
        analysis_id: &str,
        status: AnalysisStatus,
        duration: Option<f64>,
        error: Option<String>,
    ) {
        if let Some(entry) = self.entries.write().await.get_mut(analysis_id) {
            let record = &mut entry.record;
            record.status = status;
            record.progress = if status == AnalysisStatus::Completed { 100 } else { record.progress };
            record.duration = duration;
            record.error = error;
            record.finished_at = Some(Utc::now());
        }
    }

    pub async fn get(&self, analysis_id: &str) -> Option<AnalysisRecord> {
        self.entries
            .read()
            .await
            .get(analysis_id)
            .map(|e| e.record.clone())
    }

    /// 请求取消；任务在下一帧前观察到并以 failed 结束
    pub async fn cancel(&self, analysis_id: &str) -> Result<(), AnalysisError> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(analysis_id)
            .ok_or_else(|| AnalysisError::NotFound(analysis_id.to_string()))?;
        if entry.record.status.is_terminal() {
            return Err(AnalysisError::Invalid(format!(
                "analysis {analysis_id} already finished"
            )));
        }
        entry.cancel.cancel();
        Ok(())
    }

    /// 清理结束超过 `retain` 的记录
    pub async fn purge_finished(&self, retain: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(retain)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            return 0;
        };
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| match e.record.finished_at {
            Some(finished) => finished > cutoff,
            None => true,
        });
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_running_job_is_rejected() {
        let registry = AnalysisRegistry::new();
        registry.begin("a1", "/tmp/v").await.unwrap();
        let err = registry.begin("a1", "/tmp/v").await.unwrap_err();
        assert!(matches!(err, AnalysisError::AlreadyRunning(_)));

        registry.fail("a1", "boom").await;
        assert!(registry.begin("a1", "/tmp/v").await.is_ok());
    }

    #[tokio::test]
    async fn lifecycle_updates_record() {
        let registry = AnalysisRegistry::new();
        registry.begin("a1", "/tmp/v").await.unwrap();
        registry.set_progress("a1", 40).await;
        assert_eq!(registry.get("a1").await.unwrap().progress, 40);

        registry.complete("a1", 12.5).await;
        let record = registry.get("a1").await.unwrap();
        assert_eq!(record.status, AnalysisStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.duration, Some(12.5));
        assert!(record.finished_at.is_some());

        // 结束后的进度更新被忽略
        registry.set_progress("a1", 10).await;
        assert_eq!(registry.get("a1").await.unwrap().progress, 100);
    }

    #[tokio::test]
    async fn cancel_sets_flag_only_while_running() {
        let registry = AnalysisRegistry::new();
        let flag = registry.begin("a1", "/tmp/v").await.unwrap();
        registry.cancel("a1").await.unwrap();
        assert!(flag.is_cancelled());

        registry.fail("a1", "cancelled").await;
        assert!(matches!(registry.cancel("a1").await, Err(AnalysisError::Invalid(_))));
        assert!(matches!(registry.cancel("nope").await, Err(AnalysisError::NotFound(_))));
    }

    #[tokio::test]
    async fn purge_keeps_running_and_recent_jobs() {
        let registry = AnalysisRegistry::new();
        registry.begin("running", "/v").await.unwrap();
        registry.begin("done", "/v").await.unwrap();
        registry.complete("done", 1.0).await;

        assert_eq!(registry.purge_finished(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.purge_finished(Duration::ZERO).await, 1);
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("running").await.is_some());
    }
}
