use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Processing,
    Completed,
    Failed,
}

impl AnalysisStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

/// 推送给状态接收方的进度；`results` 是 JSON 编码后的摘要字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub progress: u8,
    pub status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressUpdate {
    pub fn processing(progress: u8) -> Self {
        Self {
            progress: progress.min(100),
            status: AnalysisStatus::Processing,
            duration: None,
            results: None,
            error: None,
        }
    }

    pub fn completed(duration: f64, results: String) -> Self {
        Self {
            progress: 100,
            status: AnalysisStatus::Completed,
            duration: Some(duration),
            results: Some(results),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            progress: 0,
            status: AnalysisStatus::Failed,
            duration: None,
            results: None,
            error: Some(error.into()),
        }
    }
}

/// 进度接收方；上报失败只记录日志，不影响分析本身
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, analysis_id: &str, update: &ProgressUpdate);
}

/// 通过 `PUT {base}/api/v1/video-analysis/{id}/progress` 上报
pub struct HttpProgressSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProgressSink {
    pub fn new(base_url: &str, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn progress_url(&self, analysis_id: &str) -> String {
        format!("{}/api/v1/video-analysis/{}/progress", self.base_url, analysis_id)
    }
}

#[async_trait]
impl ProgressSink for HttpProgressSink {
    async fn report(&self, analysis_id: &str, update: &ProgressUpdate) {
        let url = self.progress_url(analysis_id);
        match self.client.put(&url).json(update).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!(analysis_id, progress = update.progress, "progress reported");
            }
            Ok(resp) => {
                tracing::warn!(analysis_id, status = resp.status().as_u16(), "progress sink rejected update");
            }
            Err(e) => {
                tracing::warn!(analysis_id, error = %e, "failed to report progress");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_are_omitted() {
        let value = serde_json::to_value(ProgressUpdate::processing(40)).unwrap();
        assert_eq!(value, serde_json::json!({"progress": 40, "status": "processing"}));

        let failed = serde_json::to_value(ProgressUpdate::failed("Cannot open video file")).unwrap();
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["error"], "Cannot open video file");
    }

    #[test]
    fn url_joins_without_double_slash() {
        let sink = HttpProgressSink::new("http://gateway:8080/", 1000);
        assert_eq!(
            sink.progress_url("a1"),
            "http://gateway:8080/api/v1/video-analysis/a1/progress"
        );
    }
}
