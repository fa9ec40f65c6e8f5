use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clients::ServiceError;

/// 可以被兜底替换的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Landmarks,
    HeadPose,
    Gaze,
    Blink,
    Scorer,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landmarks => "landmarks",
            Self::HeadPose => "head_pose",
            Self::Gaze => "gaze",
            Self::Blink => "blink",
            Self::Scorer => "scorer",
        }
    }
}

pub enum StageOutcome<T> {
    Ok(T),
    Fallback(T),
}

impl<T> StageOutcome<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Ok(v) | Self::Fallback(v) => v,
        }
    }
}

/// 限时执行阶段调用；失败或超时立即替换为 `fallback`
pub async fn with_fallback<T, F>(stage: Stage, timeout: Duration, call: F, fallback: T) -> StageOutcome<T>
where
    F: Future<Output = Result<T, ServiceError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => StageOutcome::Ok(value),
        Ok(Err(err)) => {
            tracing::warn!(stage = stage.as_str(), error = %err, "stage failed, using fallback");
            StageOutcome::Fallback(fallback)
        }
        Err(_) => {
            tracing::warn!(
                stage = stage.as_str(),
                timeout_ms = timeout.as_millis() as u64,
                "stage timed out, using fallback"
            );
            StageOutcome::Fallback(fallback)
        }
    }
}
