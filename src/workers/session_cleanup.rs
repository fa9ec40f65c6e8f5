use std::time::Duration;

use crate::orchestrator::Orchestrator;
use crate::stages::StageEngines;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions: usize,
    pub stage_sessions: usize,
    pub channels: usize,
}

/// 回收空闲的编排会话（含跟踪器与发布通道）、阶段服务的会话状态，以及无人订阅的通道
pub async fn run(
    orchestrator: &Orchestrator,
    stages: &StageEngines,
    session_idle: Duration,
    track_idle: Duration,
) -> CleanupReport {
    tracing::debug!("session_cleanup: start");
    let report = CleanupReport {
        sessions: orchestrator.evict_idle_sessions(session_idle).await,
        stage_sessions: stages.evict_idle(track_idle).await,
        channels: orchestrator.hub().prune_idle().await,
    };
    tracing::info!(
        sessions = report.sessions,
        stage_sessions = report.stage_sessions,
        channels = report.channels,
        "session_cleanup: done"
    );
    report
}
