use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::analysis::{
    AnalysisRegistry, HttpProgressSink, ImageSequenceOpener, ProgressSink, VideoAnalyzer, VideoOpener,
};
use crate::clients::StageClients;
use crate::config::Config;
use crate::hub::RealtimeHub;
use crate::metrics::PipelineMetrics;
use crate::orchestrator::{Orchestrator, SessionRegistry};
use crate::stages::StageEngines;

/// 运行时可替换的外部协作者；测试中用 mock 实现替换
#[derive(Clone)]
pub struct Collaborators {
    pub clients: StageClients,
    pub opener: Arc<dyn VideoOpener>,
    pub sink: Arc<dyn ProgressSink>,
}

impl Collaborators {
    pub fn http(config: &Config) -> Self {
        Self {
            clients: StageClients::http(&config.services),
            opener: Arc::new(ImageSequenceOpener::new(config.analysis.default_fps)),
            sink: Arc::new(HttpProgressSink::new(
                &config.analysis.status_sink_url,
                config.analysis.sink_timeout_ms,
            )),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    orchestrator: Arc<Orchestrator>,
    analyzer: VideoAnalyzer,
    stages: Arc<StageEngines>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    pub fn new(config: &Config, collaborators: Collaborators, shutdown_tx: broadcast::Sender<()>) -> Self {
        let hub = Arc::new(RealtimeHub::new(config.orchestrator.publish_capacity));
        let metrics = Arc::new(PipelineMetrics::new());
        let orchestrator = Arc::new(Orchestrator::new(
            collaborators.clients,
            SessionRegistry::new(config.vision.tracker.clone()),
            hub,
            metrics,
            config.orchestrator.clone(),
        ));
        let analyzer = VideoAnalyzer::new(
            orchestrator.clone(),
            collaborators.opener,
            collaborators.sink,
            Arc::new(AnalysisRegistry::new()),
            config.analysis.clone(),
        );
        let stages = Arc::new(StageEngines::new(&config.vision, config.stages.score_window));

        Self {
            config: Arc::new(config.clone()),
            orchestrator,
            analyzer,
            stages,
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn from_config(config: &Config, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self::new(config, Collaborators::http(config), shutdown_tx)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        self.orchestrator.hub()
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        self.orchestrator.metrics()
    }

    pub fn analyzer(&self) -> &VideoAnalyzer {
        &self.analyzer
    }

    pub fn analyses(&self) -> &Arc<AnalysisRegistry> {
        self.analyzer.registry()
    }

    pub fn stages(&self) -> &Arc<StageEngines> {
        &self.stages
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
