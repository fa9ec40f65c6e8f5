use std::time::Duration;

use crate::analysis::AnalysisRegistry;

pub async fn run(registry: &AnalysisRegistry, retain: Duration) -> usize {
    let purged = registry.purge_finished(retain).await;
    tracing::info!(purged, "analysis_cleanup: done");
    purged
}
