//! Periodic eviction of finished and abandoned batches.
//!
//! Runs [`BatchRegistry::sweep`] on a fixed interval using
//! `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chemaudit_pipeline::BatchRegistry;
use tokio_util::sync::CancellationToken;

/// Run the retention sweep loop until `cancel` is triggered.
pub async fn run(registry: Arc<BatchRegistry>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        retention_secs = registry.config().retention.as_secs(),
        abandon_grace_secs = registry.config().abandon_grace.as_secs(),
        "Batch retention job started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Batch retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                let report = registry.sweep(chrono::Utc::now()).await;
                if report.is_empty() {
                    tracing::debug!("Batch retention: nothing to evict");
                }
            }
        }
    }
}
