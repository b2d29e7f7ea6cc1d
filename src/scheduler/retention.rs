//! Retention manager for pruning aged-out history.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::TimeSeriesSink;

/// Periodically asks the sink to drop samples and buckets past their window.
pub struct RetentionManager {
    sink: Arc<dyn TimeSeriesSink>,
    interval: Duration,
}

impl RetentionManager {
    pub fn new(sink: Arc<dyn TimeSeriesSink>, interval: Duration) -> Self {
        Self { sink, interval }
    }

    /// Start the retention background task. It runs until `stop` is cancelled.
    pub fn start(self, stop: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = interval.tick() => {
                        process_retention(self.sink.as_ref()).await;
                    }
                }
            }
        })
    }
}

async fn process_retention(sink: &dyn TimeSeriesSink) {
    match sink.prune(Utc::now()).await {
        Ok(0) => {}
        Ok(deleted) => tracing::debug!("RetentionManager: pruned {} rows", deleted),
        Err(e) => tracing::error!("RetentionManager: failed to prune history: {}", e),
    }
}
