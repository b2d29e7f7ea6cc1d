//! Uptime history queries.
//!
//! Reads the hourly and daily rollups from the history sink. Every call
//! succeeds: an unconfigured or failing sink yields empty sequences.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::db::{Granularity, RollupBucket, TimeSeriesSink, UptimeHistory};

#[derive(Clone)]
pub struct UptimeService {
    sink: Arc<dyn TimeSeriesSink>,
}

impl UptimeService {
    pub fn new(sink: Arc<dyn TimeSeriesSink>) -> Self {
        Self { sink }
    }

    /// Hourly buckets for the last 24 hours and daily buckets for the last 30 days.
    pub async fn get_uptime_history(&self, service_id: &str) -> UptimeHistory {
        let mut history = UptimeHistory::empty(service_id);
        history.hourly = self.buckets(service_id, Granularity::Hourly).await;
        history.daily = self.buckets(service_id, Granularity::Daily).await;
        history
    }

    /// History for every service the sink knows about, keyed by service id.
    pub async fn get_all_uptime_history(&self) -> BTreeMap<String, UptimeHistory> {
        let ids = match self.sink.service_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Uptime: failed to list services with history: {}", e);
                return BTreeMap::new();
            }
        };

        let mut histories = BTreeMap::new();
        for id in ids {
            let history = self.get_uptime_history(&id).await;
            histories.insert(id, history);
        }
        histories
    }

    async fn buckets(&self, service_id: &str, granularity: Granularity) -> Vec<RollupBucket> {
        match self
            .sink
            .query_rollup(service_id, granularity, granularity.default_window())
            .await
        {
            Ok(mut buckets) => {
                buckets.sort_by_key(|b| b.bucket_start);
                buckets
            }
            Err(e) => {
                tracing::error!(
                    "Uptime: failed to fetch {:?} history for {}: {}",
                    granularity,
                    service_id,
                    e
                );
                Vec::new()
            }
        }
    }
}
