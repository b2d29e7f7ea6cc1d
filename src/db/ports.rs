//! Collaborator interfaces the health engine depends on.
//!
//! The engine never touches SQLite directly; it is handed an
//! `Arc<dyn ServiceRegistry>` and an `Arc<dyn TimeSeriesSink>` at startup.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::history::HistoryStore;
use super::models::*;
use super::store::{DbError, Store};

/// Source of monitored targets and owner of per-service health state.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Current snapshot of services to probe. May be empty.
    async fn list_monitored_services(&self) -> Result<Vec<MonitoredTarget>, DbError>;

    /// Upsert the latest status of a service.
    async fn record_health(
        &self,
        id: &str,
        status: HealthStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), DbError>;
}

/// Append-only sample store with hourly/daily rollups.
#[async_trait]
pub trait TimeSeriesSink: Send + Sync {
    async fn append_sample(&self, sample: &HealthSample) -> Result<(), DbError>;

    /// Buckets starting within the last `window`, oldest first. Missing buckets are absent.
    async fn query_rollup(
        &self,
        service_id: &str,
        granularity: Granularity,
        window: ChronoDuration,
    ) -> Result<Vec<RollupBucket>, DbError>;

    /// Every service id with history.
    async fn service_ids(&self) -> Result<Vec<String>, DbError>;

    /// Drop data that has aged out of its retention window.
    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, DbError>;
}

#[async_trait]
impl ServiceRegistry for Store {
    async fn list_monitored_services(&self) -> Result<Vec<MonitoredTarget>, DbError> {
        self.get_monitored_services()
    }

    async fn record_health(
        &self,
        id: &str,
        status: HealthStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        self.update_service_health(id, status, checked_at)
    }
}

#[async_trait]
impl TimeSeriesSink for HistoryStore {
    async fn append_sample(&self, sample: &HealthSample) -> Result<(), DbError> {
        self.add_sample(sample)
    }

    async fn query_rollup(
        &self,
        service_id: &str,
        granularity: Granularity,
        window: ChronoDuration,
    ) -> Result<Vec<RollupBucket>, DbError> {
        self.get_rollups(service_id, granularity, Utc::now() - window)
    }

    async fn service_ids(&self) -> Result<Vec<String>, DbError> {
        self.get_service_ids()
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, DbError> {
        self.apply_retention(now)
    }
}

/// Stand-in used when no history database is configured.
///
/// Writes are accepted and discarded; reads are always empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl TimeSeriesSink for NullSink {
    async fn append_sample(&self, _sample: &HealthSample) -> Result<(), DbError> {
        Ok(())
    }

    async fn query_rollup(
        &self,
        _service_id: &str,
        _granularity: Granularity,
        _window: ChronoDuration,
    ) -> Result<Vec<RollupBucket>, DbError> {
        Ok(Vec::new())
    }

    async fn service_ids(&self) -> Result<Vec<String>, DbError> {
        Ok(Vec::new())
    }

    async fn prune(&self, _now: DateTime<Utc>) -> Result<usize, DbError> {
        Ok(0)
    }
}
