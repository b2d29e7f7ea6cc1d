//! SQLite uptime history.
//!
//! Raw samples go into `health_samples`; insert triggers keep the hourly and
//! daily rollup tables current, so readers never aggregate on the fly.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rusqlite::{params, Connection, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::models::*;
use super::store::DbError;

/// How long raw samples are kept.
pub const RAW_RETENTION_DAYS: i64 = 30;

/// Thread-safe history store.
#[derive(Clone)]
pub struct HistoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl HistoryStore {
    /// Open (or create) the history database at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute_batch(include_str!("../../migrations/000002_health_history.up.sql"))
            .map_err(|e| DbError::Migration(format!("Migration 2 failed: {}", e)))?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    // --- Samples ---

    /// Append one probe sample.
    pub fn add_sample(&self, sample: &HealthSample) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO health_samples (service_id, url, status, latency_ms, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sample.service_id,
                sample.url,
                sample.status.as_str(),
                clamp_i64(sample.latency_ms),
                sample.observed_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Count raw samples for a service in `[start, end)`.
    #[cfg(test)]
    pub fn count_samples(
        &self,
        service_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64, DbError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM health_samples
             WHERE service_id = ?1 AND observed_at >= ?2 AND observed_at < ?3",
            params![service_id, start.timestamp_millis(), end.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Delete raw samples before a cutoff.
    pub fn delete_samples_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM health_samples WHERE observed_at < ?1",
            params![cutoff.timestamp_millis()],
        )?;
        Ok(deleted)
    }

    // --- Rollups ---

    /// Get rollup buckets for a service starting at or after `since`, oldest first.
    ///
    /// `since` is not rounded to a bucket boundary, so a bucket that began
    /// before it is left out even if some of its samples are newer.
    pub fn get_rollups(
        &self,
        service_id: &str,
        granularity: Granularity,
        since: DateTime<Utc>,
    ) -> Result<Vec<RollupBucket>, DbError> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT service_id, bucket_start, up_count, down_count, latency_sum
             FROM {}
             WHERE service_id = ?1 AND bucket_start >= ?2
             ORDER BY bucket_start ASC",
            rollup_table(granularity)
        );
        let mut stmt = conn.prepare(&sql)?;

        let buckets = stmt
            .query_map(params![service_id, since.timestamp_millis()], |row| {
                let start_ms: i64 = row.get(1)?;
                let latency_sum: i64 = row.get(4)?;
                let mut bucket = RollupBucket {
                    service_id: row.get(0)?,
                    bucket_start: DateTime::from_timestamp_millis(start_ms).unwrap_or_default(),
                    up_count: row.get::<_, i64>(2)?.max(0) as u64,
                    down_count: row.get::<_, i64>(3)?.max(0) as u64,
                    avg_latency: 0.0,
                };
                if bucket.total() > 0 {
                    bucket.avg_latency = latency_sum as f64 / bucket.total() as f64;
                }
                Ok(bucket)
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        Ok(buckets)
    }

    /// Delete rollup buckets that start before a cutoff.
    pub fn delete_rollups_before(
        &self,
        granularity: Granularity,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let sql = format!("DELETE FROM {} WHERE bucket_start < ?1", rollup_table(granularity));
        let deleted = conn.execute(&sql, params![cutoff.timestamp_millis()])?;
        Ok(deleted)
    }

    /// Every service id that has rollup data, sorted.
    pub fn get_service_ids(&self) -> Result<Vec<String>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT service_id FROM health_history_hourly
             UNION
             SELECT service_id FROM health_history_daily
             ORDER BY service_id ASC",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<SqlResult<Vec<String>>>()?;
        Ok(ids)
    }

    /// Apply the retention windows relative to `now`.
    ///
    /// Buckets are dropped once they have fully left their window.
    pub fn apply_retention(&self, now: DateTime<Utc>) -> Result<usize, DbError> {
        let raw_cutoff = now - ChronoDuration::days(RAW_RETENTION_DAYS);
        let mut deleted = self.delete_samples_before(raw_cutoff)?;
        for granularity in [Granularity::Hourly, Granularity::Daily] {
            let cutoff = granularity.bucket_start(now - granularity.default_window());
            deleted += self.delete_rollups_before(granularity, cutoff)?;
        }
        Ok(deleted)
    }
}

fn rollup_table(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Hourly => "health_history_hourly",
        Granularity::Daily => "health_history_daily",
    }
}

fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn sample(id: &str, status: HealthStatus, latency_ms: u64, at: DateTime<Utc>) -> HealthSample {
        HealthSample {
            service_id: id.to_string(),
            url: format!("http://{}.test", id),
            status,
            latency_ms,
            observed_at: at,
        }
    }

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap()
    }

    fn hours(h: i64) -> ChronoDuration {
        ChronoDuration::hours(h)
    }

    #[test]
    fn test_hourly_rollup_counts_match_samples() {
        let tmp = NamedTempFile::new().unwrap();
        let store = HistoryStore::new(tmp.path()).unwrap();

        // Spread samples over three hours, including exact hour boundaries
        let offsets_min = [0, 5, 59, 60, 61, 119, 125, 170, 179];
        for (i, m) in offsets_min.iter().enumerate() {
            let status = if i % 3 == 0 {
                HealthStatus::Offline
            } else {
                HealthStatus::Online
            };
            let at = epoch() + ChronoDuration::minutes(*m) + ChronoDuration::seconds(30);
            store.add_sample(&sample("a", status, 10 * (i as u64 + 1), at)).unwrap();
        }
        // Another service must not leak into "a"'s buckets
        store.add_sample(&sample("b", HealthStatus::Online, 5, epoch())).unwrap();

        let buckets = store.get_rollups("a", Granularity::Hourly, epoch()).unwrap();
        assert_eq!(buckets.len(), 3);

        for bucket in &buckets {
            let end = bucket.bucket_start + ChronoDuration::hours(1);
            let raw = store.count_samples("a", bucket.bucket_start, end).unwrap();
            assert_eq!(bucket.total(), raw);
        }

        assert_eq!(buckets[0].bucket_start, epoch());
        assert_eq!((buckets[0].up_count, buckets[0].down_count), (2, 1));
        // Latencies 10, 20, 30 in the first hour
        assert!((buckets[0].avg_latency - 20.0).abs() < 1e-9);
        assert!(buckets.windows(2).all(|w| w[0].bucket_start < w[1].bucket_start));
    }

    #[test]
    fn test_daily_rollup() {
        let tmp = NamedTempFile::new().unwrap();
        let store = HistoryStore::new(tmp.path()).unwrap();

        let samples = [
            (HealthStatus::Online, 100, epoch() + hours(1)),
            (HealthStatus::Offline, 300, epoch() + hours(23)),
            (HealthStatus::Online, 50, epoch() + hours(25)),
        ];
        for (status, latency, at) in samples {
            store.add_sample(&sample("a", status, latency, at)).unwrap();
        }

        let days = store.get_rollups("a", Granularity::Daily, epoch()).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].bucket_start, epoch());
        assert_eq!((days[0].up_count, days[0].down_count), (1, 1));
        assert!((days[0].avg_latency - 200.0).abs() < 1e-9);
        assert_eq!(days[1].bucket_start, epoch() + ChronoDuration::days(1));
        assert_eq!(days[1].total(), 1);
    }

    #[test]
    fn test_rollups_since_skips_older_buckets() {
        let tmp = NamedTempFile::new().unwrap();
        let store = HistoryStore::new(tmp.path()).unwrap();

        for at in [epoch(), epoch() + hours(4), epoch() + hours(5)] {
            store.add_sample(&sample("a", HealthStatus::Online, 1, at)).unwrap();
        }

        // The 04:00 bucket began before the cutoff and is left out
        let since = epoch() + hours(4) + ChronoDuration::minutes(30);
        let buckets = store.get_rollups("a", Granularity::Hourly, since).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].bucket_start, epoch() + ChronoDuration::hours(5));
    }

    #[test]
    fn test_unknown_service_has_no_rollups() {
        let tmp = NamedTempFile::new().unwrap();
        let store = HistoryStore::new(tmp.path()).unwrap();
        assert!(store.get_rollups("nobody", Granularity::Hourly, epoch()).unwrap().is_empty());
        assert!(store.get_service_ids().unwrap().is_empty());
    }

    #[test]
    fn test_apply_retention() {
        let tmp = NamedTempFile::new().unwrap();
        let store = HistoryStore::new(tmp.path()).unwrap();
        let now = epoch() + ChronoDuration::days(40);

        store.add_sample(&sample("old", HealthStatus::Online, 1, epoch())).unwrap();
        for at in [now - ChronoDuration::days(2), now - hours(1)] {
            store.add_sample(&sample("a", HealthStatus::Online, 1, at)).unwrap();
        }

        store.apply_retention(now).unwrap();

        // Raw sample from 40 days ago is gone along with its buckets
        assert_eq!(store.count_samples("old", epoch(), now).unwrap(), 0);
        assert_eq!(store.get_service_ids().unwrap(), vec!["a".to_string()]);

        // The two-day-old hour bucket is pruned; its day bucket survives
        let hourly = store.get_rollups("a", Granularity::Hourly, epoch()).unwrap();
        assert_eq!(hourly.len(), 1);
        let daily = store.get_rollups("a", Granularity::Daily, epoch()).unwrap();
        assert_eq!(daily.len(), 2);
    }
}
