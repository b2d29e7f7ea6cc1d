//! Database model types.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A service the registry wants health-checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    pub id: String,
    pub url: String,
}

/// Outcome classification of a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Online,
    Offline,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Online => "online",
            HealthStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(HealthStatus::Online),
            "offline" => Ok(HealthStatus::Offline),
            other => Err(format!("unknown health status: {}", other)),
        }
    }
}

/// A single probe result as appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSample {
    pub service_id: String,
    pub url: String,
    pub status: HealthStatus,
    /// Time to outcome in milliseconds, timeouts included
    pub latency_ms: u64,
    pub observed_at: DateTime<Utc>,
}

/// Registry-owned health state of one service.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealthState {
    pub health_status: Option<HealthStatus>,
    pub last_checked: Option<DateTime<Utc>>,
}

/// A registered service row.
#[cfg(test)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub url: String,
    pub check_health: bool,
}

/// Width of a rollup bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hourly,
    Daily,
}

impl Granularity {
    pub fn bucket_seconds(&self) -> i64 {
        match self {
            Granularity::Hourly => 3600,
            Granularity::Daily => 86400,
        }
    }

    /// How far back buckets of this width are kept and served.
    pub fn default_window(&self) -> ChronoDuration {
        match self {
            Granularity::Hourly => ChronoDuration::hours(24),
            Granularity::Daily => ChronoDuration::days(30),
        }
    }

    /// Start of the bucket containing `dt`.
    pub fn bucket_start(&self, dt: DateTime<Utc>) -> DateTime<Utc> {
        truncate_to_window(dt, self.bucket_seconds())
    }
}

/// Pre-aggregated up/down counts for one service and one time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupBucket {
    pub service_id: String,
    pub bucket_start: DateTime<Utc>,
    pub up_count: u64,
    pub down_count: u64,
    pub avg_latency: f64,
}

impl RollupBucket {
    pub fn total(&self) -> u64 {
        self.up_count + self.down_count
    }
}

/// Hourly and daily rollups for one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UptimeHistory {
    pub service_id: String,
    pub hourly: Vec<RollupBucket>,
    pub daily: Vec<RollupBucket>,
}

impl UptimeHistory {
    pub fn empty(service_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            hourly: Vec::new(),
            daily: Vec::new(),
        }
    }
}

/// Truncate a datetime to the start of its containing window.
pub fn truncate_to_window(dt: DateTime<Utc>, window_seconds: i64) -> DateTime<Utc> {
    let ts = dt.timestamp();
    let truncated = ts - ts.rem_euclid(window_seconds);
    DateTime::from_timestamp(truncated, 0).unwrap_or(dt)
}
