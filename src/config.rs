//! Configuration module for homewatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::probe::DEFAULT_PROBE_TIMEOUT;
use crate::scheduler::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKER_COUNT};

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path to the SQLite service registry (default: "homewatch.db")
    pub db_path: String,
    /// Path to the SQLite uptime history; `None` runs without history
    pub history_path: Option<String>,
    /// Time between scheduling ticks (default: 5 minutes)
    pub check_interval: Duration,
    /// Number of probe workers (default: 5)
    pub worker_count: usize,
    /// Job queue capacity (default: 100)
    pub queue_capacity: usize,
    /// Per-probe request timeout (default: 10s)
    pub probe_timeout: Duration,
    /// Longest the scheduler waits for queue space before dropping a job (default: 5s)
    pub enqueue_timeout: Duration,
    /// Time between retention sweeps (default: 60s)
    pub retention_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: "homewatch.db".to_string(),
            history_path: None,
            check_interval: Duration::from_secs(300),
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            enqueue_timeout: Duration::from_secs(5),
            retention_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HOMEWATCH_DB_PATH`: registry database path
    /// - `HOMEWATCH_HISTORY_PATH`: history database path (unset disables history)
    /// - `HOMEWATCH_CHECK_INTERVAL`: seconds between ticks
    /// - `HOMEWATCH_WORKERS`: worker count
    /// - `HOMEWATCH_QUEUE_CAPACITY`: job queue capacity
    /// - `HOMEWATCH_PROBE_TIMEOUT`: probe timeout in seconds
    /// - `HOMEWATCH_ENQUEUE_TIMEOUT`: enqueue deadline in seconds
    /// - `HOMEWATCH_RETENTION_INTERVAL`: seconds between retention sweeps
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(db_path) = lookup("HOMEWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        cfg.history_path = lookup("HOMEWATCH_HISTORY_PATH").filter(|p| !p.trim().is_empty());

        if let Some(d) = parse_secs(&lookup, "HOMEWATCH_CHECK_INTERVAL").filter(|d| !d.is_zero()) {
            cfg.check_interval = d;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "HOMEWATCH_WORKERS") {
            cfg.worker_count = n.max(1);
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "HOMEWATCH_QUEUE_CAPACITY") {
            cfg.queue_capacity = n.max(1);
        }
        if let Some(d) = parse_secs(&lookup, "HOMEWATCH_PROBE_TIMEOUT").filter(|d| !d.is_zero()) {
            cfg.probe_timeout = d;
        }
        if let Some(d) = parse_secs(&lookup, "HOMEWATCH_ENQUEUE_TIMEOUT") {
            cfg.enqueue_timeout = d;
        }
        let retention = parse_secs(&lookup, "HOMEWATCH_RETENTION_INTERVAL");
        if let Some(d) = retention.filter(|d| !d.is_zero()) {
            cfg.retention_interval = d;
        }

        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

/// Fractional seconds; negative or non-finite values are rejected.
fn parse_secs<F>(lookup: &F, key: &str) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_var::<f64, _>(lookup, key)?;
    match Duration::try_from_secs_f64(secs) {
        Ok(d) => Some(d),
        Err(_) => {
            tracing::warn!("Ignoring out-of-range duration for {}: {}", key, secs);
            None
        }
    }
}
