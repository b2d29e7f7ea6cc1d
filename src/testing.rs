//! Test doubles and a local HTTP endpoint shared by the unit tests.

use async_trait::async_trait;
use axum::{http::StatusCode, response::Redirect, routing::get, Router};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::db::*;
use crate::probe::{ProbeOutcome, Prober};

/// Serve a handful of fixed endpoints on an ephemeral local port.
pub async fn spawn_test_server() -> SocketAddr {
    let app = Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/moved", get(|| async { Redirect::temporary("/ok") }))
        .route("/loop", get(|| async { Redirect::temporary("/loop") }))
        .route("/not-modified", get(|| async { StatusCode::NOT_MODIFIED }))
        .route("/missing", get(|| async { StatusCode::NOT_FOUND }))
        .route("/error", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route(
            "/delayed",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                "ok"
            }),
        )
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn target(id: &str, url: &str) -> MonitoredTarget {
    MonitoredTarget {
        id: id.to_string(),
        url: url.to_string(),
    }
}

/// In-memory registry that remembers every health write.
#[derive(Default)]
pub struct MemoryRegistry {
    pub targets: Mutex<Vec<MonitoredTarget>>,
    pub health: Mutex<Vec<(String, HealthStatus, DateTime<Utc>)>>,
    pub fail_list: AtomicBool,
    pub fail_record: AtomicBool,
    pub list_calls: AtomicUsize,
}

impl MemoryRegistry {
    pub fn with_targets(targets: Vec<MonitoredTarget>) -> Self {
        Self {
            targets: Mutex::new(targets),
            ..Default::default()
        }
    }

    pub fn latest(&self, id: &str) -> Option<HealthStatus> {
        self.health
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(sid, _, _)| sid == id)
            .map(|(_, status, _)| *status)
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn list_monitored_services(&self) -> Result<Vec<MonitoredTarget>, DbError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("registry offline".to_string()));
        }
        Ok(self.targets.lock().unwrap().clone())
    }

    async fn record_health(
        &self,
        id: &str,
        status: HealthStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        if self.fail_record.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("registry offline".to_string()));
        }
        self.health
            .lock()
            .unwrap()
            .push((id.to_string(), status, checked_at));
        Ok(())
    }
}

/// In-memory sink that keeps raw samples and can be told to fail.
#[derive(Default)]
pub struct MemorySink {
    pub samples: Mutex<Vec<HealthSample>>,
    pub fail: AtomicBool,
}

impl MemorySink {
    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
            ..Default::default()
        }
    }

    fn check(&self) -> Result<(), DbError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("history offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TimeSeriesSink for MemorySink {
    async fn append_sample(&self, sample: &HealthSample) -> Result<(), DbError> {
        self.check()?;
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }

    async fn query_rollup(
        &self,
        _service_id: &str,
        _granularity: Granularity,
        _window: ChronoDuration,
    ) -> Result<Vec<RollupBucket>, DbError> {
        self.check()?;
        Ok(Vec::new())
    }

    async fn service_ids(&self) -> Result<Vec<String>, DbError> {
        self.check()?;
        let mut ids: Vec<String> = self
            .samples
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.service_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn prune(&self, _now: DateTime<Utc>) -> Result<usize, DbError> {
        self.check()?;
        Ok(0)
    }
}

/// Prober returning a fixed outcome, optionally parked until released.
pub struct StubProber {
    outcome: ProbeOutcome,
    gate: Option<Semaphore>,
    pub calls: AtomicUsize,
}

impl StubProber {
    pub fn new(status: HealthStatus, latency_ms: u64) -> Self {
        Self {
            outcome: ProbeOutcome { status, latency_ms },
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every probe waits for a permit from `release`.
    pub fn gated(status: HealthStatus, latency_ms: u64) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(status, latency_ms)
        }
    }

    pub fn release(&self, probes: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(probes);
        }
    }
}

#[async_trait]
impl Prober for StubProber {
    async fn probe(&self, _url: &str) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.outcome
    }
}

/// Poll `cond` until it holds or two seconds pass.
pub async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
