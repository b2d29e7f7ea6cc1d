//! Probe module for service health checks.

mod http;

pub use http::*;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use crate::db::HealthStatus;

/// Reasons a probe did not come back online.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("unhealthy status code {0}")]
    Status(u16),
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Classified result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub status: HealthStatus,
    /// Elapsed time from request start to classification
    pub latency_ms: u64,
}

/// A single reachability check against one URL.
///
/// Implementations never fail: every error is folded into an offline outcome.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}
