//! HTTP probe implementation.

use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{ProbeError, ProbeOutcome, Prober};
use crate::db::HealthStatus;

/// Default request timeout for a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Probes a URL with one GET request.
///
/// Online iff a response arrives before the timeout with a status in
/// `[200, 400)`. Redirects are followed up to reqwest's default limit; a
/// redirect loop ends as a network error.
#[derive(Clone)]
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .user_agent(concat!("homewatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::Config(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Send the request and return the status code if it counts as healthy.
    async fn check(&self, url: &str) -> Result<u16, ProbeError> {
        let response = self
            .client
            .get(normalize_url(url))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(self.timeout)
                } else {
                    ProbeError::Network(e.to_string())
                }
            })?;

        let code = response.status().as_u16();
        if (200..400).contains(&code) {
            Ok(code)
        } else {
            Err(ProbeError::Status(code))
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();
        let result = self.check(url).await;
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let status = match result {
            Ok(_) => HealthStatus::Online,
            Err(e) => {
                tracing::debug!("Probe of {} failed after {}ms: {}", url, latency_ms, e);
                HealthStatus::Offline
            }
        };

        ProbeOutcome { status, latency_ms }
    }
}

/// Add an `http://` scheme to bare `host[:port]/path` addresses.
pub fn normalize_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
