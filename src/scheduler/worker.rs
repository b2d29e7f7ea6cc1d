//! Fixed-size pool of probe workers.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::queue::{HealthJob, JobReceiver};
use crate::db::{DbError, HealthSample, ServiceRegistry, TimeSeriesSink};
use crate::probe::Prober;

/// Default number of concurrent workers.
pub const DEFAULT_WORKER_COUNT: usize = 5;

/// Everything a worker needs to handle a job.
#[derive(Clone)]
pub struct WorkerContext {
    pub prober: Arc<dyn Prober>,
    pub registry: Arc<dyn ServiceRegistry>,
    pub sink: Arc<dyn TimeSeriesSink>,
}

/// Result of handling one job. The two writes fail independently.
#[derive(Debug)]
pub struct JobOutcome {
    pub sample: HealthSample,
    pub registry: Result<(), DbError>,
    pub sink: Result<(), DbError>,
}

/// Long-lived workers draining a shared [`JobReceiver`].
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers. They run until the queue is closed and empty.
    pub fn spawn(count: usize, queue: JobReceiver, ctx: WorkerContext) -> Self {
        let handles = (0..count.max(1))
            .map(|worker_id| {
                let queue = queue.clone();
                let ctx = ctx.clone();
                tokio::spawn(run_worker(worker_id, queue, ctx))
            })
            .collect();

        Self { handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every worker to finish.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }
    }
}

async fn run_worker(worker_id: usize, queue: JobReceiver, ctx: WorkerContext) {
    tracing::debug!("Worker {} started", worker_id);

    while let Some(job) = queue.next().await {
        let outcome = process_job(&ctx, job).await;
        tracing::debug!(
            "Health check: {} {} ({}ms, registry {}, history {})",
            outcome.sample.service_id,
            outcome.sample.status,
            outcome.sample.latency_ms,
            write_label(&outcome.registry),
            write_label(&outcome.sink)
        );
    }

    tracing::debug!("Worker {} stopped: queue closed", worker_id);
}

/// Probe one service and record the result in the registry and the history.
pub async fn process_job(ctx: &WorkerContext, job: HealthJob) -> JobOutcome {
    let outcome = ctx.prober.probe(&job.url).await;
    let observed_at = Utc::now();

    let sample = HealthSample {
        service_id: job.id,
        url: job.url,
        status: outcome.status,
        latency_ms: outcome.latency_ms,
        observed_at,
    };

    let registry = ctx
        .registry
        .record_health(&sample.service_id, sample.status, observed_at)
        .await;
    if let Err(e) = &registry {
        tracing::warn!(
            "Health check: failed to update status for {} ({}): {}",
            sample.service_id,
            sample.url,
            e
        );
    }

    let sink = ctx.sink.append_sample(&sample).await;
    if let Err(e) = &sink {
        tracing::warn!(
            "Health check: failed to append sample for {} ({}): {}",
            sample.service_id,
            sample.url,
            e
        );
    }

    JobOutcome {
        sample,
        registry,
        sink,
    }
}

fn write_label(result: &Result<(), DbError>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "failed"
    }
}
