//! Scheduler module for enqueueing health checks and running the worker pool.

mod queue;
mod retention;
mod worker;

pub use queue::*;
pub use retention::*;
pub use worker::*;

use crate::config::EngineConfig;
use crate::db::{DbError, ServiceRegistry, TimeSeriesSink};
use crate::probe::Prober;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Counts from a single scheduling tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub targets: usize,
    pub enqueued: usize,
    pub dropped: usize,
}

/// Lists monitored services on a fixed cadence and enqueues one job per service.
pub struct Scheduler {
    registry: Arc<dyn ServiceRegistry>,
    queue: JobSender,
    interval: Duration,
}

impl Scheduler {
    pub fn new(registry: Arc<dyn ServiceRegistry>, queue: JobSender, interval: Duration) -> Self {
        Self {
            registry,
            queue,
            interval,
        }
    }

    /// Run one scheduling pass.
    ///
    /// A registry error skips the whole tick. Every job shares one enqueue
    /// deadline, so a tick waits on a full queue for at most the enqueue
    /// timeout in total. Jobs that miss it are dropped with a warning.
    pub async fn tick(&self) -> Result<TickReport, DbError> {
        let targets = self.registry.list_monitored_services().await?;
        let mut report = TickReport {
            targets: targets.len(),
            ..Default::default()
        };

        let deadline = self.queue.deadline();
        for (i, target) in targets.into_iter().enumerate() {
            let id = target.id.clone();
            match self.queue.enqueue(target.into(), deadline).await {
                EnqueueOutcome::Queued => report.enqueued += 1,
                EnqueueOutcome::Dropped => {
                    report.dropped += 1;
                    tracing::warn!(
                        "Job queue full for {:?}; dropping health check for {}",
                        self.queue.enqueue_timeout(),
                        id
                    );
                }
                EnqueueOutcome::Closed => {
                    report.dropped += report.targets - i;
                    tracing::warn!("Job queue closed; skipping remaining health checks");
                    break;
                }
            }
        }

        Ok(report)
    }

    /// Tick immediately, then every interval, until `stop` is cancelled.
    ///
    /// Ticks keep a fixed cadence regardless of how long jobs take. Dropping
    /// the scheduler on exit closes the queue for the workers.
    pub async fn run(self, stop: CancellationToken) {
        tracing::info!("Starting health scheduler with interval {:?}", self.interval);

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = interval.tick() => {}
            }

            tokio::select! {
                _ = stop.cancelled() => break,
                result = self.tick() => match result {
                    Ok(report) if report.dropped > 0 => tracing::warn!(
                        "Scheduled {} of {} health checks ({} dropped)",
                        report.enqueued,
                        report.targets,
                        report.dropped
                    ),
                    Ok(report) => tracing::debug!("Scheduled {} health checks", report.enqueued),
                    Err(e) => tracing::error!("Health check: failed to get services: {}", e),
                },
            }
        }

        tracing::info!("Health scheduler stopped");
    }
}

/// The running health engine: scheduler, worker pool and retention sweeps.
pub struct HealthMonitor {
    stop: CancellationToken,
    scheduler: JoinHandle<()>,
    retention: JoinHandle<()>,
    pool: WorkerPool,
}

impl HealthMonitor {
    /// Start every background task.
    pub fn start(
        config: &EngineConfig,
        registry: Arc<dyn ServiceRegistry>,
        sink: Arc<dyn TimeSeriesSink>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let stop = CancellationToken::new();
        let (tx, rx) = job_queue(config.queue_capacity, config.enqueue_timeout);

        let pool = WorkerPool::spawn(
            config.worker_count,
            rx,
            WorkerContext {
                prober,
                registry: registry.clone(),
                sink: sink.clone(),
            },
        );
        tracing::info!(
            "Started {} health workers (queue capacity {})",
            pool.size(),
            config.queue_capacity
        );

        let scheduler = Scheduler::new(registry, tx, config.check_interval);
        let scheduler = tokio::spawn(scheduler.run(stop.clone()));

        let retention = RetentionManager::new(sink, config.retention_interval).start(stop.clone());

        Self {
            stop,
            scheduler,
            retention,
            pool,
        }
    }

    /// Stop scheduling, let queued and in-flight checks finish, then return.
    pub async fn shutdown(self) {
        self.stop.cancel();

        if let Err(e) = self.scheduler.await {
            tracing::error!("Scheduler task failed: {}", e);
        }
        self.pool.join().await;
        if let Err(e) = self.retention.await {
            tracing::error!("Retention task failed: {}", e);
        }

        tracing::info!("Health monitor stopped");
    }
}
