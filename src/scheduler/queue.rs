//! Bounded job queue between the scheduler and the worker pool.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::db::MonitoredTarget;

/// Default number of jobs the queue holds before the scheduler has to wait.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One pending health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthJob {
    pub id: String,
    pub url: String,
}

impl From<MonitoredTarget> for HealthJob {
    fn from(target: MonitoredTarget) -> Self {
        Self {
            id: target.id,
            url: target.url,
        }
    }
}

/// What happened to a job handed to [`JobSender::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// The queue stayed full until the deadline passed.
    Dropped,
    /// Every receiver is gone.
    Closed,
}

/// Create a queue holding at most `capacity` jobs.
///
/// A full queue makes `enqueue` wait for space until the caller's deadline,
/// usually [`JobSender::deadline`], and then drop the job. A deadline already
/// in the past never waits.
pub fn job_queue(capacity: usize, enqueue_timeout: Duration) -> (JobSender, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        JobSender { tx, enqueue_timeout },
        JobReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer half, held by the scheduler.
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::Sender<HealthJob>,
    enqueue_timeout: Duration,
}

impl JobSender {
    /// A deadline `enqueue_timeout` from now.
    ///
    /// Share one deadline across a batch so the whole batch waits at most
    /// `enqueue_timeout`.
    pub fn deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.enqueue_timeout)
            .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365))
    }

    pub async fn enqueue(&self, job: HealthJob, deadline: Instant) -> EnqueueOutcome {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return match self.tx.try_send(job) {
                Ok(()) => EnqueueOutcome::Queued,
                Err(TrySendError::Full(_)) => EnqueueOutcome::Dropped,
                Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
            };
        }

        match self.tx.send_timeout(job, remaining).await {
            Ok(()) => EnqueueOutcome::Queued,
            Err(SendTimeoutError::Timeout(_)) => EnqueueOutcome::Dropped,
            Err(SendTimeoutError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    pub fn enqueue_timeout(&self) -> Duration {
        self.enqueue_timeout
    }

    /// Jobs currently waiting in the queue.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Consumer half, shared by every worker.
#[derive(Clone)]
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<HealthJob>>>,
}

impl JobReceiver {
    /// Wait for the next job. `None` once all senders are gone and the queue is drained.
    pub async fn next(&self) -> Option<HealthJob> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
