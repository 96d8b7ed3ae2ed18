//! Worker loop: take a job, pace, exchange, record.
//!
//! ```text
//! RUNNING ─┬─> SEND ⇄ THROTTLE ─┬─> DRAINED  (feed closed and empty)
//!          │                    └─> STOPPED  (interrupt or deadline)
//! ```
//!
//! The exchange is the only long wait. Stop conditions are polled between
//! jobs, during throttling and while waiting on an empty feed, so a worker
//! notices an interrupt within one poll interval or one query timeout.

use crate::client::Exchanger;
use crate::feed::QueryJob;
use crate::interrupt::InterruptFlag;
use crate::metrics::Statistics;
use crate::rate_limiter::RateLimiter;
use async_channel::Receiver;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Longest single throttle sleep before stop conditions are re-checked.
pub const MAX_THROTTLE_SLEEP: Duration = Duration::from_millis(100);

/// How long to wait on an empty feed before re-checking stop conditions.
pub const FEED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The feed closed and every job was consumed
    Drained,
    /// The interrupt flag was raised
    Interrupted,
    /// The session time limit passed
    DeadlineReached,
}

/// What a worker hands to the runner when it finishes.
#[derive(Debug)]
pub struct WorkerResult {
    pub worker_id: usize,
    pub exit: WorkerExit,
    pub stats: Statistics,
}

/// One load-generating client.
pub struct Worker {
    id: usize,
    jobs: Receiver<QueryJob>,
    exchanger: Arc<dyn Exchanger>,
    limiter: RateLimiter,
    interrupt: InterruptFlag,
    deadline: Option<Instant>,
    progress: Option<ProgressBar>,
}

impl Worker {
    pub fn new(
        id: usize,
        jobs: Receiver<QueryJob>,
        exchanger: Arc<dyn Exchanger>,
        limiter: RateLimiter,
        interrupt: InterruptFlag,
    ) -> Self {
        Self {
            id,
            jobs,
            exchanger,
            limiter,
            interrupt,
            deadline: None,
            progress: None,
        }
    }

    /// Stop once this instant has passed.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Advance this bar once per exchange.
    pub fn with_progress(mut self, progress: Option<ProgressBar>) -> Self {
        self.progress = progress;
        self
    }

    fn stop_reason(&self) -> Option<WorkerExit> {
        if self.interrupt.is_raised() {
            return Some(WorkerExit::Interrupted);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(WorkerExit::DeadlineReached),
            _ => None,
        }
    }

    /// Run until the feed drains or a stop condition fires.
    pub async fn run(mut self) -> WorkerResult {
        let mut stats = Statistics::started_now();
        // A job taken from the feed while the limiter said wait.
        let mut pending: Option<QueryJob> = None;

        debug!(
            worker_id = self.id,
            per_worker_qps = ?self.limiter.per_worker_qps(),
            "Worker started"
        );

        let exit = loop {
            if let Some(reason) = self.stop_reason() {
                if pending.take().is_some() {
                    stats.record_interrupted();
                }
                break reason;
            }

            let job = match pending.take() {
                Some(job) => job,
                None => match tokio::time::timeout(FEED_POLL_INTERVAL, self.jobs.recv()).await {
                    Ok(Ok(job)) => job,
                    Ok(Err(_)) => break WorkerExit::Drained,
                    Err(_) => continue,
                },
            };

            if let Some(wait) = self.limiter.delay() {
                pending = Some(job);
                tokio::time::sleep(wait.min(MAX_THROTTLE_SLEEP)).await;
                continue;
            }

            self.limiter.record_send();
            match self.exchanger.exchange(&job).await {
                Ok(outcome) => stats.update(&outcome),
                Err(e) => {
                    debug!(worker_id = self.id, query = %job.question, error = %e, "Query failed");
                    stats.record_failure();
                }
            }

            if let Some(pb) = &self.progress {
                pb.inc(1);
            }
        };

        stats.stop();

        debug!(
            worker_id = self.id,
            exit = ?exit,
            sent = stats.sent,
            completed = stats.completed,
            timed_out = stats.timed_out,
            interrupted = stats.interrupted,
            "Worker finished"
        );

        WorkerResult {
            worker_id: self.id,
            exit,
            stats,
        }
    }
}
