//! Load session orchestration.
//!
//! The runner spawns one [`Worker`] per configured client, all reading
//! the same job channel, then waits for exactly that many results. Each
//! result is merged into the global statistics as it arrives. An interrupt
//! raises the session's flag and closes the feed; workers finish whatever
//! exchange is in flight and report normally. A worker task that dies
//! stops the session the same way.

use crate::client::Exchanger;
use crate::config::LoadConfig;
use crate::error::{LoadError, LoadResult};
use crate::feed::QueryJob;
use crate::interrupt::InterruptFlag;
use crate::metrics::Statistics;
use crate::rate_limiter::RateLimiter;
use crate::worker::{Worker, WorkerResult};
use async_channel::Receiver;
use indicatif::ProgressBar;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// Outcome of a finished session.
#[derive(Debug)]
pub struct SessionReport {
    /// Merged statistics of every worker
    pub stats: Statistics,
    /// No query was ever sent (e.g. the feed delivered nothing)
    pub no_data: bool,
    /// The run ended early on an interrupt
    pub interrupted: bool,
    pub workers_reported: usize,
}

/// Executes a load session with a fixed worker pool.
pub struct LoadRunner {
    config: LoadConfig,
    exchanger: Arc<dyn Exchanger>,
    progress: Option<ProgressBar>,
}

impl LoadRunner {
    /// Create a new load runner.
    pub fn new(config: LoadConfig, exchanger: Arc<dyn Exchanger>) -> Self {
        Self {
            config,
            exchanger,
            progress: None,
        }
    }

    /// Report progress on this bar, one tick per exchange.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Run the session, stopping early on Ctrl-C.
    pub async fn run(&self, jobs: Receiver<QueryJob>) -> LoadResult<SessionReport> {
        let (tx, rx) = mpsc::channel(4);
        let listener = listen_for_ctrl_c(tx);
        let result = self.run_until(jobs, rx).await;
        listener.abort();
        result
    }

    /// Run the session, stopping early on the first message from
    /// `interrupts`. Later messages are ignored; a closed channel means no
    /// interrupt will come.
    ///
    /// Every call is an independent session with its own interrupt flag.
    pub async fn run_until(
        &self,
        jobs: Receiver<QueryJob>,
        mut interrupts: mpsc::Receiver<()>,
    ) -> LoadResult<SessionReport> {
        self.config.validate()?;

        let workers = self.config.workers;
        let deadline = self.config.time_limit().map(|limit| Instant::now() + limit);
        let interrupt = InterruptFlag::new();
        let mut global = Statistics::started_now();

        info!(
            workers,
            transport = %self.config.transport,
            rate_limit = ?self.config.rate_limit(),
            time_limit = ?self.config.time_limit(),
            "Starting load session"
        );

        let (results_tx, mut results_rx) = mpsc::channel::<WorkerResult>(workers);
        let mut tasks = JoinSet::new();

        for worker_id in 0..workers {
            let worker = Worker::new(
                worker_id,
                jobs.clone(),
                Arc::clone(&self.exchanger),
                RateLimiter::new(self.config.rate_limit(), workers),
                interrupt.clone(),
            )
            .with_deadline(deadline)
            .with_progress(self.progress.clone());

            let results_tx = results_tx.clone();
            tasks.spawn(async move {
                let result = worker.run().await;
                if results_tx.send(result).await.is_err() {
                    warn!(worker_id, "Runner stopped listening before worker reported");
                }
            });
        }
        drop(results_tx);

        let mut reported = 0usize;
        let mut lost = 0usize;
        while reported + lost < workers {
            tokio::select! {
                Some(result) = results_rx.recv() => {
                    debug!(
                        worker_id = result.worker_id,
                        exit = ?result.exit,
                        sent = result.stats.sent,
                        "Worker reported"
                    );
                    global.merge(&result.stats);
                    reported += 1;
                }
                Some(joined) = tasks.join_next() => {
                    // A task that finished normally has already delivered
                    // its result.
                    if let Err(e) = joined {
                        lost += 1;
                        error!(error = %e, "Worker task died, stopping session");
                        if interrupt.raise() {
                            jobs.close();
                        }
                    }
                }
                Some(()) = interrupts.recv() => {
                    if interrupt.raise() {
                        info!(remaining = workers - reported - lost, "Stopping...");
                        jobs.close();
                    } else {
                        debug!("Already stopping, waiting for workers");
                    }
                }
                else => break,
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        // The global start is the session start; workers contribute only
        // their end times.
        if global.ended_at.is_none() {
            global.stop();
        }

        if lost > 0 || reported < workers {
            return Err(LoadError::WorkerLost {
                received: reported,
                expected: workers,
                partial: Box::new(global),
            });
        }

        let no_data = global.sent == 0;
        if no_data {
            warn!("No statistics collected / no requests found");
        }

        info!(
            sent = global.sent,
            completed = global.completed,
            timed_out = global.timed_out,
            interrupted = global.interrupted,
            "Load session finished"
        );

        Ok(SessionReport {
            stats: global,
            no_data,
            interrupted: interrupt.is_raised(),
            workers_reported: reported,
        })
    }
}

/// Forward every Ctrl-C to `tx` until the receiver goes away. The signal
/// listener is registered before this returns.
#[cfg(unix)]
fn listen_for_ctrl_c(tx: mpsc::Sender<()>) -> JoinHandle<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let sigint = signal(SignalKind::interrupt());
    tokio::spawn(async move {
        let mut sigint = match sigint {
            Ok(sigint) => sigint,
            Err(e) => {
                warn!(error = %e, "Failed to listen for interrupt signal");
                return;
            }
        };
        while sigint.recv().await.is_some() {
            if tx.send(()).await.is_err() {
                break;
            }
        }
    })
}

#[cfg(not(unix))]
fn listen_for_ctrl_c(tx: mpsc::Sender<()>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for interrupt signal");
                return;
            }
            if tx.send(()).await.is_err() {
                break;
            }
        }
    })
}
