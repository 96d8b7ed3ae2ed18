//! Per-worker pacing toward a share of the aggregate QPS budget.
//!
//! Workers never coordinate: each paces itself to `R / W` queries per
//! second. Before a send it compares how long the sends so far *should*
//! have taken with how long they actually took, and waits out the
//! difference. A worker that falls behind (slow responses) bursts until
//! its count catches up rather than following a fixed interval timer.

use std::time::{Duration, Instant};

/// Count-based pacing state for one worker.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    per_worker_qps: Option<f64>,
    started: Instant,
    sent: u64,
}

impl RateLimiter {
    /// Pace one of `workers` workers sharing `max_qps`. A missing or
    /// non-positive rate disables pacing.
    pub fn new(max_qps: Option<f64>, workers: usize) -> Self {
        Self::starting_at(max_qps, workers, Instant::now())
    }

    /// Like [`RateLimiter::new`] with an explicit start time.
    pub fn starting_at(max_qps: Option<f64>, workers: usize, started: Instant) -> Self {
        let per_worker_qps = max_qps
            .filter(|qps| *qps > 0.0)
            .map(|qps| qps / workers.max(1) as f64);

        Self {
            per_worker_qps,
            started,
            sent: 0,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, 1)
    }

    pub fn is_enabled(&self) -> bool {
        self.per_worker_qps.is_some()
    }

    pub fn per_worker_qps(&self) -> Option<f64> {
        self.per_worker_qps
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn record_send(&mut self) {
        self.sent += 1;
    }

    /// How long to wait before the next send, if at all.
    pub fn delay(&self) -> Option<Duration> {
        self.delay_at(Instant::now())
    }

    pub fn delay_at(&self, now: Instant) -> Option<Duration> {
        let rate = self.per_worker_qps?;
        let expected =
            Duration::try_from_secs_f64(self.sent as f64 / rate).unwrap_or(Duration::MAX);
        let elapsed = now.saturating_duration_since(self.started);

        (expected > elapsed).then(|| expected - elapsed)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::unlimited()
    }
}
