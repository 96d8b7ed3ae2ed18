//! Statistics accumulation and derived metrics.
//!
//! Each worker owns one [`Statistics`] and folds outcomes into it; the
//! runner merges the per-worker values into a global one. Nothing here
//! stores individual samples: latency variance comes from running sums
//! and percentiles from a fixed-precision histogram.

use crate::client::QueryOutcome;
use dns_protocol::{ResponseCode, RCODE_COUNT};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Significant figures kept by the latency histogram.
const HISTOGRAM_SIGFIG: u8 = 3;

/// Aggregate statistics over a set of query outcomes.
///
/// `sent == completed + timed_out + interrupted` holds between updates.
#[derive(Debug, Clone)]
pub struct Statistics {
    pub sent: u64,
    pub completed: u64,
    pub timed_out: u64,
    /// Jobs taken from the feed but abandoned because the run stopped
    pub interrupted: u64,
    pub request_bytes: u64,
    pub response_bytes: u64,
    pub latency_sum: Duration,
    /// Sum of squared latencies, in seconds²
    pub latency_sq_sum: f64,
    /// `Duration::MAX` until the first completion
    pub latency_min: Duration,
    pub latency_max: Duration,
    pub response_codes: [u64; RCODE_COUNT],
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    /// Latency in microseconds
    histogram: Histogram<u64>,
}

impl Statistics {
    /// Create empty statistics with no start time.
    pub fn new() -> Self {
        Self {
            sent: 0,
            completed: 0,
            timed_out: 0,
            interrupted: 0,
            request_bytes: 0,
            response_bytes: 0,
            latency_sum: Duration::ZERO,
            latency_sq_sum: 0.0,
            latency_min: Duration::MAX,
            latency_max: Duration::ZERO,
            response_codes: [0; RCODE_COUNT],
            started_at: None,
            ended_at: None,
            histogram: Histogram::new(HISTOGRAM_SIGFIG)
                .expect("Failed to create latency histogram"),
        }
    }

    /// Create empty statistics starting now.
    pub fn started_now() -> Self {
        let mut stats = Self::new();
        stats.start();
        stats
    }

    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Fold one completed exchange.
    pub fn update(&mut self, outcome: &QueryOutcome) {
        let secs = outcome.latency.as_secs_f64();

        self.sent += 1;
        self.completed += 1;
        self.request_bytes += outcome.request_size as u64;
        self.response_bytes += outcome.response_size as u64;
        self.latency_sum += outcome.latency;
        self.latency_sq_sum += secs * secs;
        self.latency_min = self.latency_min.min(outcome.latency);
        self.latency_max = self.latency_max.max(outcome.latency);
        self.response_codes[outcome.rcode.index()] += 1;
        self.histogram
            .record(outcome.latency.as_micros() as u64)
            .ok();
    }

    /// Count an exchange that timed out or failed. No size, latency or
    /// code is recorded for it.
    pub fn record_failure(&mut self) {
        self.sent += 1;
        self.timed_out += 1;
    }

    /// Count a job abandoned before it was sent.
    pub fn record_interrupted(&mut self) {
        self.sent += 1;
        self.interrupted += 1;
    }

    /// Combine another accumulator into this one.
    ///
    /// Associative and commutative, so the order in which workers finish
    /// does not affect the total.
    pub fn merge(&mut self, other: &Statistics) {
        self.sent += other.sent;
        self.completed += other.completed;
        self.timed_out += other.timed_out;
        self.interrupted += other.interrupted;
        self.request_bytes += other.request_bytes;
        self.response_bytes += other.response_bytes;
        self.latency_sum += other.latency_sum;
        self.latency_sq_sum += other.latency_sq_sum;
        self.latency_min = self.latency_min.min(other.latency_min);
        self.latency_max = self.latency_max.max(other.latency_max);

        for (total, count) in self.response_codes.iter_mut().zip(other.response_codes) {
            *total += count;
        }

        self.started_at = earliest(self.started_at, other.started_at);
        self.ended_at = latest(self.ended_at, other.ended_at);

        if let Err(e) = self.histogram.add(&other.histogram) {
            tracing::warn!(error = ?e, "Failed to merge latency histogram");
        }
    }

    // ===== Derived metrics =====

    pub fn completion_rate(&self) -> f64 {
        safe_div(self.completed as f64, self.sent as f64)
    }

    pub fn timeout_rate(&self) -> f64 {
        safe_div(self.timed_out as f64, self.sent as f64)
    }

    pub fn interrupted_rate(&self) -> f64 {
        safe_div(self.interrupted as f64, self.sent as f64)
    }

    /// Time between start and end, zero if either is missing.
    pub fn run_time(&self) -> Duration {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub fn queries_per_second(&self) -> f64 {
        safe_div(self.completed as f64, self.run_time().as_secs_f64())
    }

    /// Mean latency in seconds.
    pub fn mean_latency(&self) -> f64 {
        safe_div(self.latency_sum.as_secs_f64(), self.completed as f64)
    }

    /// Minimum latency, `None` before any completion.
    pub fn min_latency(&self) -> Option<Duration> {
        (self.completed > 0).then_some(self.latency_min)
    }

    pub fn max_latency(&self) -> Option<Duration> {
        (self.completed > 0).then_some(self.latency_max)
    }

    /// Sample standard deviation of latency in seconds, from running sums.
    /// `None` for fewer than two completions.
    pub fn latency_stddev(&self) -> Option<f64> {
        if self.completed < 2 {
            return None;
        }
        let n = self.completed as f64;
        let sum = self.latency_sum.as_secs_f64();
        let variance = (self.latency_sq_sum - sum * sum / n) / (n - 1.0);
        // Cancellation can leave a tiny negative residue for equal samples.
        Some(variance.max(0.0).sqrt())
    }

    /// Latency at the given percentile (0-100), `None` before any
    /// completion.
    pub fn latency_percentile(&self, percentile: f64) -> Option<Duration> {
        (self.completed > 0)
            .then(|| Duration::from_micros(self.histogram.value_at_percentile(percentile)))
    }

    pub fn avg_request_size(&self) -> f64 {
        safe_div(self.request_bytes as f64, self.completed as f64)
    }

    pub fn avg_response_size(&self) -> f64 {
        safe_div(self.response_bytes as f64, self.completed as f64)
    }

    /// Non-zero response codes with their counts.
    pub fn response_code_counts(&self) -> impl Iterator<Item = (ResponseCode, u64)> + '_ {
        self.response_codes
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .filter_map(|(idx, count)| ResponseCode::from_index(idx).map(|code| (code, *count)))
    }

    /// Snapshot the derived metrics for reporting.
    pub fn summary(
        &self,
        server: impl Into<String>,
        transport: impl Into<String>,
        workers: usize,
    ) -> Summary {
        let secs = |d: Option<Duration>| d.map(|d| d.as_secs_f64()).unwrap_or(0.0);

        Summary {
            timestamp: chrono::Utc::now().to_rfc3339(),
            server: server.into(),
            transport: transport.into(),
            workers,
            run_time_secs: self.run_time().as_secs_f64(),
            queries_sent: self.sent,
            queries_completed: self.completed,
            queries_lost: self.timed_out,
            queries_interrupted: self.interrupted,
            completion_pct: self.completion_rate() * 100.0,
            lost_pct: self.timeout_rate() * 100.0,
            interrupted_pct: self.interrupted_rate() * 100.0,
            queries_per_second: self.queries_per_second(),
            avg_request_size: self.avg_request_size(),
            avg_response_size: self.avg_response_size(),
            latency_avg: self.mean_latency(),
            latency_min: secs(self.min_latency()),
            latency_max: secs(self.max_latency()),
            latency_stddev: self.latency_stddev(),
            latency_p50: secs(self.latency_percentile(50.0)),
            latency_p90: secs(self.latency_percentile(90.0)),
            latency_p95: secs(self.latency_percentile(95.0)),
            latency_p99: secs(self.latency_percentile(99.0)),
            response_codes: self
                .response_code_counts()
                .map(|(code, count)| RcodeCount {
                    code: code.index() as u8,
                    name: code.name().to_string(),
                    count,
                })
                .collect(),
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Final session results. Latencies are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub timestamp: String,
    pub server: String,
    pub transport: String,
    pub workers: usize,
    pub run_time_secs: f64,

    pub queries_sent: u64,
    pub queries_completed: u64,
    pub queries_lost: u64,
    pub queries_interrupted: u64,
    pub completion_pct: f64,
    pub lost_pct: f64,
    pub interrupted_pct: f64,
    pub queries_per_second: f64,

    // Packet sizes (bytes)
    pub avg_request_size: f64,
    pub avg_response_size: f64,

    pub latency_avg: f64,
    pub latency_min: f64,
    pub latency_max: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_stddev: Option<f64>,
    pub latency_p50: f64,
    pub latency_p90: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,

    /// Non-zero codes in code order
    pub response_codes: Vec<RcodeCount>,
}

impl Summary {
    /// Count for the named response code, zero if it never occurred.
    pub fn response_code(&self, name: &str) -> u64 {
        self.response_codes
            .iter()
            .find(|rc| rc.name == name)
            .map_or(0, |rc| rc.count)
    }
}

/// Responses seen with one RCODE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RcodeCount {
    pub code: u8,
    pub name: String,
    pub count: u64,
}
