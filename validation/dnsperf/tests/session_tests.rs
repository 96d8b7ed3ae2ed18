//! End-to-end load sessions against mock and in-process servers.

use async_trait::async_trait;
use dns_protocol::{Question, ResponseCode};
use dnsperf::{
    DnsClient, ExchangeError, Exchanger, LoadConfig, LoadError, LoadRunner, QueryJob,
    QueryOutcome, RequestFeed, Transport,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

// ============================================================================
// Helpers
// ============================================================================

/// Answers every query after a fixed delay.
struct FixedLatency(Duration);

#[async_trait]
impl Exchanger for FixedLatency {
    async fn exchange(&self, job: &QueryJob) -> Result<QueryOutcome, ExchangeError> {
        tokio::time::sleep(self.0).await;
        Ok(QueryOutcome {
            rcode: ResponseCode::NO_ERROR,
            request_size: job.wire.len(),
            response_size: 100,
            latency: self.0,
        })
    }
}

/// Panics on its first exchange, answers after 1ms afterwards.
#[derive(Default)]
struct CrashOnce {
    crashed: AtomicBool,
    calls: AtomicUsize,
}

#[async_trait]
impl Exchanger for CrashOnce {
    async fn exchange(&self, job: &QueryJob) -> Result<QueryOutcome, ExchangeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("exchanger crashed");
        }
        FixedLatency(Duration::from_millis(1)).exchange(job).await
    }
}

fn jobs(names: &[&str]) -> Vec<QueryJob> {
    names
        .iter()
        .map(|name| QueryJob::new(Question::new(*name, "A".parse().unwrap())).unwrap())
        .collect()
}

fn config(workers: usize) -> LoadConfig {
    LoadConfig {
        workers,
        ..Default::default()
    }
}

/// An interrupt source that never fires.
fn no_interrupts() -> mpsc::Receiver<()> {
    mpsc::channel(1).1
}

/// An interrupt source that fires after `delay`.
fn interrupt_after(delay: Duration) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        tx.send(()).await.ok();
    });
    rx
}

// ============================================================================
// Sessions with a mock exchanger
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_queries_complete() {
    let feed = RequestFeed::new(jobs(&["a.example", "b.example"]), 5).unwrap();
    let (rx, producer) = feed.spawn(4);

    let runner = LoadRunner::new(config(4), Arc::new(FixedLatency(Duration::from_millis(10))));
    let report = runner.run_until(rx, no_interrupts()).await.unwrap();

    assert_eq!(producer.await.unwrap(), 10);
    assert!(!report.no_data);
    assert!(!report.interrupted);
    assert_eq!(report.workers_reported, 4);

    let stats = &report.stats;
    assert_eq!(stats.sent, 10);
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.timed_out, 0);
    assert_eq!(stats.response_codes[ResponseCode::NO_ERROR.index()], 10);
    assert!((stats.mean_latency() - 0.010).abs() < 1e-9);
    assert_eq!(stats.min_latency(), Some(Duration::from_millis(10)));
    assert_eq!(stats.max_latency(), Some(Duration::from_millis(10)));
    assert!(stats.latency_stddev().unwrap() < 1e-6);
    assert!(stats.run_time() >= Duration::from_millis(10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_workers_run_in_parallel() {
    // 8 workers x 100ms exchanges: serial would take 800ms.
    let feed = RequestFeed::new(jobs(&["p.example"]), 8).unwrap();
    let (rx, _producer) = feed.spawn(8);

    let runner = LoadRunner::new(config(8), Arc::new(FixedLatency(Duration::from_millis(100))));
    let start = Instant::now();
    let report = runner.run_until(rx, no_interrupts()).await.unwrap();

    assert_eq!(report.stats.completed, 8);
    assert!(start.elapsed() < Duration::from_millis(400), "took {:?}", start.elapsed());
}

#[tokio::test]
async fn test_empty_feed_reports_no_data() {
    let (tx, rx) = async_channel::bounded::<QueryJob>(1);
    drop(tx);

    let runner = LoadRunner::new(config(3), Arc::new(FixedLatency(Duration::ZERO)));
    let report = runner.run_until(rx, no_interrupts()).await.unwrap();

    assert!(report.no_data);
    assert_eq!(report.workers_reported, 3);
    assert_eq!(report.stats.sent, 0);
    assert_eq!(report.stats.completion_rate(), 0.0);
    assert_eq!(report.stats.timeout_rate(), 0.0);
    assert_eq!(report.stats.mean_latency(), 0.0);
    assert_eq!(report.stats.min_latency(), None);
    assert_eq!(report.stats.latency_stddev(), None);
}

#[tokio::test]
async fn test_zero_workers_is_rejected() {
    let (_tx, rx) = async_channel::bounded::<QueryJob>(1);
    let runner = LoadRunner::new(config(0), Arc::new(FixedLatency(Duration::ZERO)));

    let err = runner.run_until(rx, no_interrupts()).await.unwrap_err();
    assert!(matches!(err, LoadError::Config(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interrupt_stops_session_early() {
    let feed = RequestFeed::new(jobs(&["slow.example"]), 1_000).unwrap();
    let (rx, producer) = feed.spawn(16);

    // Fires every 30ms; only the first one counts.
    let (tx, interrupts) = mpsc::channel(1);
    let signals = Arc::new(AtomicUsize::new(0));
    let sent_signals = Arc::clone(&signals);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(30)).await;
            if tx.send(()).await.is_err() {
                break;
            }
            sent_signals.fetch_add(1, Ordering::SeqCst);
        }
    });

    let runner = LoadRunner::new(config(2), Arc::new(FixedLatency(Duration::from_millis(50))));
    let start = Instant::now();
    let report = runner.run_until(rx, interrupts).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(report.interrupted);
    assert!(signals.load(Ordering::SeqCst) >= 1);
    assert_eq!(report.workers_reported, 2);

    let stats = &report.stats;
    assert!(stats.sent > 0);
    assert!(stats.sent < 1_000);
    assert_eq!(stats.sent, stats.completed + stats.timed_out + stats.interrupted);

    assert!(producer.await.unwrap() < 1_000);
}

#[tokio::test]
async fn test_interrupt_sent_before_start_is_not_lost() {
    let feed = RequestFeed::new(jobs(&["early.example"]), 1_000).unwrap();
    let (rx, _producer) = feed.spawn(16);

    let (tx, interrupts) = mpsc::channel(1);
    tx.send(()).await.unwrap();

    let runner = LoadRunner::new(config(2), Arc::new(FixedLatency(Duration::from_millis(20))));
    let start = Instant::now();
    let report = runner.run_until(rx, interrupts).await.unwrap();

    assert!(start.elapsed() < Duration::from_millis(500));
    assert!(report.interrupted);
    assert!(report.stats.sent < 1_000);
}

#[tokio::test]
async fn test_runner_sessions_are_independent() {
    let runner = LoadRunner::new(config(2), Arc::new(FixedLatency(Duration::from_millis(5))));

    let feed = RequestFeed::new(jobs(&["first.example"]), 10_000).unwrap();
    let (rx, _producer) = feed.spawn(16);
    let first = runner
        .run_until(rx, interrupt_after(Duration::from_millis(50)))
        .await
        .unwrap();
    assert!(first.interrupted);
    assert!(first.stats.sent < 10_000);

    // The stop from the first session must not leak into the second.
    let feed = RequestFeed::new(jobs(&["second.example"]), 10).unwrap();
    let (rx, _producer) = feed.spawn(16);
    let second = runner.run_until(rx, no_interrupts()).await.unwrap();

    assert!(!second.interrupted);
    assert!(!second.no_data);
    assert_eq!(second.stats.sent, 10);
    assert_eq!(second.stats.completed, 10);
}

#[tokio::test]
async fn test_time_limit_ends_session() {
    let feed = RequestFeed::new(jobs(&["t.example"]), 1_000_000).unwrap();
    let (rx, _producer) = feed.spawn(64);

    let mut cfg = config(2);
    cfg.duration_secs = Some(1);
    let runner = LoadRunner::new(cfg, Arc::new(FixedLatency(Duration::from_millis(10))));

    let start = Instant::now();
    let report = runner.run_until(rx, no_interrupts()).await.unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_secs(1));
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    assert!(!report.interrupted);
    assert!(report.stats.sent > 0);
    assert_eq!(report.stats.sent, report.stats.completed);
}

#[tokio::test]
async fn test_rate_limit_caps_aggregate_qps() {
    let feed = RequestFeed::new(jobs(&["r.example"]), 100).unwrap();
    let (rx, _producer) = feed.spawn(16);

    let mut cfg = config(4);
    cfg.max_qps = Some(200.0);
    let runner = LoadRunner::new(cfg, Arc::new(FixedLatency(Duration::ZERO)));

    let start = Instant::now();
    let report = runner.run_until(rx, no_interrupts()).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.stats.completed, 100);
    // 96 paced sends at 200 qps cannot finish before 480ms.
    assert!(elapsed >= Duration::from_millis(400), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "too slow: {elapsed:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_crashed_worker_stops_session() {
    let feed = RequestFeed::new(jobs(&["boom.example"]), 100_000).unwrap();
    let (rx, _producer) = feed.spawn(64);

    let exchanger = Arc::new(CrashOnce::default());
    let runner = LoadRunner::new(config(3), Arc::clone(&exchanger) as Arc<dyn Exchanger>);

    let start = Instant::now();
    let err = runner.run_until(rx, no_interrupts()).await.unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(2), "took {:?}", start.elapsed());
    assert!(exchanger.calls.load(Ordering::SeqCst) < 100_000);

    match err {
        LoadError::WorkerLost {
            received,
            expected,
            partial,
        } => {
            assert_eq!(received, 2);
            assert_eq!(expected, 3);
            assert!(partial.sent < 100_000);
            assert_eq!(partial.sent, partial.completed + partial.timed_out + partial.interrupted);
        }
        other => panic!("expected lost worker, got {other:?}"),
    }
}

// ============================================================================
// Sessions against an in-process UDP server
// ============================================================================

async fn udp_server() -> std::net::SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        loop {
            let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
            let mut response = buf[..len].to_vec();
            response[2] |= 0x80;
            // NXDOMAIN for anything under "missing."
            let rcode = if response[12..].starts_with(b"\x07missing") { 3 } else { 0 };
            response[3] = (response[3] & 0xF0) | rcode;
            socket.send_to(&response, peer).await.unwrap();
        }
    });

    addr
}

#[tokio::test]
async fn test_udp_session_end_to_end() {
    let server = udp_server().await;
    let input = "\
example.com A
missing.example.com AAAA
; comment
example.net MX 192.0.2.0/24
";
    let feed = RequestFeed::new(dnsperf::feed::parse_queries(input), 2).unwrap();
    assert_eq!(feed.total(), 6);
    let (rx, _producer) = feed.spawn(8);

    let client = DnsClient::new(server, Transport::Udp, Duration::from_secs(2));
    let runner = LoadRunner::new(config(2), Arc::new(client));
    let report = runner.run_until(rx, no_interrupts()).await.unwrap();

    let stats = &report.stats;
    assert_eq!(stats.sent, 6);
    assert_eq!(stats.completed, 6);
    assert_eq!(stats.response_codes[ResponseCode::NO_ERROR.index()], 4);
    assert_eq!(stats.response_codes[ResponseCode::NX_DOMAIN.index()], 2);
    assert!(stats.avg_request_size() > 0.0);
    assert_eq!(stats.avg_request_size(), stats.avg_response_size());

    let summary = stats.summary(server.to_string(), "udp", 2);
    assert_eq!(summary.response_code("NXDOMAIN"), 2);
    assert_eq!(summary.response_codes[0].name, "NOERROR");
}
