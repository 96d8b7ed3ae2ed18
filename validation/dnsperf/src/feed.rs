//! Query input loading and the job feed.
//!
//! The input file is parsed once into pre-encoded jobs. The feed then
//! replays that list `passes` times into a bounded channel shared by all
//! workers, and closes the channel when it is done.

use crate::error::{LoadError, LoadResult};
use async_channel::{Receiver, Sender};
use bytes::Bytes;
use dns_protocol::{ProtocolResult, Question};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the job channel between the feed and the workers.
pub const FEED_BUFFER: usize = 10_000;

/// One query to send. Clones share the question and the encoded bytes.
#[derive(Debug, Clone)]
pub struct QueryJob {
    pub question: Arc<Question>,
    /// Encoded query with a zero message ID; the client stamps a fresh ID
    /// per exchange.
    pub wire: Bytes,
}

impl QueryJob {
    pub fn new(question: Question) -> ProtocolResult<Self> {
        let wire = question.encode(0)?;
        Ok(Self {
            question: Arc::new(question),
            wire,
        })
    }
}

/// Parse input text into jobs, skipping (and logging) invalid lines.
pub fn parse_queries(content: &str) -> Vec<QueryJob> {
    let mut jobs = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let parsed = Question::parse_line(line).and_then(|q| q.map(QueryJob::new).transpose());
        match parsed {
            Ok(Some(job)) => jobs.push(job),
            Ok(None) => {}
            Err(e) => warn!(line = idx + 1, input = line, error = %e, "Skipping input line"),
        }
    }

    jobs
}

/// Read and parse a query input file.
pub fn load_queries(path: impl AsRef<Path>) -> LoadResult<Vec<QueryJob>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Input {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_queries(&content))
}

/// Replays a fixed job list a bounded number of times.
#[derive(Debug)]
pub struct RequestFeed {
    jobs: Vec<QueryJob>,
    passes: u64,
}

impl RequestFeed {
    /// Create a feed. An empty job list is a fatal configuration error.
    pub fn new(jobs: Vec<QueryJob>, passes: u64) -> LoadResult<Self> {
        if jobs.is_empty() {
            return Err(LoadError::EmptyInput);
        }
        Ok(Self { jobs, passes })
    }

    /// Load a feed from an input file.
    pub fn from_file(path: impl AsRef<Path>, passes: u64) -> LoadResult<Self> {
        Self::new(load_queries(path)?, passes)
    }

    /// Distinct queries in the input.
    pub fn queries(&self) -> usize {
        self.jobs.len()
    }

    /// Total deliveries: `passes × queries`.
    pub fn total(&self) -> u64 {
        self.passes.saturating_mul(self.jobs.len() as u64)
    }

    /// Jobs in delivery order.
    pub fn iter(&self) -> impl Iterator<Item = &QueryJob> + '_ {
        self.jobs.iter().cycle().take(self.total() as usize)
    }

    /// Start the producer task.
    ///
    /// Returns the receiving end of the job channel and a handle yielding
    /// the number of jobs delivered. The producer stops early if the
    /// channel is closed or every receiver is dropped.
    pub fn spawn(self, capacity: usize) -> (Receiver<QueryJob>, JoinHandle<u64>) {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        let handle = tokio::spawn(self.produce(tx));
        (rx, handle)
    }

    async fn produce(self, tx: Sender<QueryJob>) -> u64 {
        info!(
            queries = self.queries(),
            passes = self.passes,
            total = self.total(),
            "Feeding queries"
        );

        let mut delivered = 0u64;
        for job in self.iter() {
            if tx.send(job.clone()).await.is_err() {
                debug!(delivered, "Job channel closed, stopping feed");
                break;
            }
            delivered += 1;
        }

        debug!(delivered, "Feed finished");
        delivered
    }
}
