//! Load generator for DNS servers.
//!
//! This crate provides tools to:
//! - Read a query list and replay it for a number of passes
//! - Drive a pool of concurrent clients against one server over UDP or TCP
//! - Pace the pool toward an aggregate queries-per-second ceiling
//! - Merge per-client statistics into one latency and response-code summary
//! - Output results in multiple formats (console, JSON, CSV)

pub mod client;
pub mod config;
pub mod error;
pub mod feed;
pub mod interrupt;
pub mod metrics;
pub mod rate_limiter;
pub mod report;
pub mod runner;
pub mod worker;

pub use client::{DnsClient, ExchangeError, Exchanger, QueryOutcome};
pub use config::{LoadConfig, Transport};
pub use error::{LoadError, LoadResult};
pub use feed::{QueryJob, RequestFeed, FEED_BUFFER};
pub use interrupt::InterruptFlag;
pub use metrics::{RcodeCount, Statistics, Summary};
pub use rate_limiter::RateLimiter;
pub use report::ResultsReport;
pub use runner::{LoadRunner, SessionReport};
pub use worker::{Worker, WorkerExit, WorkerResult};
