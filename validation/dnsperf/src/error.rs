//! Error types for load sessions.

use crate::metrics::Statistics;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using LoadError.
pub type LoadResult<T> = Result<T, LoadError>;

/// Fatal conditions surfaced to the caller of a load session.
///
/// Per-query failures never appear here; they are counted in the
/// statistics instead.
#[derive(Debug, Error)]
pub enum LoadError {
    // === Configuration Errors ===
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to parse scenario file: {0}")]
    Scenario(#[from] serde_yaml::Error),

    #[error("cannot resolve server address {0:?}")]
    Address(String),

    // === Input Errors ===
    #[error("failed to read {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid format: at least one valid input line is required")]
    EmptyInput,

    // === Session Errors ===
    /// A worker task died. `partial` holds what the surviving workers
    /// reported before the session stopped.
    #[error("worker results lost: {received} of {expected} workers reported")]
    WorkerLost {
        received: usize,
        expected: usize,
        partial: Box<Statistics>,
    },
}
