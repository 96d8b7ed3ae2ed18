//! Configuration loading and management.

use crate::error::{LoadError, LoadResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Transport used for each query exchange.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Udp => f.write_str("udp"),
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}

/// Load session configuration, loaded from a YAML scenario or built from
/// command-line flags. Read-only once the session starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    /// Query input file, one `name type [subnet]` per line
    #[serde(default)]
    pub datafile: PathBuf,
    /// Number of concurrent clients
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Run through the input at most this many times
    #[serde(default = "default_passes")]
    pub passes: u64,
    /// Per-query timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Aggregate queries-per-second ceiling; absent or <= 0 means unlimited
    #[serde(default)]
    pub max_qps: Option<f64>,
    /// Wall-clock cap for the whole run; absent means run until the input
    /// is exhausted
    #[serde(default)]
    pub duration_secs: Option<u64>,
}

fn default_server() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    53
}

fn default_workers() -> usize {
    1
}

fn default_passes() -> u64 {
    1
}

fn default_timeout_secs() -> u64 {
    5
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            transport: Transport::default(),
            datafile: PathBuf::new(),
            workers: default_workers(),
            passes: default_passes(),
            timeout_secs: default_timeout_secs(),
            max_qps: None,
            duration_secs: None,
        }
    }
}

impl LoadConfig {
    /// Load configuration from a YAML scenario file.
    pub fn from_file(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Input {
            path: path.to_path_buf(),
            source,
        })?;
        let config: LoadConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> LoadResult<()> {
        if self.workers == 0 {
            return Err(LoadError::Config("workers must be > 0".to_string()));
        }
        if self.passes == 0 {
            return Err(LoadError::Config("passes must be > 0".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(LoadError::Config("timeout_secs must be > 0".to_string()));
        }
        if self.duration_secs == Some(0) {
            return Err(LoadError::Config(
                "duration_secs must be > 0 when set".to_string(),
            ));
        }
        if let Some(qps) = self.max_qps {
            if !qps.is_finite() {
                return Err(LoadError::Config(format!("max_qps must be finite, got {qps}")));
            }
        }
        if self.server.is_empty() {
            return Err(LoadError::Config("server must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.duration_secs.map(Duration::from_secs)
    }

    /// Effective aggregate rate limit, `None` when pacing is disabled.
    pub fn rate_limit(&self) -> Option<f64> {
        self.max_qps.filter(|qps| *qps > 0.0)
    }

    /// `host:port`, bracketing bare IPv6 literals.
    pub fn endpoint(&self) -> String {
        match self.server.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) => format!("[{}]:{}", v6, self.port),
            _ => format!("{}:{}", self.server, self.port),
        }
    }

    /// Resolve the target server to a socket address.
    pub async fn resolve_server(&self) -> LoadResult<SocketAddr> {
        let endpoint = self.endpoint();
        let mut addrs = tokio::net::lookup_host(endpoint.clone())
            .await
            .map_err(|_| LoadError::Address(endpoint.clone()))?;
        addrs.next().ok_or(LoadError::Address(endpoint))
    }
}
