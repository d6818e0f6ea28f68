//! Runtime Configuration
//!
//! A single `Config` value is built once at process start (defaults plus CLI
//! overrides) and handed to every component at construction. Nothing reads
//! configuration from global state at call time.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Default bytes read per body frame / digest update.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default window added to a worker's estimated processing time before a file
/// is considered stuck.
pub const DEFAULT_PROCESSING_TIMEOUT: Duration = Duration::from_secs(4);

/// Default sleep of a worker that was told to retry later.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(4);

pub const DEFAULT_MAX_TRANSIENT_FAILURES: u32 = 10;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("retry backoff must be greater than zero")]
    ZeroRetryBackoff,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the master binds to and workers connect to.
    pub master_addr: SocketAddr,
    /// Push-variant worker addresses. The pull protocol never dials these.
    pub worker_addrs: Vec<SocketAddr>,
    pub chunk_size: usize,
    pub processing_timeout: Duration,
    pub retry_backoff: Duration,
    /// Consecutive transient failures a worker slot tolerates before giving up.
    pub max_transient_failures: u32,
    pub progress_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            worker_addrs: (8001..=8004)
                .map(|port| SocketAddr::from(([127, 0, 0, 1], port)))
                .collect(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            processing_timeout: DEFAULT_PROCESSING_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            max_transient_failures: DEFAULT_MAX_TRANSIENT_FAILURES,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.retry_backoff.is_zero() {
            return Err(ConfigError::ZeroRetryBackoff);
        }
        Ok(())
    }

    /// Base URL workers use to reach the master.
    pub fn master_url(&self) -> String {
        format!("http://{}", self.master_addr)
    }
}
