//! Pull state machine of a single worker slot.
//!
//! ```text
//! Unregistered -> Registered -> Requesting <-> Backoff
//!                                   |
//!                                   v
//!                              Terminated
//! ```
//!
//! Registration failure is fatal. A transient failure while fetching or
//! reporting only costs the current attempt: the master reclaims the file
//! once it times out, so the slot just backs off and asks again.

use super::client::MasterClient;
use super::types::{FetchOutcome, WorkerError, WorkerState, WorkerSummary};
use crate::config::Config;

use std::time::Duration;

pub struct WorkerClient {
    client: MasterClient,
    chunk_size: usize,
    retry_backoff: Duration,
    /// Zero disables the limit.
    max_transient_failures: u32,
    state: WorkerState,
    consecutive_failures: u32,
    summary: WorkerSummary,
}

impl WorkerClient {
    pub fn new(name: impl Into<String>, config: &Config) -> Result<Self, WorkerError> {
        let name = name.into();
        let client = MasterClient::new(config.master_url(), name.clone())?;

        Ok(Self {
            client,
            chunk_size: config.chunk_size,
            retry_backoff: config.retry_backoff,
            max_transient_failures: config.max_transient_failures,
            state: WorkerState::Unregistered,
            consecutive_failures: 0,
            summary: WorkerSummary {
                name,
                ..WorkerSummary::default()
            },
        })
    }

    pub fn name(&self) -> &str {
        self.client.worker_name()
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Drives the state machine until the master reports there is no more work.
    pub async fn run(mut self) -> Result<WorkerSummary, WorkerError> {
        tracing::info!("Worker {} started", self.name());

        while self.state != WorkerState::Terminated {
            self.step().await?;
        }

        tracing::info!(
            "Worker {} done: {} files, {} bytes digested",
            self.name(),
            self.summary.files,
            self.summary.bytes
        );
        Ok(self.summary)
    }

    /// Performs one transition and returns the new state.
    pub async fn step(&mut self) -> Result<WorkerState, WorkerError> {
        let next = match self.state {
            WorkerState::Unregistered => {
                self.client.register().await?;
                tracing::info!("Worker {} registered", self.name());
                WorkerState::Registered
            }
            WorkerState::Registered => WorkerState::Requesting,
            WorkerState::Requesting => self.request().await?,
            WorkerState::Backoff => {
                tokio::time::sleep(self.retry_backoff).await;
                WorkerState::Requesting
            }
            WorkerState::Terminated => WorkerState::Terminated,
        };

        self.state = next;
        Ok(next)
    }

    async fn request(&mut self) -> Result<WorkerState, WorkerError> {
        match self.client.fetch(self.chunk_size).await {
            Ok(FetchOutcome::Digested { path, digest, bytes }) => {
                match self.client.report(&path, &digest).await {
                    Ok(()) => {
                        tracing::debug!("Worker {} digested {} ({} bytes)", self.name(), path, bytes);
                        self.consecutive_failures = 0;
                        self.summary.files += 1;
                        self.summary.bytes += bytes;
                        Ok(WorkerState::Requesting)
                    }
                    Err(e) => self.attempt_failed(e),
                }
            }
            Ok(FetchOutcome::RetryLater) => {
                self.consecutive_failures = 0;
                tracing::trace!("Worker {} told to retry later", self.name());
                Ok(WorkerState::Backoff)
            }
            Ok(FetchOutcome::Done) => Ok(WorkerState::Terminated),
            Err(e) => self.attempt_failed(e),
        }
    }

    fn attempt_failed(&mut self, error: WorkerError) -> Result<WorkerState, WorkerError> {
        if !error.is_transient() {
            return Err(error);
        }

        self.consecutive_failures += 1;
        if self.max_transient_failures > 0 && self.consecutive_failures > self.max_transient_failures {
            return Err(WorkerError::MasterUnreachable(self.consecutive_failures));
        }

        tracing::warn!(
            "Worker {} attempt failed ({} in a row): {}",
            self.name(),
            self.consecutive_failures,
            error
        );
        Ok(WorkerState::Backoff)
    }
}
