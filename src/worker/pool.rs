use super::runner::WorkerClient;
use super::types::WorkerSummary;
use crate::config::Config;

use tokio::task::JoinSet;

/// Runs one `WorkerClient` per concurrency slot against the same master.
///
/// Slots never talk to each other; each registers as `<name>-<slot>` and
/// pulls work on its own task.
pub struct WorkerPool {
    name: String,
    slots: usize,
    config: Config,
}

/// Outcome of a pool run: summaries of the slots that drained cleanly and
/// the errors of those that did not.
#[derive(Debug, Default)]
pub struct PoolReport {
    pub summaries: Vec<WorkerSummary>,
    pub failures: Vec<String>,
}

impl PoolReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_files(&self) -> u64 {
        self.summaries.iter().map(|summary| summary.files).sum()
    }
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, slots: usize, config: Config) -> Self {
        Self {
            name: name.into(),
            slots: slots.max(1),
            config,
        }
    }

    pub fn slot_name(&self, slot: usize) -> String {
        format!("{}-{}", self.name, slot)
    }

    pub async fn run(self) -> PoolReport {
        tracing::info!(
            "Starting {} worker slots against {}",
            self.slots,
            self.config.master_url()
        );

        let mut report = PoolReport::default();
        let mut slots = JoinSet::new();

        for slot in 0..self.slots {
            let name = self.slot_name(slot);
            match WorkerClient::new(name.clone(), &self.config) {
                Ok(client) => {
                    slots.spawn(client.run());
                }
                Err(e) => {
                    tracing::error!("Failed to build worker {}: {}", name, e);
                    report.failures.push(format!("{}: {}", name, e));
                }
            }
        }

        while let Some(joined) = slots.join_next().await {
            match joined {
                Ok(Ok(summary)) => report.summaries.push(summary),
                Ok(Err(e)) => {
                    tracing::error!("Worker slot failed: {}", e);
                    report.failures.push(e.to_string());
                }
                Err(e) => {
                    tracing::error!("Worker slot panicked: {}", e);
                    report.failures.push(e.to_string());
                }
            }
        }

        report.summaries.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }
}
