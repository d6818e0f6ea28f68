//! Dispatch Engine
//!
//! Owns the file registry, the FIFO queue of unassigned files and one
//! `WorkerRecord` per registered worker, and decides what each worker gets
//! when it asks for work.
//!
//! Every method here is synchronous. The HTTP layer holds the engine behind a
//! mutex and never awaits while holding it, so each call is one atomic step
//! with respect to other requests.
//!
//! ## Dispatch order
//! 1. Pop the head of the queue.
//! 2. Queue empty: reclaim the globally oldest timed-out file, if any.
//! 3. Otherwise retry-later while anything is in flight, done when nothing is.

use super::error::MasterError;
use super::protocol::HomeStatusResponse;
use super::types::{Assignment, Clock, Dispatch, Progress, SystemClock, TimedOutFile};
use super::worker_record::WorkerRecord;
use crate::config::Config;
use crate::home::{Home, HomeError};

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct Master {
    home: Home,
    queue: VecDeque<String>,
    workers: BTreeMap<String, WorkerRecord>,
    timeout_window: Duration,
    clock: Arc<dyn Clock>,
    drain_logged: bool,
}

impl Master {
    /// Scans `root` and builds an engine with every discovered file queued.
    pub fn load(root: impl Into<PathBuf>, config: &Config) -> Result<Self, HomeError> {
        let mut home = Home::new(root);
        home.load()?;
        Ok(Self::new(home, config))
    }

    pub fn new(home: Home, config: &Config) -> Self {
        Self::with_clock(home, config, Arc::new(SystemClock))
    }

    /// Builds the engine around an already loaded registry.
    ///
    /// Files that already carry a digest are not queued.
    pub fn with_clock(home: Home, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let queue: VecDeque<String> = home
            .paths()
            .filter(|path| home.digest(path).is_none())
            .map(str::to_string)
            .collect();

        tracing::info!("Home files queue prepared: {} files", queue.len());

        Self {
            home,
            queue,
            workers: BTreeMap::new(),
            timeout_window: config.processing_timeout,
            clock,
            drain_logged: false,
        }
    }

    pub fn register(&mut self, worker_name: &str) -> Result<(), MasterError> {
        if self.workers.contains_key(worker_name) {
            return Err(MasterError::AlreadyRegistered(worker_name.to_string()));
        }

        self.workers.insert(
            worker_name.to_string(),
            WorkerRecord::new(worker_name, self.timeout_window),
        );
        tracing::info!("Worker {} registered", worker_name);
        Ok(())
    }

    pub fn is_registered(&self, worker_name: &str) -> bool {
        self.workers.contains_key(worker_name)
    }

    fn ensure_registered(&self, worker_name: &str) -> Result<(), MasterError> {
        if self.is_registered(worker_name) {
            Ok(())
        } else {
            Err(MasterError::NotRegistered(worker_name.to_string()))
        }
    }

    /// Hands the calling worker its next file, or tells it to wait or stop.
    pub fn dispatch(&mut self, worker_name: &str) -> Result<Dispatch, MasterError> {
        self.ensure_registered(worker_name)?;
        let now = self.clock.now_ms();

        if let Some(path) = self.queue.pop_front() {
            let assignment = self.assign(worker_name, path, now)?;
            tracing::debug!("Assigned {} to worker {}", assignment.path, worker_name);
            return Ok(Dispatch::Assigned(assignment));
        }

        if let Some(victim) = self.earliest_timed_out_at(now) {
            if let Some(owner) = self.workers.get_mut(&victim.worker) {
                owner.remove(&victim.path);
            }
            tracing::info!(
                "Reclaimed timed out file {} from worker {} for worker {}",
                victim.path,
                victim.worker,
                worker_name
            );

            let assignment = self.assign(worker_name, victim.path, now)?;
            return Ok(Dispatch::Reclaimed {
                assignment,
                from: victim.worker,
            });
        }

        if self.has_in_flight() {
            tracing::trace!("No claimable file for worker {}, retry later", worker_name);
            Ok(Dispatch::RetryLater)
        } else {
            tracing::trace!("No more files for worker {}", worker_name);
            Ok(Dispatch::Done)
        }
    }

    fn assign(&mut self, worker_name: &str, path: String, now: u64) -> Result<Assignment, MasterError> {
        let full_path = self.home.full_path(&path);
        let size = match std::fs::metadata(&full_path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                tracing::warn!("Cannot read size of {}: {}", full_path.display(), e);
                0
            }
        };

        let record = self
            .workers
            .get_mut(worker_name)
            .ok_or_else(|| MasterError::NotRegistered(worker_name.to_string()))?;
        record.begin(&path, size, now);

        Ok(Assignment {
            path,
            full_path,
            size,
        })
    }

    /// Records a digest reported by `worker_name`.
    ///
    /// Ownership is not checked: a worker whose file was reclaimed may still
    /// report it, and the last report wins. A reported path that is still
    /// queued leaves the queue.
    pub fn report_digest(
        &mut self,
        worker_name: &str,
        path: &str,
        digest: &str,
    ) -> Result<(), MasterError> {
        self.ensure_registered(worker_name)?;
        if !self.home.exists(path) {
            return Err(MasterError::PathNotFound(path.to_string()));
        }

        self.home.set_digest(path, digest);
        if let Some(index) = self.queue.iter().position(|queued| queued == path) {
            self.queue.remove(index);
            tracing::debug!("Dropped {} from the queue, already digested", path);
        }

        let now = self.clock.now_ms();
        if let Some(record) = self.workers.get_mut(worker_name) {
            record.finish(path, now);
        }
        tracing::debug!("Worker {} reported digest of {}", worker_name, path);

        if !self.drain_logged && self.home.is_finished() {
            self.drain_logged = true;
            tracing::info!("All {} home files have a digest", self.home.len());
        }

        Ok(())
    }

    /// Gives up on a file that was dispatched but could not be served.
    ///
    /// The path leaves the worker's in-flight set and is not queued again.
    pub fn abandon(&mut self, worker_name: &str, path: &str) -> bool {
        let removed = self
            .workers
            .get_mut(worker_name)
            .map(|record| record.remove(path))
            .unwrap_or(false);

        if removed {
            tracing::error!("Abandoned file {} dispatched to worker {}", path, worker_name);
        }
        removed
    }

    pub fn status(&self, include_paths: bool) -> HomeStatusResponse {
        HomeStatusResponse {
            state: self.home.state(),
            files: include_paths.then(|| self.home.snapshot()),
        }
    }

    pub fn progress(&self) -> Progress {
        let state = self.home.state();
        Progress {
            total: state.total,
            finished: state.finished,
            queued: self.queue.len(),
            in_flight: self.workers.values().map(WorkerRecord::in_flight_count).sum(),
            workers: self.workers.len(),
        }
    }

    fn earliest_timed_out_at(&self, now: u64) -> Option<TimedOutFile> {
        self.workers
            .values()
            .filter_map(|record| record.earliest_timed_out(now))
            .min_by_key(|timed_out| timed_out.started_at)
    }

    pub fn earliest_timed_out(&self) -> Option<TimedOutFile> {
        self.earliest_timed_out_at(self.clock.now_ms())
    }

    pub fn timed_out_files(&self) -> Vec<TimedOutFile> {
        let now = self.clock.now_ms();
        self.workers
            .values()
            .flat_map(|record| record.timed_out_files(now))
            .collect()
    }

    pub fn has_in_flight(&self) -> bool {
        self.workers.values().any(WorkerRecord::has_in_flight)
    }

    pub fn is_queued(&self, path: &str) -> bool {
        self.queue.iter().any(|queued| queued == path)
    }

    pub fn queued_paths(&self) -> impl Iterator<Item = &str> {
        self.queue.iter().map(String::as_str)
    }

    pub fn worker(&self, worker_name: &str) -> Option<&WorkerRecord> {
        self.workers.get(worker_name)
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerRecord> {
        self.workers.values()
    }

    pub fn worker_names(&self) -> Vec<&str> {
        self.workers.keys().map(String::as_str).collect()
    }

    pub fn home(&self) -> &Home {
        &self.home
    }
}
