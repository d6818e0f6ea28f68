//! Worker Record
//!
//! Per-worker bookkeeping kept by the master: the files currently handed to the
//! worker, and cumulative counters that give a seconds-per-byte throughput
//! estimate. The estimate sizes the timeout for each file so large files are
//! not reassigned early and a stalled worker is noticed after roughly one
//! timeout window regardless of file size.
//!
//! All operations take `now` (ms since epoch) explicitly; the record itself
//! never reads a clock.

use super::types::{InFlight, TimedOutFile};

use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerRecord {
    name: String,
    timeout_window: Duration,
    /// Path -> (size, started_at). Ordered so scans are deterministic.
    in_flight: BTreeMap<String, InFlight>,
    total_bytes: u64,
    total_seconds: f64,
    total_files: u64,
}

impl WorkerRecord {
    pub fn new(name: impl Into<String>, timeout_window: Duration) -> Self {
        Self {
            name: name.into(),
            timeout_window,
            in_flight: BTreeMap::new(),
            total_bytes: 0,
            total_seconds: 0.0,
            total_files: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts tracking `path` as handed to this worker at `now`.
    pub fn begin(&mut self, path: &str, size: u64, now: u64) {
        let previous = self.in_flight.insert(
            path.to_string(),
            InFlight {
                size,
                started_at: now,
            },
        );

        if previous.is_some() {
            tracing::warn!(
                "File {} is in flight for worker {} already, overriding it",
                path,
                self.name
            );
        }
    }

    /// Stops tracking `path` and folds its processing time into the estimate.
    ///
    /// Returns `false` when the path was not in flight here, which happens
    /// after the file was reclaimed and handed to someone else.
    pub fn finish(&mut self, path: &str, now: u64) -> bool {
        let Some(entry) = self.in_flight.remove(path) else {
            tracing::debug!(
                "File {} is not in flight for worker {}, ignoring it",
                path,
                self.name
            );
            return false;
        };

        match now.checked_sub(entry.started_at) {
            Some(elapsed_ms) => {
                self.total_bytes += entry.size;
                self.total_seconds += elapsed_ms as f64 / 1000.0;
                self.total_files += 1;
            }
            None => {
                tracing::warn!(
                    "Start time of file {} is later than now on worker {}, discarding sample",
                    path,
                    self.name
                );
            }
        }

        true
    }

    /// Drops `path` from the in-flight set without touching the counters.
    pub fn remove(&mut self, path: &str) -> bool {
        self.in_flight.remove(path).is_some()
    }

    pub fn has_in_flight(&self) -> bool {
        !self.in_flight.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn in_flight(&self, path: &str) -> Option<InFlight> {
        self.in_flight.get(path).copied()
    }

    pub fn in_flight_paths(&self) -> impl Iterator<Item = &str> {
        self.in_flight.keys().map(String::as_str)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_files(&self) -> u64 {
        self.total_files
    }

    /// Historical processing rate. Zero until the first byte is accounted for.
    pub fn seconds_per_byte(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            self.total_seconds / self.total_bytes as f64
        }
    }

    pub fn seconds_per_file(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            self.total_seconds / self.total_files as f64
        }
    }

    /// A worker with no history is presumed fast: the estimate is zero.
    pub fn estimate_seconds(&self, size: u64) -> f64 {
        size as f64 * self.seconds_per_byte()
    }

    fn is_timed_out(&self, entry: &InFlight, now: u64) -> bool {
        let expected_done_ms = entry.started_at as f64 + self.estimate_seconds(entry.size) * 1000.0;
        let timeout_before_ms = now as f64 - self.timeout_window.as_millis() as f64;
        expected_done_ms < timeout_before_ms
    }

    fn iter_timed_out(&self, now: u64) -> impl Iterator<Item = (&String, &InFlight)> {
        self.in_flight
            .iter()
            .filter(move |(_, entry)| self.is_timed_out(entry, now))
    }

    fn to_timed_out(&self, path: &str, entry: &InFlight) -> TimedOutFile {
        TimedOutFile {
            worker: self.name.clone(),
            path: path.to_string(),
            started_at: entry.started_at,
        }
    }

    pub fn timed_out_files(&self, now: u64) -> Vec<TimedOutFile> {
        self.iter_timed_out(now)
            .map(|(path, entry)| self.to_timed_out(path, entry))
            .collect()
    }

    pub fn first_timed_out(&self, now: u64) -> Option<TimedOutFile> {
        self.iter_timed_out(now)
            .next()
            .map(|(path, entry)| self.to_timed_out(path, entry))
    }

    /// Oldest assignment among the timed-out files; ties go to the first found.
    pub fn earliest_timed_out(&self, now: u64) -> Option<TimedOutFile> {
        self.iter_timed_out(now)
            .min_by_key(|(_, entry)| entry.started_at)
            .map(|(path, entry)| self.to_timed_out(path, entry))
    }
}
