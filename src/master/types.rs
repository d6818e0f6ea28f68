use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Source of wall-clock time for the dispatch engine, in milliseconds since
/// the Unix epoch.
///
/// Wall-clock (not monotonic) time is used on purpose: elapsed times can come
/// out negative after a clock step, and the worker record treats that as a
/// sample to discard.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        now_ms()
    }
}

/// Helper to get the current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// A file the master has tracked as being processed by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub size: u64,
    /// Timestamp (ms) when the file was handed to the worker.
    pub started_at: u64,
}

/// A file whose expected completion time plus the timeout window has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOutFile {
    pub worker: String,
    pub path: String,
    pub started_at: u64,
}

/// A file handed to a worker by `dispatch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    /// Path relative to the home root.
    pub path: String,
    pub full_path: PathBuf,
    pub size: u64,
}

/// Outcome of a worker asking the master for work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Head of the unassigned queue.
    Assigned(Assignment),
    /// A timed-out file taken away from `from` without notifying it.
    Reclaimed { assignment: Assignment, from: String },
    /// Nothing is claimable yet, but files are still in flight.
    RetryLater,
    /// Queue drained and nothing in flight.
    Done,
}

impl Dispatch {
    pub fn assignment(&self) -> Option<&Assignment> {
        match self {
            Dispatch::Assigned(assignment) => Some(assignment),
            Dispatch::Reclaimed { assignment, .. } => Some(assignment),
            Dispatch::RetryLater | Dispatch::Done => None,
        }
    }
}

/// Snapshot of the engine used by the periodic progress log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Progress {
    pub total: usize,
    pub finished: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub workers: usize,
}
