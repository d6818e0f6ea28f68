//! Worker Module
//!
//! The compute side of the pull protocol. Workers hold no shared state: each
//! slot registers with the master, then repeatedly pulls one file, streams it
//! through a digest and reports the result, until the master says the job is
//! drained.
//!
//! ## Submodules
//! - **`runner`**: `WorkerClient`, the per-slot state machine.
//! - **`pool`**: spawns one runner per concurrency slot.
//! - **`client`**: reqwest calls against the master endpoints.
//! - **`digest`**: streaming content digest.

pub mod client;
pub mod digest;
pub mod pool;
pub mod runner;
pub mod types;

pub use client::MasterClient;
pub use pool::{PoolReport, WorkerPool};
pub use runner::WorkerClient;
pub use types::{FetchOutcome, WorkerError, WorkerState, WorkerSummary};
