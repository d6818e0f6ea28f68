//! Master Module
//!
//! The coordinator of the pull protocol. It owns the work queue and decides,
//! for every worker request, which file (if any) that worker processes next.
//!
//! ## Architecture Overview
//! 1. **Load**: the home directory is scanned once and every file is queued in scan order.
//! 2. **Dispatch**: a worker asking for work gets the queue head. When the queue is
//!    empty, the oldest file whose worker overran its estimate by more than the
//!    timeout window is reclaimed and handed out again (at-least-once semantics).
//! 3. **Report**: a reported digest is recorded unconditionally and folds the
//!    processing time into the reporting worker's throughput estimate.
//!
//! ## Submodules
//! - **`dispatch`**: `Master`, the synchronous dispatch engine.
//! - **`worker_record`**: per-worker in-flight files and throughput estimate.
//! - **`handlers`**: axum handlers wrapping the engine behind a lock.
//! - **`server`**: listener, graceful shutdown and the progress reporter.
//! - **`protocol`**: endpoints, header names and DTOs shared with workers.
//! - **`error`**: protocol error taxonomy and its HTTP mapping.

pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod types;
pub mod worker_record;

pub use dispatch::Master;
pub use error::MasterError;
pub use handlers::{router, MasterState};
pub use types::{Assignment, Clock, Dispatch, SystemClock, TimedOutFile};
pub use worker_record::WorkerRecord;

#[cfg(test)]
mod tests;
