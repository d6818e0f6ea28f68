//! File Registry Module
//!
//! The registry ("home") is the set of files the cluster has to digest. It is
//! populated exactly once by a recursive scan of a root directory and then only
//! ever mutated by recording digests reported by workers.
//!
//! ## Submodules
//! - **`registry`**: `Home`, the path -> optional digest mapping and the scan.
//! - **`types`**: Serializable counters and the registry error type.

pub mod registry;
pub mod types;

pub use registry::Home;
pub use types::{FileDigests, HomeError, HomeState};
