use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Snapshot of every registered path and its digest, if one was reported.
pub type FileDigests = BTreeMap<String, Option<String>>;

/// Aggregate registry counters reported by `/home_status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HomeState {
    pub total: usize,
    pub finished: usize,
}

#[derive(Error, Debug)]
pub enum HomeError {
    /// The registry is scanned once per process lifetime.
    #[error("home files loaded already")]
    AlreadyLoaded,

    #[error("home root is not a directory: {0}")]
    RootNotADirectory(PathBuf),

    #[error("I/O error while scanning home: {0}")]
    Io(#[from] std::io::Error),
}
