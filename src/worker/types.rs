use thiserror::Error;

/// Result of one `GET /get_file` round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A file was streamed and digested.
    Digested {
        path: String,
        digest: String,
        bytes: u64,
    },
    RetryLater,
    Done,
}

/// States of the pull loop of one worker slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Unregistered,
    Registered,
    Requesting,
    Backoff,
    Terminated,
}

/// What one slot did before it terminated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub name: String,
    pub files: u64,
    pub bytes: u64,
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: &'static str, status: u16 },

    #[error("worker {0} has already registered")]
    AlreadyRegistered(String),

    #[error("file response is missing the file path header")]
    MissingFilePath,

    #[error("master unreachable after {0} consecutive failures")]
    MasterUnreachable(u32),
}

impl WorkerError {
    /// Transient failures leave the current file to the master's timeout and
    /// let the slot retry after a backoff; everything else ends the slot.
    pub fn is_transient(&self) -> bool {
        match self {
            WorkerError::Http(_) => true,
            WorkerError::UnexpectedStatus { status, .. } => *status >= 500,
            WorkerError::MissingFilePath => true,
            WorkerError::AlreadyRegistered(_) | WorkerError::MasterUnreachable(_) => false,
        }
    }
}
