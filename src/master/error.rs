use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Client-caused protocol errors and the few internal failures a request can hit.
///
/// Retry-later and done are not errors; they are `Dispatch` outcomes.
#[derive(Error, Debug)]
pub enum MasterError {
    #[error("missing worker name header")]
    MissingWorkerName,

    #[error("worker {0} not registered yet")]
    NotRegistered(String),

    #[error("worker {0} has already registered")]
    AlreadyRegistered(String),

    #[error("missing {0} parameter")]
    MissingField(&'static str),

    #[error("malformed report: {0}")]
    MalformedReport(String),

    #[error("file not found: {0}")]
    PathNotFound(String),

    #[error("file path cannot be sent as a header: {0}")]
    InvalidFilePath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MasterError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MasterError::MissingWorkerName
            | MasterError::NotRegistered(_)
            | MasterError::MissingField(_)
            | MasterError::MalformedReport(_) => StatusCode::BAD_REQUEST,
            MasterError::AlreadyRegistered(_) => StatusCode::CONFLICT,
            MasterError::PathNotFound(_) => StatusCode::NOT_FOUND,
            MasterError::InvalidFilePath(_) | MasterError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for MasterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
