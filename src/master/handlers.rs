use super::dispatch::Master;
use super::error::MasterError;
use super::protocol::*;
use super::types::Dispatch;

use axum::body::Body;
use axum::extract::rejection::FormRejection;
use axum::extract::Query;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Form, Json, Router};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::io::ReaderStream;

/// Shared handler state: the dispatch engine behind one lock.
///
/// Handlers take the lock only around synchronous engine calls and release it
/// before any await point.
pub struct MasterState {
    master: Mutex<Master>,
    chunk_size: usize,
}

impl MasterState {
    pub fn new(master: Master, chunk_size: usize) -> Arc<Self> {
        Arc::new(Self {
            master: Mutex::new(master),
            chunk_size,
        })
    }

    /// Locks the engine, recovering a poisoned lock.
    pub fn master(&self) -> MutexGuard<'_, Master> {
        self.master.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

pub fn router(state: Arc<MasterState>) -> Router {
    Router::new()
        .route(ENDPOINT_WORKER_REGISTER, post(handle_worker_register))
        .route(ENDPOINT_GET_FILE, get(handle_get_file))
        .route(ENDPOINT_UPDATE_FILE_HASH, put(handle_update_file_hash))
        .route(ENDPOINT_HOME_STATUS, get(handle_home_status))
        .layer(Extension(state))
}

fn worker_name(headers: &HeaderMap) -> Result<String, MasterError> {
    headers
        .get(HEADER_WORKER_NAME)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or(MasterError::MissingWorkerName)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.is_empty())
}

pub async fn handle_worker_register(
    Extension(state): Extension<Arc<MasterState>>,
    headers: HeaderMap,
) -> Result<StatusCode, MasterError> {
    let worker_name = worker_name(&headers)?;
    state.master().register(&worker_name)?;
    Ok(StatusCode::OK)
}

/// Dispatches one file to the caller and streams its content.
///
/// 202 means wait and ask again, 204 means the job is drained.
pub async fn handle_get_file(
    Extension(state): Extension<Arc<MasterState>>,
    headers: HeaderMap,
) -> Result<Response, MasterError> {
    let worker_name = worker_name(&headers)?;
    let outcome = state.master().dispatch(&worker_name)?;

    let assignment = match outcome {
        Dispatch::Assigned(assignment) => assignment,
        Dispatch::Reclaimed { assignment, .. } => assignment,
        Dispatch::RetryLater => {
            return Ok((
                StatusCode::ACCEPTED,
                "wait for processing files timeout and make request again",
            )
                .into_response());
        }
        Dispatch::Done => return Ok(StatusCode::NO_CONTENT.into_response()),
    };

    let path_header = match HeaderValue::from_bytes(assignment.path.as_bytes()) {
        Ok(value) => value,
        Err(_) => {
            state.master().abandon(&worker_name, &assignment.path);
            return Err(MasterError::InvalidFilePath(assignment.path));
        }
    };

    let file = match tokio::fs::File::open(&assignment.full_path).await {
        Ok(file) => file,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", assignment.full_path.display(), e);
            state.master().abandon(&worker_name, &assignment.path);
            return Err(MasterError::Io(e));
        }
    };

    let body = Body::from_stream(ReaderStream::with_capacity(file, state.chunk_size()));

    Ok((
        [
            (HeaderName::from_static(HEADER_FILE_PATH), path_header),
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
        ],
        body,
    )
        .into_response())
}

pub async fn handle_update_file_hash(
    Extension(state): Extension<Arc<MasterState>>,
    headers: HeaderMap,
    form: Result<Form<UpdateFileHashForm>, FormRejection>,
) -> Result<StatusCode, MasterError> {
    let worker_name = worker_name(&headers)?;
    if !state.master().is_registered(&worker_name) {
        return Err(MasterError::NotRegistered(worker_name));
    }

    let Form(form) = form.map_err(|rejection| MasterError::MalformedReport(rejection.body_text()))?;
    let file_path = non_empty(form.file_path).ok_or(MasterError::MissingField(FIELD_FILE_PATH))?;
    let file_hash = non_empty(form.file_hash).ok_or(MasterError::MissingField(FIELD_FILE_HASH))?;

    state
        .master()
        .report_digest(&worker_name, &file_path, &file_hash)?;

    Ok(StatusCode::OK)
}

pub async fn handle_home_status(
    Extension(state): Extension<Arc<MasterState>>,
    Query(query): Query<HomeStatusQuery>,
) -> Json<HomeStatusResponse> {
    let status = state.master().status(query.wants_files());
    Json(status)
}
