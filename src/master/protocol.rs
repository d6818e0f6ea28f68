//! Network Protocol Definitions
//!
//! Endpoints, header names and the DTOs exchanged between workers and the
//! master. Both sides import these so the wire contract lives in one place.

use crate::home::{FileDigests, HomeState};
use serde::{Deserialize, Serialize};

pub const ENDPOINT_WORKER_REGISTER: &str = "/worker_register";
pub const ENDPOINT_GET_FILE: &str = "/get_file";
pub const ENDPOINT_UPDATE_FILE_HASH: &str = "/update_file_hash";
pub const ENDPOINT_HOME_STATUS: &str = "/home_status";

/// Self-declared worker identity, required on every worker request.
pub const HEADER_WORKER_NAME: &str = "x-distributed-worker-name";
/// Relative path of the file streamed in a `/get_file` response.
pub const HEADER_FILE_PATH: &str = "x-distributed-file-path";

pub const FIELD_FILE_PATH: &str = "file_path";
pub const FIELD_FILE_HASH: &str = "file_hash";

/// Form body of `PUT /update_file_hash`.
///
/// Both fields are optional at the type level so a missing one is reported as
/// a 400 naming the field instead of a generic extractor rejection.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdateFileHashForm {
    pub file_path: Option<String>,
    pub file_hash: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HomeStatusQuery {
    pub include_files: Option<String>,
}

impl HomeStatusQuery {
    /// Any non-empty value except `0` and `false` asks for the file listing.
    pub fn wants_files(&self) -> bool {
        match self.include_files.as_deref().map(str::trim) {
            None | Some("") | Some("0") => false,
            Some(value) => !value.eq_ignore_ascii_case("false"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HomeStatusResponse {
    pub state: HomeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<FileDigests>,
}
