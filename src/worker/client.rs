//! HTTP client for the master API, one per worker slot.

use super::digest::ContentDigest;
use super::types::{FetchOutcome, WorkerError};
use crate::master::protocol::{
    HomeStatusResponse, ENDPOINT_GET_FILE, ENDPOINT_HOME_STATUS, ENDPOINT_UPDATE_FILE_HASH,
    ENDPOINT_WORKER_REGISTER, FIELD_FILE_HASH, FIELD_FILE_PATH, HEADER_FILE_PATH,
    HEADER_WORKER_NAME,
};

use reqwest::StatusCode;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MasterClient {
    base_url: String,
    worker_name: String,
    http_client: reqwest::Client,
}

impl MasterClient {
    pub fn new(base_url: impl Into<String>, worker_name: impl Into<String>) -> Result<Self, WorkerError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            worker_name: worker_name.into(),
            http_client,
        })
    }

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    pub async fn register(&self) -> Result<(), WorkerError> {
        let response = self
            .http_client
            .post(self.url(ENDPOINT_WORKER_REGISTER))
            .header(HEADER_WORKER_NAME, &self.worker_name)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::CONFLICT => Err(WorkerError::AlreadyRegistered(self.worker_name.clone())),
            status => Err(WorkerError::UnexpectedStatus {
                endpoint: ENDPOINT_WORKER_REGISTER,
                status: status.as_u16(),
            }),
        }
    }

    /// Asks for a file and, when one is sent, digests the body as it arrives.
    ///
    /// Body frames are fed to the digest in slices of at most `chunk_size`
    /// bytes; the file is never buffered whole.
    pub async fn fetch(&self, chunk_size: usize) -> Result<FetchOutcome, WorkerError> {
        let mut response = self
            .http_client
            .get(self.url(ENDPOINT_GET_FILE))
            .header(HEADER_WORKER_NAME, &self.worker_name)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::ACCEPTED => return Ok(FetchOutcome::RetryLater),
            StatusCode::NO_CONTENT => return Ok(FetchOutcome::Done),
            status => {
                return Err(WorkerError::UnexpectedStatus {
                    endpoint: ENDPOINT_GET_FILE,
                    status: status.as_u16(),
                })
            }
        }

        let path = response
            .headers()
            .get(HEADER_FILE_PATH)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .ok_or(WorkerError::MissingFilePath)?;

        let mut digest = ContentDigest::new();
        while let Some(chunk) = response.chunk().await? {
            for piece in chunk.chunks(chunk_size.max(1)) {
                digest.update(piece);
            }
        }

        let bytes = digest.bytes();
        Ok(FetchOutcome::Digested {
            path,
            digest: digest.finalize_hex(),
            bytes,
        })
    }

    pub async fn report(&self, path: &str, digest: &str) -> Result<(), WorkerError> {
        let form = [(FIELD_FILE_PATH, path), (FIELD_FILE_HASH, digest)];
        let response = self
            .http_client
            .put(self.url(ENDPOINT_UPDATE_FILE_HASH))
            .header(HEADER_WORKER_NAME, &self.worker_name)
            .form(&form)
            .send()
            .await?;

        if response.status() == StatusCode::OK {
            Ok(())
        } else {
            Err(WorkerError::UnexpectedStatus {
                endpoint: ENDPOINT_UPDATE_FILE_HASH,
                status: response.status().as_u16(),
            })
        }
    }

    pub async fn home_status(&self, include_files: bool) -> Result<HomeStatusResponse, WorkerError> {
        let mut request = self.http_client.get(self.url(ENDPOINT_HOME_STATUS));
        if include_files {
            request = request.query(&[("include_files", "1")]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(WorkerError::UnexpectedStatus {
                endpoint: ENDPOINT_HOME_STATUS,
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}
