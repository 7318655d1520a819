use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::job::{JobId, JobInfo};
use crate::wire::{Cursors, StatusResponse};

/// Any failed request. The engine treats every variant the same way.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The client-side timeout elapsed.
    #[error("request timed out")]
    Timeout,
    /// The server answered with a non-success status.
    #[error("server returned HTTP {0}")]
    Status(u16),
    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// The body could not be decoded.
    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Status(status.as_u16())
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// The two requests the dashboard makes against the crab server.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Long-poll for changes since `cursors` (`Cursors::ZERO` for a full snapshot).
    async fn job_status(&self, cursors: Cursors) -> Result<StatusResponse, TransportError>;
    /// Fetch descriptive details of one job.
    async fn job_info(&self, id: &JobId) -> Result<JobInfo, TransportError>;
}

/// [`Transport`] over HTTP with `reqwest`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
    poll_timeout: Duration,
    info_timeout: Duration,
}

impl HttpTransport {
    /// Transport for the server at `base` (e.g. `http://crab:8000`).
    pub fn new(base: impl Into<String>, poll_timeout: Duration, info_timeout: Duration) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { client: reqwest::Client::new(), base, poll_timeout, info_timeout }
    }

    /// URL of the status stream at `cursors`.
    pub fn status_url(&self, cursors: Cursors) -> String {
        format!(
            "{}/query/jobstatus?startid={}&warnid={}&finishid={}",
            self.base, cursors.start, cursors.warn, cursors.finish
        )
    }

    /// URL of the job info resource for `id`.
    pub fn info_url(&self, id: &JobId) -> String {
        format!("{}/query/jobinfo/{}", self.base, id)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        timeout: Duration,
    ) -> Result<T, TransportError> {
        debug!(%url, "GET");
        let resp = self.client.get(&url).timeout(timeout).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn job_status(&self, cursors: Cursors) -> Result<StatusResponse, TransportError> {
        self.get_json(self.status_url(cursors), self.poll_timeout).await
    }

    async fn job_info(&self, id: &JobId) -> Result<JobInfo, TransportError> {
        self.get_json(self.info_url(id), self.info_timeout).await
    }
}
