//! Remote operations to start and poll a sync job.
//!
//! Server capability and job disappearance are expressed as tagged outcome
//! variants rather than by inspecting error shapes: a 404 on the start
//! endpoint means the server predates job-based sync, a 404 on the status
//! endpoint means the server no longer recognizes the job.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::job::SyncJob;

/// Outcome of asking the server to start a job-based sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// The server accepted the request and runs the job under this id.
    Started { sync_id: String },
    /// The server predates job-based sync; fall back to the legacy path.
    NotSupported,
}

/// Outcome of polling a job the client believes is running.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Snapshot(SyncJob),
    /// The server no longer recognizes the job id.
    NotFound,
}

/// Remote sync-job operations.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Begin a job-based sync.
    async fn start_job(&self) -> Result<StartOutcome, TransportError>;

    /// Fetch the current snapshot of a running job.
    async fn poll_job(&self, sync_id: &str) -> Result<PollOutcome, TransportError>;

    /// Degraded fire-and-forget sync, used only after `NotSupported`.
    async fn legacy_start(&self) -> Result<(), TransportError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    sync_id: String,
}

/// HTTP implementation against the Leadline API.
pub struct HttpSyncTransport {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpSyncTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        req
    }
}

#[async_trait]
impl SyncTransport for HttpSyncTransport {
    async fn start_job(&self) -> Result<StartOutcome, TransportError> {
        let url = format!("{}/sync/start", self.base_url);
        let resp = self.request(Method::POST, url).send().await?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                debug!("Server does not support job-based sync");
                Ok(StartOutcome::NotSupported)
            }
            status if status.is_success() => {
                let body: StartResponse = resp.json().await?;
                debug!(sync_id = %body.sync_id, "Sync job started");
                Ok(StartOutcome::Started {
                    sync_id: body.sync_id,
                })
            }
            status => Err(TransportError::Server {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn poll_job(&self, sync_id: &str) -> Result<PollOutcome, TransportError> {
        let url = format!("{}/sync/status", self.base_url);
        let resp = self
            .request(Method::GET, url)
            .query(&[("syncId", sync_id)])
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(PollOutcome::NotFound),
            status if status.is_success() => {
                let job: SyncJob = resp.json().await?;
                Ok(PollOutcome::Snapshot(job))
            }
            status => Err(TransportError::Server {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn legacy_start(&self) -> Result<(), TransportError> {
        let url = format!("{}/sync", self.base_url);
        let resp = self.request(Method::POST, url).send().await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Server {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            })
        }
    }
}
