use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::device::DeviceInfo;
use crate::models::job::{ComputeJob, JobSummary};

/// Thin HTTP wrapper over the coordinator's job-queue API.
///
/// All four operations are single request/response calls; atomicity of
/// "one device per claim" is the coordinator's guarantee, not re-verified
/// here.
pub struct RemoteQueueClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRequest<'a> {
    device_id: &'a str,
    claimed_at: i64,
}

#[derive(Deserialize)]
struct RegisterResponse {
    token: Option<String>,
}

#[derive(Deserialize)]
struct AvailableJobsResponse {
    #[serde(default)]
    jobs: Vec<JobSummary>,
}

impl RemoteQueueClient {
    pub fn new(base_url: &str) -> Result<Self, QueueError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(QueueError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Register this device with the coordinator. Idempotent; the returned
    /// session token is attached to all subsequent requests.
    pub async fn register_device(&self, info: &DeviceInfo) -> Result<Option<String>, QueueError> {
        let url = format!("{}/devices/register", self.base_url);
        let response = self.authorized(self.http.post(&url)).json(info).send().await?;

        if !response.status().is_success() {
            return Err(QueueError::UnexpectedStatus(response.status()));
        }

        let body: RegisterResponse = response.json().await?;
        if let Some(token) = body.token.clone() {
            *self.token.write().expect("token lock poisoned") = Some(token);
        }
        Ok(body.token)
    }

    /// List jobs the coordinator considers this device eligible for. The
    /// device applies no filtering of its own beyond taking the first entry.
    pub async fn list_available(
        &self,
        device_id: &str,
        limit: u32,
    ) -> Result<Vec<JobSummary>, QueueError> {
        let url = format!("{}/jobs/available", self.base_url);
        let response = self
            .authorized(self.http.get(&url))
            .query(&[("deviceId", device_id), ("limit", &limit.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueueError::UnexpectedStatus(response.status()));
        }

        let body: AvailableJobsResponse = response.json().await?;
        Ok(body.jobs)
    }

    /// Attempt to claim a job. `Ok(None)` means another device got there
    /// first, which the caller treats the same as an empty listing.
    pub async fn claim(
        &self,
        job_id: &str,
        device_id: &str,
        claimed_at: i64,
    ) -> Result<Option<ComputeJob>, QueueError> {
        let url = format!("{}/jobs/{}/claim", self.base_url, job_id);
        let response = self
            .authorized(self.http.post(&url))
            .json(&ClaimRequest { device_id, claimed_at })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let job: ComputeJob = response.json().await?;
                Ok(Some(job))
            }
            StatusCode::NOT_FOUND | StatusCode::CONFLICT | StatusCode::GONE => Ok(None),
            status => Err(QueueError::UnexpectedStatus(status)),
        }
    }

    /// Hand a finished record back to the coordinator.
    pub async fn submit_result(&self, job: &ComputeJob) -> Result<(), QueueError> {
        let url = format!("{}/jobs/{}/result", self.base_url, job.job_id);
        let response = self.authorized(self.http.post(&url)).json(job).send().await?;

        if !response.status().is_success() {
            return Err(QueueError::UnexpectedStatus(response.status()));
        }
        Ok(())
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().expect("token lock poisoned").as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("coordinator returned unexpected status: {0}")]
    UnexpectedStatus(StatusCode),
}
