//! Job-related API endpoints

use std::time::Duration;

use jobrelay_core::dto::job::{CancelJobResponse, CreateJobResponse, JobStatusResponse};
use reqwest::{Method, Url};
use uuid::Uuid;

use crate::OrchestratorClient;
use crate::error::{ClientError, Result};

const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
const REPLAYED_HEADER: &str = "idempotent-replayed";

/// A job request to submit through the orchestrator
#[derive(Debug, Clone)]
pub struct JobSubmission {
    pub job_name: String,
    pub idempotency_key: String,
    /// Method the orchestrator will use towards the downstream service
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl JobSubmission {
    /// A bodyless POST submission
    pub fn new(job_name: impl Into<String>, idempotency_key: impl Into<String>) -> Self {
        Self {
            job_name: job_name.into(),
            idempotency_key: idempotency_key.into(),
            method: Method::POST,
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }
}

/// Outcome of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub uuid: Uuid,
    /// True when the key was already bound to an existing execution
    pub replayed: bool,
}

impl OrchestratorClient {
    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Submit a job for asynchronous execution
    ///
    /// Submitting again with the same idempotency key returns the original
    /// execution with `replayed` set.
    pub async fn create_job(&self, submission: JobSubmission) -> Result<Submitted> {
        let url = self.create_url(&submission.job_name)?;

        let mut request = self
            .client
            .request(submission.method, url)
            .header(IDEMPOTENCY_KEY_HEADER, &submission.idempotency_key);

        let mut has_content_type = false;
        for (name, value) in &submission.headers {
            has_content_type |= name.eq_ignore_ascii_case("content-type");
            request = request.header(name.as_str(), value.as_str());
        }
        if !submission.query.is_empty() {
            request = request.query(&submission.query);
        }
        if let Some(body) = submission.body {
            if !has_content_type {
                request = request.header(reqwest::header::CONTENT_TYPE, "application/json");
            }
            request = request.body(body);
        }

        let response = request.send().await?;
        let replayed = response
            .headers()
            .get(REPLAYED_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        let created: CreateJobResponse = self.handle_response(response).await?;
        tracing::debug!("Submitted job {} as {}", submission.job_name, created.uuid);

        Ok(Submitted {
            uuid: created.uuid,
            replayed,
        })
    }

    /// Get the current state of an execution
    pub async fn get_job(&self, id: Uuid) -> Result<JobStatusResponse> {
        let url = format!("{}/job/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Cancel an execution
    ///
    /// Cancelling a finished execution succeeds and leaves it unchanged.
    pub async fn cancel_job(&self, id: Uuid) -> Result<CancelJobResponse> {
        let url = format!("{}/job/cancel/{}", self.base_url, id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Poll an execution until it reaches a terminal state
    pub async fn wait_for_completion(
        &self,
        id: Uuid,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<JobStatusResponse> {
        let started = tokio::time::Instant::now();

        loop {
            let status = self.get_job(id).await?;
            if status.status.is_terminal() {
                return Ok(status);
            }

            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ClientError::Timeout { id, waited });
            }

            tracing::debug!("Execution {} is {}, polling again", id, status.status);
            tokio::time::sleep(poll_interval.min(timeout - waited)).await;
        }
    }

    fn create_url(&self, job_name: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidRequest(format!("invalid base URL: {}", e)))?;

        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidRequest("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(["job", "create", job_name]);

        Ok(url)
    }
}
