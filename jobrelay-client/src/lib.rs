//! JobRelay HTTP Client
//!
//! A type-safe HTTP client for the JobRelay orchestrator API: submit jobs,
//! poll their status, cancel them and wait for completion.
//!
//! # Example
//!
//! ```no_run
//! use jobrelay_client::{JobSubmission, OrchestratorClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), jobrelay_client::ClientError> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let submitted = client
//!         .create_job(JobSubmission::new("nightly-report", "report-2024-06-01"))
//!         .await?;
//!
//!     println!("Execution: {}", submitted.uuid);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use jobrelay_core::dto::job::{CancelJobResponse, JobStatusResponse};
pub use jobs::{JobSubmission, Submitted};
pub use reqwest::Method;

use jobrelay_core::dto::error::ErrorResponse;
use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the JobRelay orchestrator API
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use jobrelay_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Deserialize a successful response, or turn an error body into [`ClientError::Api`]
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(api_error(status.as_u16(), &body));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

fn api_error(status: u16, body: &str) -> ClientError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => ClientError::Api {
            status,
            code: err.error_code,
            message: err.message,
        },
        Err(_) => ClientError::Api {
            status,
            code: "UNKNOWN".to_string(),
            message: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_structured_error_body() {
        let body = serde_json::to_string(&ErrorResponse::new("JOB_NOT_FOUND", "gone")).unwrap();

        let err = api_error(404, &body);

        assert!(err.is_not_found());
        assert_eq!(err.code(), Some("JOB_NOT_FOUND"));
    }

    #[test]
    fn test_plain_error_body() {
        let err = api_error(502, "Bad Gateway");

        assert!(err.is_server_error());
        assert_eq!(err.code(), Some("UNKNOWN"));
        assert!(err.to_string().contains("Bad Gateway"));
    }
}
