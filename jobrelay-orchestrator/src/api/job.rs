//! Job API Handlers
//!
//! HTTP endpoints for job submission, status and cancellation.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use jobrelay_core::dto::job::{CancelJobResponse, CreateJobResponse, JobStatusResponse};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::forwarding::IDEMPOTENCY_KEY_HEADER;
use crate::service::{CancelOutcome, JobRequest, Orchestrator};

/// Set on responses that return an already existing execution
pub const REPLAYED_HEADER: &str = "idempotent-replayed";

// =============================================================================
// Submission
// =============================================================================

/// GET|POST|PUT|PATCH|DELETE /job/create/{job_name}
/// Create an execution for the named job and forward the request asynchronously
pub async fn create_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(job_name): Path<String>,
    method: Method,
    headers: HeaderMap,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Response> {
    let Query(query) = query?;

    let idempotency_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let body = if body.is_empty() {
        None
    } else {
        Some(
            String::from_utf8(body.to_vec())
                .map_err(|_| ApiError::Validation("Request body must be UTF-8".to_string()))?,
        )
    };

    tracing::info!("Job submission for {} with method {}", job_name, method);

    let request = JobRequest {
        job_name,
        idempotency_key,
        method,
        headers: forwardable_headers(&headers),
        query,
        body,
    };

    let admission = orchestrator.create_and_dispatch(request).await?;
    let payload = Json(CreateJobResponse {
        uuid: admission.id(),
    });

    Ok(if admission.is_replay() {
        (
            StatusCode::OK,
            [(REPLAYED_HEADER, HeaderValue::from_static("true"))],
            payload,
        )
            .into_response()
    } else {
        (StatusCode::OK, payload).into_response()
    })
}

/// /job/create/ without a job name
pub async fn create_job_without_name() -> ApiError {
    ApiError::Validation("Job name is required".to_string())
}

/// Caller headers minus the idempotency key
fn forwardable_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str() != IDEMPOTENCY_KEY_HEADER)
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

// =============================================================================
// Status and Cancellation
// =============================================================================

/// GET /job/{uuid}
/// Get the current state of an execution
pub async fn get_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(uuid): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let id = parse_uuid(&uuid)?;
    tracing::debug!("Getting job execution: {}", id);

    let execution = orchestrator.get_status(id).await?;
    Ok(Json(execution.into()))
}

/// POST /job/cancel/{uuid}
/// Cancel an execution; finished executions are reported, not changed
pub async fn cancel_job(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(uuid): Path<String>,
) -> ApiResult<Json<CancelJobResponse>> {
    let id = parse_uuid(&uuid)?;
    tracing::info!("Cancel requested for job execution: {}", id);

    let message = match orchestrator.cancel(id).await? {
        CancelOutcome::Cancelled => "Job cancellation request processed".to_string(),
        CancelOutcome::AlreadyTerminal(status) => {
            format!("Job already finished with status {}", status)
        }
    };

    Ok(Json(CancelJobResponse { message, uuid: id }))
}

fn parse_uuid(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::Validation(format!("Invalid UUID: {}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwardable_headers_drop_idempotency_key() {
        let mut headers = HeaderMap::new();
        headers.insert("idempotency-key", HeaderValue::from_static("k1"));
        headers.insert("x-tenant", HeaderValue::from_static("acme"));

        let forwarded = forwardable_headers(&headers);

        assert_eq!(forwarded, vec![("x-tenant".to_string(), "acme".to_string())]);
    }

    #[test]
    fn test_parse_uuid_rejects_garbage() {
        assert!(matches!(parse_uuid("not-a-uuid"), Err(ApiError::Validation(_))));
        assert!(parse_uuid("67e55044-10b1-426f-9247-bb680e5fe0c8").is_ok());
    }
}
