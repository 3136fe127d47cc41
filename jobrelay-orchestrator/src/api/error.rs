//! API Error Handling
//!
//! Unified error type and conversion for API responses. Every failure is
//! rendered as an [`ErrorResponse`] body.

use axum::{
    Json,
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use jobrelay_core::dto::error::ErrorResponse;
use uuid::Uuid;

use crate::service::{OrchestrationError, PoolError};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    MappingNotFound(String),
    JobNotFound(Uuid),
    ServiceUnavailable(String),
    InternalError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::MappingNotFound(_) => StatusCode::BAD_REQUEST,
            ApiError::JobNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::MappingNotFound(_) => "JOB_MAPPING_NOT_FOUND",
            ApiError::JobNotFound(_) => "JOB_NOT_FOUND",
            ApiError::ServiceUnavailable(_) => "WORKER_POOL_SATURATED",
            ApiError::InternalError(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match self {
            ApiError::Validation(msg) | ApiError::ServiceUnavailable(msg) => msg,
            ApiError::MappingNotFound(job_name) => {
                format!("No job mapping found for job name: {}", job_name)
            }
            ApiError::JobNotFound(id) => format!("Job execution not found: {}", id),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An unexpected error occurred".to_string()
            }
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}

impl From<OrchestrationError> for ApiError {
    fn from(err: OrchestrationError) -> Self {
        match err {
            OrchestrationError::Validation(msg) => ApiError::Validation(msg),
            OrchestrationError::MappingNotFound(job_name) => ApiError::MappingNotFound(job_name),
            OrchestrationError::JobNotFound(id) => ApiError::JobNotFound(id),
            OrchestrationError::Rejected(PoolError::Saturated) => ApiError::ServiceUnavailable(
                "Worker pool is saturated, retry later".to_string(),
            ),
            OrchestrationError::Rejected(PoolError::Closed) => {
                ApiError::ServiceUnavailable("Worker pool is shut down".to_string())
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(format!("Invalid query string: {}", rejection.body_text()))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
