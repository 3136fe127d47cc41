//! Job DTOs for the orchestrator API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::{ExecutionStatus, JobExecution};

/// Response to `/job/create/{jobName}`, both for fresh and replayed submissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub uuid: Uuid,
}

/// Public view of a job execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub uuid: Uuid,
    pub status: ExecutionStatus,
    pub response: Option<String>,
    pub http_status: Option<i32>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<JobExecution> for JobStatusResponse {
    fn from(execution: JobExecution) -> Self {
        Self {
            uuid: execution.id,
            status: execution.status,
            response: execution.response,
            http_status: execution.http_status,
            start_date: execution.started_at,
            end_date: execution.ended_at,
        }
    }
}

/// Response to `/job/cancel/{uuid}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub message: String,
    pub uuid: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_response_uses_api_field_names() {
        let mut execution = JobExecution::started(Uuid::new_v4(), Some("k".to_string()));
        execution.mark_in_progress().unwrap();
        execution.finish("done".to_string(), 200).unwrap();
        let id = execution.id;

        let json = serde_json::to_value(JobStatusResponse::from(execution)).unwrap();

        assert_eq!(json["uuid"], id.to_string());
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["response"], "done");
        assert_eq!(json["httpStatus"], 200);
        assert!(json["startDate"].is_string());
        assert!(json["endDate"].is_string());
        assert!(json.get("idempotencyKey").is_none());
    }

    #[test]
    fn test_status_response_without_end_date() {
        let execution = JobExecution::started(Uuid::new_v4(), None);
        let json = serde_json::to_value(JobStatusResponse::from(execution)).unwrap();

        assert_eq!(json["status"], "STARTED");
        assert!(json["endDate"].is_null());
        assert!(json["httpStatus"].is_null());
    }
}
