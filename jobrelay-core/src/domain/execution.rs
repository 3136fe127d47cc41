//! Job execution domain types
//!
//! A `JobExecution` is one dispatch attempt of a job. Its status only ever
//! moves forward:
//!
//! ```text
//! STARTED ──► IN_PROGRESS ──► SUCCESS | FAILED | CANCELLED
//!    │                              ▲
//!    └──────────► FAILED | CANCELLED┘
//! ```
//!
//! Once terminal, a record is never mutated again.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Response text stored when an execution is cancelled
pub const CANCELLED_MESSAGE: &str = "Job execution was cancelled";

/// HTTP status recorded when the downstream could not be reached at all
pub const NETWORK_FAILURE_STATUS: i32 = 0;

/// Current time at the precision Postgres `TIMESTAMPTZ` stores (microseconds)
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Job execution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub status: ExecutionStatus,
    pub idempotency_key: Option<String>,
    pub response: Option<String>,
    pub http_status: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Started,
    InProgress,
    Success,
    Failed,
    Cancelled,
}

/// Attempted a status change the state machine does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition from {from} to {to}")]
pub struct TransitionError {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

/// Unknown status string read from storage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown execution status: {0}")]
pub struct ParseStatusError(pub String);

impl ExecutionStatus {
    pub const TERMINAL: [ExecutionStatus; 3] = [
        ExecutionStatus::Success,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
    ];

    /// SUCCESS, FAILED and CANCELLED accept no further transitions
    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;

        matches!(
            (self, next),
            (Started, InProgress)
                | (Started, Failed)
                | (Started, Cancelled)
                | (InProgress, Success)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Started => "STARTED",
            ExecutionStatus::InProgress => "IN_PROGRESS",
            ExecutionStatus::Success => "SUCCESS",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(ExecutionStatus::Started),
            "IN_PROGRESS" => Ok(ExecutionStatus::InProgress),
            "SUCCESS" => Ok(ExecutionStatus::Success),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "CANCELLED" => Ok(ExecutionStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl JobExecution {
    /// A freshly admitted execution
    pub fn started(id: Uuid, idempotency_key: Option<String>) -> Self {
        Self {
            id,
            status: ExecutionStatus::Started,
            idempotency_key,
            response: None,
            http_status: None,
            started_at: timestamp_now(),
            ended_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn mark_in_progress(&mut self) -> Result<(), TransitionError> {
        self.transition(ExecutionStatus::InProgress)
    }

    /// Record the downstream result: 2xx is SUCCESS, anything else FAILED
    pub fn finish(&mut self, response: String, http_status: i32) -> Result<(), TransitionError> {
        let next = if (200..300).contains(&http_status) {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failed
        };

        self.transition(next)?;
        self.response = Some(response);
        self.http_status = Some(http_status);
        self.ended_at = Some(timestamp_now());
        Ok(())
    }

    /// Force FAILED with a diagnostic and no downstream status
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(ExecutionStatus::Failed)?;
        self.response = Some(message.into());
        self.http_status = Some(NETWORK_FAILURE_STATUS);
        self.ended_at = Some(timestamp_now());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(ExecutionStatus::Cancelled)?;
        self.response = Some(CANCELLED_MESSAGE.to_string());
        self.ended_at = Some(timestamp_now());
        Ok(())
    }

    fn transition(&mut self, next: ExecutionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
