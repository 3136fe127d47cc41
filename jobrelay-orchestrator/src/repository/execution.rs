//! Execution Repository
//!
//! Persistence of job executions. Every write after creation goes through
//! `save`, which refuses to touch a record that is already terminal.

use async_trait::async_trait;
use jobrelay_core::domain::execution::{ExecutionStatus, JobExecution};
use sqlx::PgPool;
use uuid::Uuid;

use super::StoreError;

const IDEMPOTENCY_KEY_CONSTRAINT: &str = "job_executions_idempotency_key_key";

/// Durable store of job executions
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts a new execution
    ///
    /// Fails with `StoreError::DuplicateIdempotencyKey` when another record
    /// already carries the same idempotency key.
    async fn create(&self, execution: &JobExecution) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>, StoreError>;

    async fn find_by_idempotency_key(&self, key: &str)
    -> Result<Option<JobExecution>, StoreError>;

    /// Upserts an execution by id
    ///
    /// Returns `false` without writing when the stored record is already
    /// terminal.
    async fn save(&self, execution: &JobExecution) -> Result<bool, StoreError>;
}

/// Postgres implementation of `ExecutionStore`
#[derive(Clone)]
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn create(&self, execution: &JobExecution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO job_executions
                (id, status, idempotency_key, response, http_status, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.as_str())
        .bind(&execution.idempotency_key)
        .bind(&execution.response)
        .bind(execution.http_status)
        .bind(execution.started_at)
        .bind(execution.ended_at)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if let (sqlx::Error::Database(db), Some(key)) = (&err, &execution.idempotency_key) {
                if db.is_unique_violation() && db.constraint() == Some(IDEMPOTENCY_KEY_CONSTRAINT) {
                    return StoreError::DuplicateIdempotencyKey(key.clone());
                }
            }
            StoreError::Database(err)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, status, idempotency_key, response, http_status, started_at, ended_at
            FROM job_executions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobExecution::try_from).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<JobExecution>, StoreError> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT id, status, idempotency_key, response, http_status, started_at, ended_at
            FROM job_executions
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(JobExecution::try_from).transpose()
    }

    async fn save(&self, execution: &JobExecution) -> Result<bool, StoreError> {
        // idempotency_key and started_at are immutable once inserted
        let result = sqlx::query(
            r#"
            INSERT INTO job_executions
                (id, status, idempotency_key, response, http_status, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                response = EXCLUDED.response,
                http_status = EXCLUDED.http_status,
                ended_at = EXCLUDED.ended_at
            WHERE job_executions.status NOT IN ($8, $9, $10)
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.as_str())
        .bind(&execution.idempotency_key)
        .bind(&execution.response)
        .bind(execution.http_status)
        .bind(execution.started_at)
        .bind(execution.ended_at)
        .bind(ExecutionStatus::Success.as_str())
        .bind(ExecutionStatus::Failed.as_str())
        .bind(ExecutionStatus::Cancelled.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    status: String,
    idempotency_key: Option<String>,
    response: Option<String>,
    http_status: Option<i32>,
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<ExecutionRow> for JobExecution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::InvalidRecord(format!("execution {}: {}", row.id, e)))?;

        Ok(JobExecution {
            id: row.id,
            status,
            idempotency_key: row.idempotency_key,
            response: row.response,
            http_status: row.http_status,
            started_at: row.started_at,
            ended_at: row.ended_at,
        })
    }
}
