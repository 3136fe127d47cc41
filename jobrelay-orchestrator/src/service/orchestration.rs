//! Orchestration Service
//!
//! Admits job requests, dispatches them to the worker pool and drives each
//! execution through its status machine.
//!
//! Every write goes through [`ExecutionStore::save`], which refuses to touch a
//! terminal record. The dispatch task and a concurrent cancel therefore race
//! benignly: whichever reaches a terminal state first wins and the other
//! becomes a no-op.

use std::sync::Arc;

use jobrelay_core::domain::execution::{ExecutionStatus, JobExecution, TransitionError};
use reqwest::Method;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::{ExecutionStore, MappingResolver, StoreError};
use crate::service::forwarding::{ForwardRequest, Forwarder};
use crate::service::pool::{PoolError, WorkerPool};
use crate::service::registry::ExecutionRegistry;

/// Longest accepted job name or idempotency key
pub const MAX_FIELD_LENGTH: usize = 255;

/// Orchestration error type
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("{0}")]
    Validation(String),

    #[error("no job mapping found for job '{0}'")]
    MappingNotFound(String),

    #[error("job execution {0} not found")]
    JobNotFound(Uuid),

    #[error("execution rejected: {0}")]
    Rejected(#[from] PoolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{0}")]
    Internal(String),
}

/// A job submission as received at the boundary
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub job_name: String,
    pub idempotency_key: String,
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

impl JobRequest {
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        validate_field("Job name", &self.job_name)?;
        validate_field("Idempotency key", &self.idempotency_key)
    }
}

fn validate_field(label: &str, value: &str) -> Result<(), OrchestrationError> {
    if value.trim().is_empty() {
        return Err(OrchestrationError::Validation(format!(
            "{} is required",
            label
        )));
    }
    if value.chars().count() > MAX_FIELD_LENGTH {
        return Err(OrchestrationError::Validation(format!(
            "{} must be at most {} characters",
            label, MAX_FIELD_LENGTH
        )));
    }
    Ok(())
}

/// Result of a successful admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A new execution was created and dispatched
    Created(Uuid),
    /// The idempotency key was already bound to this execution
    Replayed(Uuid),
}

impl Admission {
    pub fn id(self) -> Uuid {
        match self {
            Admission::Created(id) | Admission::Replayed(id) => id,
        }
    }

    pub fn is_replay(self) -> bool {
        matches!(self, Admission::Replayed(_))
    }
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The execution had already finished; nothing was changed
    AlreadyTerminal(ExecutionStatus),
}

pub struct Orchestrator {
    store: Arc<dyn ExecutionStore>,
    resolver: Arc<dyn MappingResolver>,
    forwarder: Arc<dyn Forwarder>,
    registry: Arc<ExecutionRegistry>,
    pool: WorkerPool,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ExecutionStore>,
        resolver: Arc<dyn MappingResolver>,
        forwarder: Arc<dyn Forwarder>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            store,
            resolver,
            forwarder,
            registry: Arc::new(ExecutionRegistry::new()),
            pool,
        }
    }

    /// Number of executions currently holding a cancellation handle
    pub fn active_executions(&self) -> usize {
        self.registry.len()
    }

    /// Admit a job request and dispatch it without waiting for the downstream call
    pub async fn create_and_dispatch(
        &self,
        request: JobRequest,
    ) -> Result<Admission, OrchestrationError> {
        request.validate()?;

        if let Some(existing) = self
            .store
            .find_by_idempotency_key(&request.idempotency_key)
            .await?
        {
            tracing::info!(
                "Replaying execution {} for idempotency key {}",
                existing.id,
                request.idempotency_key
            );
            return Ok(Admission::Replayed(existing.id));
        }

        let mapping = self
            .resolver
            .resolve(&request.job_name)
            .await?
            .ok_or_else(|| OrchestrationError::MappingNotFound(request.job_name.clone()))?;

        let id = Uuid::new_v4();
        let execution = JobExecution::started(id, Some(request.idempotency_key.clone()));

        match self.store.create(&execution).await {
            Ok(()) => {}
            Err(StoreError::DuplicateIdempotencyKey(key)) => {
                // Lost a race against a concurrent submission with the same key
                let existing = self
                    .store
                    .find_by_idempotency_key(&key)
                    .await?
                    .ok_or_else(|| {
                        OrchestrationError::Internal(format!(
                            "idempotency key {} conflicted but no execution holds it",
                            key
                        ))
                    })?;
                tracing::info!(
                    "Concurrent submission for idempotency key {} resolved to execution {}",
                    key,
                    existing.id
                );
                return Ok(Admission::Replayed(existing.id));
            }
            Err(err) => return Err(err.into()),
        }

        let url = mapping.endpoint_url();
        let task = ExecutionTask {
            store: Arc::clone(&self.store),
            forwarder: Arc::clone(&self.forwarder),
            registry: Arc::clone(&self.registry),
            id,
            token: self.registry.register(id),
            request: ForwardRequest {
                method: request.method,
                url: url.clone(),
                headers: request.headers,
                query: request.query,
                body: request.body,
            },
        };

        if let Err(err) = self.pool.submit(task.run()) {
            self.registry.remove(id);
            tracing::warn!("Rejecting execution {}: {}", id, err);

            let mut rejected = execution;
            rejected.fail(format!("Execution rejected: {}", err))?;
            self.store.save(&rejected).await?;
            return Err(err.into());
        }

        tracing::info!(
            "Execution {} dispatched for job {} to {} ({})",
            id,
            mapping.job_name,
            mapping.service_name,
            url
        );

        Ok(Admission::Created(id))
    }

    /// Current state of an execution
    pub async fn get_status(&self, id: Uuid) -> Result<JobExecution, OrchestrationError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(OrchestrationError::JobNotFound(id))
    }

    /// Cancel an execution; finished executions are left untouched
    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome, OrchestrationError> {
        let mut execution = self.get_status(id).await?;

        if execution.is_terminal() {
            tracing::debug!(
                "Cancel of execution {} ignored, already {}",
                id,
                execution.status
            );
            return Ok(CancelOutcome::AlreadyTerminal(execution.status));
        }

        execution.cancel()?;
        let saved = self.store.save(&execution).await;

        // Signal even when the write failed so the task records the cancellation itself
        if self.registry.cancel(id) {
            tracing::debug!("Signalled cancellation to execution {}", id);
        }

        let outcome = if saved? {
            tracing::info!("Execution {} cancelled", id);
            CancelOutcome::Cancelled
        } else {
            // The task reached a terminal state between our read and write
            let current = self.get_status(id).await?;
            CancelOutcome::AlreadyTerminal(current.status)
        };

        self.registry.remove(id);
        Ok(outcome)
    }
}

/// Work item submitted to the pool for one execution
struct ExecutionTask {
    store: Arc<dyn ExecutionStore>,
    forwarder: Arc<dyn Forwarder>,
    registry: Arc<ExecutionRegistry>,
    id: Uuid,
    token: CancellationToken,
    request: ForwardRequest,
}

impl ExecutionTask {
    async fn run(self) {
        let id = self.id;
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);

        let failure = match tokio::spawn(self.execute()).await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(join_err) => Some(join_err.to_string()),
        };

        if let Some(reason) = failure {
            tracing::error!("Execution {} failed unexpectedly: {}", id, reason);
            if let Err(err) = force_failed(store.as_ref(), id, &reason).await {
                tracing::error!("Could not record failure of execution {}: {}", id, err);
            }
        }

        registry.remove(id);
    }

    async fn execute(self) -> Result<(), OrchestrationError> {
        let mut execution = self.reload().await?;
        if execution.is_terminal() {
            tracing::debug!(
                "Execution {} is already {}, skipping dispatch",
                self.id,
                execution.status
            );
            return Ok(());
        }

        execution.mark_in_progress()?;
        if !self.store.save(&execution).await? {
            return Ok(());
        }

        let response = tokio::select! {
            biased;
            _ = self.token.cancelled() => {
                tracing::info!("Execution {} cancelled while forwarding", self.id);
                return self.settle_cancelled().await;
            }
            response = self.forwarder.forward(&self.request) => response,
        };

        let mut execution = self.reload().await?;
        if execution.is_terminal() {
            tracing::info!(
                "Discarding downstream result for execution {}, already {}",
                self.id,
                execution.status
            );
            return Ok(());
        }

        let succeeded = response.is_success();
        execution.finish(response.body, i32::from(response.status))?;
        if !self.store.save(&execution).await? {
            tracing::info!(
                "Discarding downstream result for execution {}, finished concurrently",
                self.id
            );
        } else if succeeded {
            tracing::info!("Execution {} finished as {}", self.id, execution.status);
        } else {
            tracing::warn!(
                "Execution {} finished as {} (HTTP {})",
                self.id,
                execution.status,
                execution.http_status.unwrap_or_default()
            );
        }

        Ok(())
    }

    /// Records the cancellation if the cancelling caller could not persist it
    async fn settle_cancelled(&self) -> Result<(), OrchestrationError> {
        let mut execution = self.reload().await?;
        if execution.is_terminal() {
            return Ok(());
        }

        execution.cancel()?;
        if self.store.save(&execution).await? {
            tracing::info!("Execution {} cancelled by its task", self.id);
        }
        Ok(())
    }

    async fn reload(&self) -> Result<JobExecution, OrchestrationError> {
        self.store
            .find_by_id(self.id)
            .await?
            .ok_or(OrchestrationError::JobNotFound(self.id))
    }
}

async fn force_failed(
    store: &dyn ExecutionStore,
    id: Uuid,
    reason: &str,
) -> Result<(), OrchestrationError> {
    let Some(mut execution) = store.find_by_id(id).await? else {
        return Ok(());
    };
    if execution.is_terminal() {
        return Ok(());
    }

    execution.fail(format!("Execution error: {}", reason))?;
    store.save(&execution).await?;
    Ok(())
}
