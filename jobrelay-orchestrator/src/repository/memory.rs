//! In-memory repositories for service tests
//!
//! Mirror the Postgres semantics that the orchestration core relies on:
//! unique idempotency keys and the terminal-record guard on `save`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use jobrelay_core::domain::execution::{ExecutionStatus, JobExecution};
use jobrelay_core::domain::mapping::JobMapping;
use uuid::Uuid;

use super::{ExecutionStore, MappingResolver, StoreError};

#[derive(Default)]
pub struct MemoryExecutionStore {
    records: Mutex<HashMap<Uuid, JobExecution>>,
    rejected_status: Mutex<Option<ExecutionStatus>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.records.lock().unwrap().keys().copied().collect()
    }

    /// Seeds a record as-is, bypassing every check
    pub fn insert(&self, execution: JobExecution) {
        self.records
            .lock()
            .unwrap()
            .insert(execution.id, execution);
    }

    /// Makes every later `save` of a record in `status` fail
    pub fn reject_saves_with(&self, status: ExecutionStatus) {
        *self.rejected_status.lock().unwrap() = Some(status);
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn create(&self, execution: &JobExecution) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();

        if let Some(key) = &execution.idempotency_key {
            if records
                .values()
                .any(|r| r.idempotency_key.as_ref() == Some(key))
            {
                return Err(StoreError::DuplicateIdempotencyKey(key.clone()));
            }
        }

        if records.contains_key(&execution.id) {
            return Err(StoreError::InvalidRecord(format!(
                "execution {} already exists",
                execution.id
            )));
        }

        records.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<JobExecution>, StoreError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<JobExecution>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn save(&self, execution: &JobExecution) -> Result<bool, StoreError> {
        if *self.rejected_status.lock().unwrap() == Some(execution.status) {
            return Err(StoreError::InvalidRecord(format!(
                "injected failure saving {} record",
                execution.status
            )));
        }

        let mut records = self.records.lock().unwrap();
        let mut updated = execution.clone();

        if let Some(existing) = records.get(&execution.id) {
            if existing.is_terminal() {
                return Ok(false);
            }
            updated.idempotency_key = existing.idempotency_key.clone();
            updated.started_at = existing.started_at;
        }

        records.insert(updated.id, updated);
        Ok(true)
    }
}

/// Fixed set of job mappings
#[derive(Default)]
pub struct StaticResolver {
    mappings: HashMap<String, JobMapping>,
}

impl StaticResolver {
    pub fn with_mapping(mut self, job_name: &str, url: &str, port: u16) -> Self {
        self.mappings.insert(
            job_name.to_string(),
            JobMapping {
                job_name: job_name.to_string(),
                service_name: format!("{job_name}-service"),
                url: url.to_string(),
                port,
                http_method: None,
            },
        );
        self
    }
}

#[async_trait]
impl MappingResolver for StaticResolver {
    async fn resolve(&self, job_name: &str) -> Result<Option<JobMapping>, StoreError> {
        Ok(self.mappings.get(job_name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persisted_record_round_trips() {
        let store = MemoryExecutionStore::new();
        let mut execution = JobExecution::started(Uuid::new_v4(), Some("k".to_string()));
        store.create(&execution).await.unwrap();

        execution.mark_in_progress().unwrap();
        execution.finish("body".to_string(), 201).unwrap();
        assert!(store.save(&execution).await.unwrap());

        let reloaded = store.find_by_id(execution.id).await.unwrap().unwrap();
        assert_eq!(reloaded, execution);
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_is_rejected() {
        let store = MemoryExecutionStore::new();
        let key = Some("dup".to_string());
        store
            .create(&JobExecution::started(Uuid::new_v4(), key.clone()))
            .await
            .unwrap();

        let err = store
            .create(&JobExecution::started(Uuid::new_v4(), key))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateIdempotencyKey(k) if k == "dup"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_save_never_overwrites_terminal_record() {
        let store = MemoryExecutionStore::new();
        let mut execution = JobExecution::started(Uuid::new_v4(), None);
        store.create(&execution).await.unwrap();

        let mut cancelled = execution.clone();
        cancelled.cancel().unwrap();
        assert!(store.save(&cancelled).await.unwrap());

        execution.mark_in_progress().unwrap();
        assert!(!store.save(&execution).await.unwrap());

        let stored = store.find_by_id(execution.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
    }
}
