//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository exposes a trait seam plus its Postgres implementation, so
//! the orchestration core can be exercised against in-memory stores.

pub mod execution;
pub mod mapping;

#[cfg(test)]
pub mod memory;

use thiserror::Error;

// Re-export for convenience
pub use execution::{ExecutionStore, PgExecutionStore};
pub use mapping::{MappingResolver, PgMappingRepository};

/// Repository error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// The idempotency key is already bound to another execution
    #[error("an execution with idempotency key {0:?} already exists")]
    DuplicateIdempotencyKey(String),

    #[error("invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
