//! Service Module
//!
//! Business logic layer for the orchestrator.
//! The orchestration core drives executions; the registry, worker pool and
//! forwarding client are the pieces it coordinates.

pub mod forwarding;
pub mod orchestration;
pub mod pool;
pub mod registry;

// Re-export for convenience
pub use forwarding::{ForwardRequest, ForwardResponse, Forwarder, ForwardingClient};
pub use orchestration::{CancelOutcome, JobRequest, OrchestrationError, Orchestrator};
pub use pool::{PoolError, WorkerPool};
