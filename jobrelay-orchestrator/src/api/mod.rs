//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific concern.

pub mod error;
pub mod health;
pub mod job;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::service::Orchestrator;

/// Create the main API router with all endpoints
pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Submission, any forwarded method
        .route(
            "/job/create/{job_name}",
            get(job::create_job)
                .post(job::create_job)
                .put(job::create_job)
                .patch(job::create_job)
                .delete(job::create_job),
        )
        .route(
            "/job/create/",
            get(job::create_job_without_name)
                .post(job::create_job_without_name)
                .put(job::create_job_without_name)
                .patch(job::create_job_without_name)
                .delete(job::create_job_without_name),
        )
        // Execution endpoints
        .route("/job/{uuid}", get(job::get_job))
        .route("/job/cancel/{uuid}", post(job::cancel_job))
        // Add state and middleware
        .with_state(orchestrator)
        .layer(TraceLayer::new_for_http())
}
