//! Health Check API Handler

use std::sync::Arc;

use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::service::Orchestrator;

/// GET /health
/// Liveness plus the number of executions still holding a cancellation handle
pub async fn health_check(State(orchestrator): State<Arc<Orchestrator>>) -> Json<Value> {
    Json(json!({
        "status": "UP",
        "activeExecutions": orchestrator.active_executions(),
    }))
}
