//! Configuration module

use std::time::Duration;

/// Delay between status polls while waiting on an execution
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the orchestrator service
    pub orchestrator_url: String,
}
