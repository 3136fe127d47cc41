//! Job mapping domain types

use serde::{Deserialize, Serialize};

/// Routing rule from a logical job name to a downstream HTTP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMapping {
    pub job_name: String,
    pub service_name: String,
    /// Base URL of the service, e.g. `http://billing`
    pub url: String,
    pub port: u16,
    /// Informational only; the caller's method is always forwarded as-is
    #[serde(default)]
    pub http_method: Option<String>,
}

impl JobMapping {
    /// Full endpoint URL in the form `url:port`
    pub fn endpoint_url(&self) -> String {
        format!("{}:{}", self.url.trim_end_matches('/'), self.port)
    }
}
