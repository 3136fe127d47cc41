//! Forwarding Client
//!
//! Sends a resolved job request to its downstream service and reports the
//! outcome as data: HTTP error statuses come back as ordinary responses, and
//! transport failures collapse into a network-failure response with status 0.
//!
//! 5xx responses, timeouts and connection failures are retried with
//! exponential backoff. Once retries are exhausted the last observed outcome
//! is returned.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use jobrelay_core::domain::execution::NETWORK_FAILURE_STATUS;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use tracing::{debug, warn};

use crate::config::ForwardingConfig;

/// Header carrying the client's idempotency key, never sent downstream
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Headers recomputed per connection by the HTTP client
const HOP_BY_HOP_HEADERS: &[&str] = &["host", "content-length", "connection", "transfer-encoding"];

/// A request ready to be sent to a downstream service
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Base endpoint, e.g. `http://billing:9000`
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Outcome of a forwarded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResponse {
    pub body: String,
    /// HTTP status, or 0 when no response was received
    pub status: u16,
}

impl ForwardResponse {
    pub fn network_failure(message: impl Into<String>) -> Self {
        Self {
            body: format!("Network error: {}", message.into()),
            status: NETWORK_FAILURE_STATUS as u16,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }

    pub fn is_network_failure(&self) -> bool {
        self.status == NETWORK_FAILURE_STATUS as u16
    }
}

/// Sends job requests downstream
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: &ForwardRequest) -> ForwardResponse;
}

/// reqwest-backed forwarder with timeouts and retries
#[derive(Debug, Clone)]
pub struct ForwardingClient {
    client: Client,
    connect_timeout: Duration,
    read_timeout: Duration,
    retry_max_attempts: u32,
    retry_backoff: Duration,
}

enum Attempt {
    Done(ForwardResponse),
    Retryable(ForwardResponse),
}

impl ForwardingClient {
    pub fn new(config: &ForwardingConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            client,
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
            retry_max_attempts: config.retry_max_attempts,
            retry_backoff: config.retry_backoff,
        })
    }

    async fn attempt(&self, request: &ForwardRequest) -> Attempt {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(outbound_headers(request))
            .timeout(self.read_timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => return self.classify_error(err),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => {
                let outcome = ForwardResponse { body, status };
                if outcome.is_server_error() {
                    Attempt::Retryable(outcome)
                } else {
                    Attempt::Done(outcome)
                }
            }
            Err(err) => self.classify_error(err),
        }
    }

    fn classify_error(&self, err: reqwest::Error) -> Attempt {
        if err.is_timeout() {
            let (phase, limit) = if err.is_connect() {
                ("connect", self.connect_timeout)
            } else {
                ("request", self.read_timeout)
            };
            return Attempt::Retryable(ForwardResponse::network_failure(format!(
                "{} timed out after {} ms",
                phase,
                limit.as_millis()
            )));
        }

        let failure = ForwardResponse::network_failure(describe(&err));
        if err.is_builder() {
            Attempt::Done(failure)
        } else {
            Attempt::Retryable(failure)
        }
    }

    /// Delay before retry `n` (1-based)
    fn backoff(&self, retry: u32) -> Duration {
        self.retry_backoff
            .saturating_mul(2_u32.saturating_pow(retry.saturating_sub(1)))
    }
}

#[async_trait]
impl Forwarder for ForwardingClient {
    /// Forwards with retries; `read_timeout` bounds the whole call, backoff included
    async fn forward(&self, request: &ForwardRequest) -> ForwardResponse {
        match tokio::time::timeout(self.read_timeout, self.forward_with_retries(request)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    "Giving up on {} {} after {} ms",
                    request.method,
                    request.url,
                    self.read_timeout.as_millis()
                );
                ForwardResponse::network_failure(format!(
                    "request timed out after {} ms",
                    self.read_timeout.as_millis()
                ))
            }
        }
    }
}

impl ForwardingClient {
    async fn forward_with_retries(&self, request: &ForwardRequest) -> ForwardResponse {
        let total_attempts = self.retry_max_attempts.saturating_add(1);
        let mut attempt = 1;

        loop {
            debug!(
                "Forwarding {} {} (attempt {}/{})",
                request.method, request.url, attempt, total_attempts
            );

            let outcome = match self.attempt(request).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Retryable(outcome) => outcome,
            };

            if attempt >= total_attempts {
                if outcome.is_network_failure() {
                    warn!(
                        "Giving up on {} {} after {} attempts: {}",
                        request.method, request.url, attempt, outcome.body
                    );
                } else {
                    warn!(
                        "Giving up on {} {} after {} attempts (last status {})",
                        request.method, request.url, attempt, outcome.status
                    );
                }
                return outcome;
            }

            let delay = self.backoff(attempt);
            warn!(
                "Retrying {} {} in {} ms after status {} (attempt {}/{})",
                request.method,
                request.url,
                delay.as_millis(),
                outcome.status,
                attempt + 1,
                total_attempts
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn outbound_headers(request: &ForwardRequest) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in &request.headers {
        let lower = name.to_ascii_lowercase();
        if lower == IDEMPOTENCY_KEY_HEADER || HOP_BY_HOP_HEADERS.contains(&lower.as_str()) {
            continue;
        }

        match (
            HeaderName::from_bytes(lower.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Dropping invalid header {:?}", name),
        }
    }

    if request.body.is_some() && !headers.contains_key(reqwest::header::CONTENT_TYPE) {
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
    }

    headers
}

/// Error message followed by its source chain
fn describe(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::{RawQuery, State};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode};
    use axum::routing::any;

    fn fast_config(retries: u32) -> ForwardingConfig {
        ForwardingConfig {
            connect_timeout: Duration::from_millis(500),
            read_timeout: Duration::from_millis(500),
            retry_max_attempts: retries,
            retry_backoff: Duration::from_millis(10),
        }
    }

    async fn spawn_downstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn request(url: String) -> ForwardRequest {
        ForwardRequest {
            method: Method::POST,
            url,
            headers: vec![],
            query: vec![],
            body: Some(r#"{"amount":10}"#.to_string()),
        }
    }

    /// Answers 503 for the first `failures` calls, then 200
    fn flaky(failures: usize) -> (Router, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/",
                any(move |State(calls): State<Arc<AtomicUsize>>| async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    if n < failures {
                        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
                    } else {
                        (StatusCode::OK, "done")
                    }
                }),
            )
            .with_state(Arc::clone(&calls));
        (app, calls)
    }

    #[tokio::test]
    async fn test_retries_server_errors_until_success() {
        let (app, calls) = flaky(2);
        let url = spawn_downstream(app).await;
        let client = ForwardingClient::new(&fast_config(3)).unwrap();

        let response = client.forward(&request(url)).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_returns_last_server_error_when_retries_exhausted() {
        let (app, calls) = flaky(usize::MAX);
        let url = spawn_downstream(app).await;
        let client = ForwardingClient::new(&fast_config(2)).unwrap();

        let response = client.forward(&request(url)).await;

        assert_eq!(response.status, 503);
        assert_eq!(response.body, "unavailable");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/",
                any(|State(calls): State<Arc<AtomicUsize>>| async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    (StatusCode::NOT_FOUND, "missing")
                }),
            )
            .with_state(Arc::clone(&calls));
        let url = spawn_downstream(app).await;
        let client = ForwardingClient::new(&fast_config(3)).unwrap();

        let response = client.forward(&request(url)).await;

        assert_eq!(response.status, 404);
        assert_eq!(response.body, "missing");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_becomes_network_failure() {
        let app = Router::new().route(
            "/",
            any(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let url = spawn_downstream(app).await;
        let client = ForwardingClient::new(&fast_config(0)).unwrap();

        let response = client.forward(&request(url)).await;

        assert!(response.is_network_failure());
        assert_eq!(response.body, "Network error: request timed out after 500 ms");
    }

    #[tokio::test]
    async fn test_read_timeout_bounds_all_retries() {
        let app = Router::new().route(
            "/",
            any(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let url = spawn_downstream(app).await;
        let config = ForwardingConfig {
            read_timeout: Duration::from_millis(300),
            ..fast_config(3)
        };
        let client = ForwardingClient::new(&config).unwrap();

        let started = std::time::Instant::now();
        let response = client.forward(&request(url)).await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(response.is_network_failure());
        assert_eq!(response.body, "Network error: request timed out after 300 ms");
    }

    #[tokio::test]
    async fn test_connection_refused_becomes_network_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ForwardingClient::new(&fast_config(1)).unwrap();
        let response = client.forward(&request(format!("http://{}", addr))).await;

        assert_eq!(response.status, 0);
        assert!(response.body.starts_with("Network error: "));
    }

    #[tokio::test]
    async fn test_strips_idempotency_key_and_sets_content_type() {
        let app = Router::new().route(
            "/",
            any(|headers: AxumHeaders| async move {
                let key = headers.contains_key("idempotency-key");
                let content_type = headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let trace = headers
                    .get("x-trace-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                format!("{}|{}|{}", key, content_type, trace)
            }),
        );
        let url = spawn_downstream(app).await;
        let client = ForwardingClient::new(&fast_config(0)).unwrap();

        let mut req = request(url);
        req.headers = vec![
            ("Idempotency-Key".to_string(), "order-42".to_string()),
            ("X-Trace-Id".to_string(), "abc".to_string()),
            ("Host".to_string(), "orchestrator:8080".to_string()),
        ];

        let response = client.forward(&req).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "false|application/json|abc");
    }

    #[tokio::test]
    async fn test_caller_content_type_is_kept() {
        let app = Router::new().route(
            "/",
            any(|headers: AxumHeaders| async move {
                headers
                    .get("content-type")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            }),
        );
        let url = spawn_downstream(app).await;
        let client = ForwardingClient::new(&fast_config(0)).unwrap();

        let mut req = request(url);
        req.headers = vec![("Content-Type".to_string(), "text/plain".to_string())];

        let response = client.forward(&req).await;
        assert_eq!(response.body, "text/plain");
    }

    #[tokio::test]
    async fn test_query_parameters_are_appended() {
        let app = Router::new().route(
            "/",
            any(|RawQuery(query): RawQuery| async move { query.unwrap_or_default() }),
        );
        let url = spawn_downstream(app).await;
        let client = ForwardingClient::new(&fast_config(0)).unwrap();

        let mut req = request(url);
        req.method = Method::GET;
        req.body = None;
        req.query = vec![
            ("region".to_string(), "eu west".to_string()),
            ("limit".to_string(), "5".to_string()),
        ];

        let response = client.forward(&req).await;
        assert_eq!(response.body, "region=eu+west&limit=5");
    }

    #[test]
    fn test_backoff_doubles() {
        let client = ForwardingClient::new(&ForwardingConfig {
            retry_backoff: Duration::from_millis(100),
            ..ForwardingConfig::default()
        })
        .unwrap();

        assert_eq!(client.backoff(1), Duration::from_millis(100));
        assert_eq!(client.backoff(2), Duration::from_millis(200));
        assert_eq!(client.backoff(3), Duration::from_millis(400));
    }
}
