//! Resilient HTTP client with an attempt loop built in.
//!
//! Wraps a pooled `reqwest` client so every call gets the same treatment:
//! escalating per-attempt timeouts from the backoff policy, automatic
//! retries for transient transport failures and rate limiting, and a
//! structured log line per attempt for operational diagnosis.

use std::{collections::HashMap, sync::Arc, time::Duration};

use koppel_core::{Clock, RealClock};
use reqwest::{header::HeaderMap, Method, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::{
    backoff::BackoffPolicy,
    error::{Result, SyncError},
    DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECONDS,
};

/// Configuration for the resilient API client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Timeout for the first attempt; later attempts escalate from here.
    pub base_timeout: Duration,
    /// Retries allowed after the initial attempt.
    pub max_retries: u32,
    /// User agent string for requests.
    pub user_agent: String,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
    /// Backoff policy for timeout escalation and inter-attempt waits.
    pub backoff: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            max_retries: DEFAULT_MAX_RETRIES,
            user_agent: "Koppel-Sync/1.0".to_string(),
            verify_tls: true,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Request body variants the bridge sends.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// URL-encoded form fields, as the membership platform expects.
    Form(Vec<(String, String)>),
    /// JSON document, as the CRM expects.
    Json(serde_json::Value),
}

/// One logical API request, executed with retries.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Additional request headers.
    pub headers: HashMap<String, String>,
    /// Request body.
    pub body: RequestBody,
}

impl RequestOptions {
    /// Creates a bodyless request.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self { method, url: url.into(), headers: HashMap::new(), body: RequestBody::Empty }
    }

    /// Adds a request header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    /// Sets a URL-encoded form body.
    #[must_use]
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = RequestBody::Form(fields);
        self
    }
}

/// Response from a completed execute call.
///
/// Carries non-success statuses too. The attempt loop only consumes 429
/// responses it intends to retry; everything else is the caller's to
/// interpret.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body, decoded as text.
    pub body: String,
    /// Total time spent in the execute call, waits included.
    pub duration: Duration,
    /// Number of attempts made, including the one that produced this.
    pub attempts: u32,
}

impl ApiResponse {
    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidResponse`] when the body is not valid
    /// JSON for the target type.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .map_err(|e| SyncError::invalid_response(format!("failed to decode JSON body: {e}")))
    }
}

/// HTTP client that retries transient failures with exponential backoff.
///
/// A single instance holds one `reqwest` client, so its connection pool is
/// reused across attempts and across calls. The clock is injectable: tests
/// drive the inter-attempt waits with virtual time.
#[derive(Debug, Clone)]
pub struct ResilientClient {
    client: reqwest::Client,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
}

impl ResilientClient {
    /// Creates a client with the given configuration and clock.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] when `base_timeout` is zero or
    /// the underlying HTTP client cannot be built.
    pub fn new(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.base_timeout.is_zero() {
            return Err(SyncError::configuration("base timeout must be positive"));
        }

        // No client-level timeout: each attempt sets its own escalated one.
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| SyncError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config, clock })
    }

    /// Creates a client with default configuration and the real clock.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the HTTP client cannot be
    /// built.
    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default(), Arc::new(RealClock::new()))
    }

    /// Executes a request, retrying transient failures.
    ///
    /// Timeouts and connection-level errors are retried up to
    /// `max_retries` times with escalating timeouts; exhaustion surfaces as
    /// [`SyncError::RetriesExhausted`]. A 429 is retried the same way,
    /// honoring a valid `Retry-After` header as the wait, but exhaustion
    /// returns the final 429 response instead of an error. Any other status
    /// returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RetriesExhausted`] when every attempt failed
    /// with a transient error, or the mapped transport error when a failure
    /// is not retryable.
    pub async fn execute(&self, request: RequestOptions) -> Result<ApiResponse> {
        let span = info_span!("api_request", method = %request.method, url = %request.url);

        async move {
            let started = self.clock.now();
            let mut attempt: u32 = 0;

            loop {
                let timeout = self.config.backoff.compute_timeout(self.config.base_timeout, attempt);
                tracing::debug!(attempt, timeout_ms = timeout.as_millis(), "issuing attempt");

                match self.attempt_once(&request, timeout).await {
                    Ok(response) => {
                        let status = response.status().as_u16();

                        if status == 429 && attempt < self.config.max_retries {
                            let headers = extract_headers(response.headers());
                            let wait = extract_retry_after_seconds(&headers)
                                .map(Duration::from_secs)
                                .unwrap_or_else(|| {
                                    self.config
                                        .backoff
                                        .compute_timeout(self.config.base_timeout, attempt + 1)
                                });

                            tracing::warn!(
                                attempt,
                                timeout_ms = timeout.as_millis(),
                                wait_ms = wait.as_millis(),
                                "rate limited, waiting before next attempt"
                            );

                            self.clock.sleep(wait).await;
                            attempt += 1;
                            continue;
                        }

                        let duration = self.clock.now().duration_since(started);
                        let api_response = read_response(response, duration, attempt + 1).await;

                        if api_response.is_success() {
                            tracing::debug!(
                                attempt,
                                status,
                                duration_ms = duration.as_millis(),
                                "request succeeded"
                            );
                        } else {
                            tracing::warn!(
                                attempt,
                                status,
                                duration_ms = duration.as_millis(),
                                "non-success response returned to caller"
                            );
                        }

                        return Ok(api_response);
                    },
                    Err(e) if e.is_retryable() => {
                        if attempt >= self.config.max_retries {
                            tracing::warn!(
                                attempt,
                                timeout_ms = timeout.as_millis(),
                                error = %e,
                                "retries exhausted"
                            );
                            return Err(SyncError::retries_exhausted(attempt + 1, e.to_string()));
                        }

                        let wait = self
                            .config
                            .backoff
                            .compute_timeout(self.config.base_timeout, attempt + 1);

                        tracing::warn!(
                            attempt,
                            timeout_ms = timeout.as_millis(),
                            wait_ms = wait.as_millis(),
                            error = %e,
                            "transient failure, retrying"
                        );

                        self.clock.sleep(wait).await;
                        attempt += 1;
                    },
                    Err(e) => return Err(e),
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Issues a single attempt with the given timeout.
    async fn attempt_once(&self, request: &RequestOptions, timeout: Duration) -> Result<Response> {
        let mut builder =
            self.client.request(request.method.clone(), &request.url).timeout(timeout);

        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Form(fields) => builder.form(fields),
            RequestBody::Json(value) => builder.json(value),
        };

        builder.send().await.map_err(|e| map_send_error(&e, timeout))
    }
}

/// Maps a reqwest send failure to a sync error.
///
/// Timeouts and connection failures are the retryable transport errors.
/// Mid-stream resets also land in the network bucket; they fail the same
/// way a refused connection does from the caller's perspective.
fn map_send_error(error: &reqwest::Error, timeout: Duration) -> SyncError {
    if error.is_timeout() {
        SyncError::timeout(timeout.as_secs())
    } else if error.is_connect() {
        SyncError::network(format!("connection failed: {error}"))
    } else if error.is_builder() {
        SyncError::configuration(format!("invalid request: {error}"))
    } else {
        SyncError::network(error.to_string())
    }
}

/// Reads status, headers, and body out of a response.
async fn read_response(response: Response, duration: Duration, attempts: u32) -> ApiResponse {
    let status_code = response.status().as_u16();
    let headers = extract_headers(response.headers());

    let body = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("failed to read response body: {e}");
            format!("[failed to read response body: {e}]")
        },
    };

    ApiResponse { status_code, headers, body, duration, attempts }
}

/// Clips a response body for inclusion in error messages.
pub(crate) fn body_snippet(body: &str) -> String {
    const MAX_SNIPPET_LEN: usize = 200;

    if body.len() <= MAX_SNIPPET_LEN {
        return body.to_string();
    }

    let mut end = MAX_SNIPPET_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Extracts headers from a reqwest HeaderMap into a standard HashMap.
fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for (key, value) in header_map {
        if let Ok(value_str) = value.to_str() {
            headers.insert(key.to_string(), value_str.to_string());
        }
    }

    headers
}

/// Extracts a retry-after delay from response headers.
///
/// Supports both the seconds format and the HTTP-date format. Returns
/// `None` when the header is absent or malformed, in which case callers
/// fall back to the computed backoff wait.
pub fn extract_retry_after_seconds<S: std::hash::BuildHasher>(
    headers: &HashMap<String, String, S>,
) -> Option<u64> {
    let value = headers.get("retry-after").or_else(|| headers.get("Retry-After"))?;

    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(seconds);
    }

    if let Ok(date_time) = chrono::DateTime::parse_from_rfc2822(value) {
        let delay = date_time.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return Some(u64::try_from(delay.num_seconds().max(0)).unwrap_or(0));
    }

    None
}

#[cfg(test)]
mod tests {
    use koppel_core::TestClock;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_client(clock: TestClock) -> ResilientClient {
        let config = ClientConfig { base_timeout: Duration::from_secs(5), ..Default::default() };
        ResilientClient::new(config, Arc::new(clock)).unwrap()
    }

    #[tokio::test]
    async fn successful_request_uses_one_attempt() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .and(matchers::path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(TestClock::new());
        let request = RequestOptions::new(Method::GET, format!("{}/ping", mock_server.uri()));

        let response = client.execute(request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "pong");
        assert_eq!(response.attempts, 1);
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn server_error_returns_immediately() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let clock = TestClock::new();
        let client = test_client(clock.clone());
        let request = RequestOptions::new(Method::POST, mock_server.uri());

        let response = client.execute(request).await.unwrap();
        assert_eq!(response.status_code, 500);
        assert_eq!(response.attempts, 1);
        assert!(!response.is_success());
        // No backoff wait happened.
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn rate_limit_honors_retry_after_then_succeeds() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("GET"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string("slow down")
                    .append_header("Retry-After", "7"),
            )
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(matchers::method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&mock_server)
            .await;

        let clock = TestClock::new();
        let client = test_client(clock.clone());
        let request = RequestOptions::new(Method::GET, mock_server.uri());

        let response = client.execute(request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.attempts, 2);
        // The advertised wait was taken verbatim, not the computed backoff.
        assert_eq!(clock.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn form_body_is_url_encoded() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::body_string_contains("p_input_xml_doc=%3CcustRequest%3E"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = test_client(TestClock::new());
        let request = RequestOptions::new(Method::POST, mock_server.uri())
            .form(vec![("p_input_xml_doc".to_string(), "<custRequest>".to_string())]);

        let response = client.execute(request).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn zero_base_timeout_is_rejected() {
        let config = ClientConfig { base_timeout: Duration::ZERO, ..Default::default() };
        let result = ResilientClient::new(config, Arc::new(TestClock::new()));

        assert!(matches!(result, Err(SyncError::Configuration { .. })));
    }

    #[test]
    fn json_decoding_reports_invalid_bodies() {
        let response = ApiResponse {
            status_code: 200,
            headers: HashMap::new(),
            body: "not json".to_string(),
            duration: Duration::from_millis(5),
            attempts: 1,
        };

        let result: Result<serde_json::Value> = response.json();
        assert!(matches!(result, Err(SyncError::InvalidResponse { .. })));
    }

    #[test]
    fn retry_after_parsing() {
        let mut headers = HashMap::new();

        // Seconds format.
        headers.insert("retry-after".to_string(), "120".to_string());
        assert_eq!(extract_retry_after_seconds(&headers), Some(120));

        // Missing header.
        headers.clear();
        assert_eq!(extract_retry_after_seconds(&headers), None);

        // Malformed values are ignored rather than defaulted.
        headers.insert("retry-after".to_string(), "soonish".to_string());
        assert_eq!(extract_retry_after_seconds(&headers), None);
        headers.insert("retry-after".to_string(), "-5".to_string());
        assert_eq!(extract_retry_after_seconds(&headers), None);

        // HTTP-date format in the future yields the remaining delay.
        let future = chrono::Utc::now() + chrono::Duration::seconds(90);
        headers.insert("retry-after".to_string(), future.to_rfc2822());
        let parsed = extract_retry_after_seconds(&headers).unwrap();
        assert!((85..=90).contains(&parsed), "unexpected delay {parsed}");

        // HTTP-date in the past means no wait, not a malformed header.
        let past = chrono::Utc::now() - chrono::Duration::seconds(90);
        headers.insert("retry-after".to_string(), past.to_rfc2822());
        assert_eq!(extract_retry_after_seconds(&headers), Some(0));
    }
}
