use bytes::Bytes;
use rand::Rng;
use reqwest::{header::CONTENT_TYPE, Client, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::circuit_breaker::CircuitBreaker;
use super::error::{body_excerpt, UpstreamError};
use super::registry::UpstreamRegistry;
use crate::infrastructure::config::{RetryConfig, TimeoutConfig};

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
}

/// One logical upstream call, replayable on every attempt and every upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl UpstreamRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Json(body),
        }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }
}

#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub upstream: String,
    pub index: usize,
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub attempts: u32,
    pub latency: Duration,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn detail(&self) -> String {
        body_excerpt(&self.body, self.content_type.as_deref())
    }
}

/// Which timeout profile and attempt budget a call runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallProfile {
    /// Full retry budget and the long read timeout
    Synthesis,
    /// Single short-timeout attempt whose outcome is not recorded
    Probe,
    /// Single short-timeout attempt
    Discovery,
}

impl CallProfile {
    fn max_attempts(&self, retry: &RetryConfig) -> u32 {
        match self {
            CallProfile::Synthesis => retry.max_attempts.max(1),
            CallProfile::Probe | CallProfile::Discovery => 1,
        }
    }

    /// Probes only observe: they never move the breaker or the active pointer.
    fn records_outcomes(&self) -> bool {
        !matches!(self, CallProfile::Probe)
    }
}

/// 5xx is transient except 501, which means the endpoint or format is
/// simply not implemented there.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED
}

/// Exponential backoff with up to one base step of random jitter, capped.
pub fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let exponential = retry.base_backoff.saturating_mul(2u32.saturating_pow(exponent));
    let jitter_ceiling = retry.base_backoff.as_millis() as u64;
    let jitter = if jitter_ceiling > 0 {
        rand::thread_rng().gen_range(0..=jitter_ceiling)
    } else {
        0
    };
    (exponential + Duration::from_millis(jitter)).min(retry.max_backoff)
}

/// Issues a request against one upstream, retrying transport errors and 5xx.
///
/// Every attempt passes the breaker gate first. Outside of probes, each
/// retryable failure is recorded on the breaker and the upstream's metrics,
/// and every 2xx records a success on both and makes this upstream the
/// active one. 4xx and 501 end the loop immediately and are returned as-is.
pub struct RetryingExecutor {
    synthesis_client: Client,
    probe_client: Client,
    registry: Arc<UpstreamRegistry>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
}

impl RetryingExecutor {
    pub fn new(
        timeouts: &TimeoutConfig,
        retry: RetryConfig,
        registry: Arc<UpstreamRegistry>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, reqwest::Error> {
        let synthesis_client = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.read + timeouts.write)
            .pool_idle_timeout(timeouts.pool_idle)
            .pool_max_idle_per_host(timeouts.pool_max_idle_per_host)
            .build()?;

        let probe_client = Client::builder()
            .connect_timeout(timeouts.connect.min(timeouts.probe))
            .timeout(timeouts.probe)
            .pool_idle_timeout(timeouts.pool_idle)
            .pool_max_idle_per_host(timeouts.pool_max_idle_per_host)
            .build()?;

        Ok(Self {
            synthesis_client,
            probe_client,
            registry,
            breaker,
            retry,
        })
    }

    pub fn registry(&self) -> &Arc<UpstreamRegistry> {
        &self.registry
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn execute(
        &self,
        index: usize,
        request: &UpstreamRequest,
        profile: CallProfile,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.registry.url_for(index, &request.path);
        let client = match profile {
            CallProfile::Synthesis => &self.synthesis_client,
            CallProfile::Probe | CallProfile::Discovery => &self.probe_client,
        };
        let max_attempts = profile.max_attempts(&self.retry);

        let mut last_status: Option<u16> = None;
        let mut last_detail = String::new();

        for attempt in 1..=max_attempts {
            self.breaker.ensure_available()?;

            let start_time = Instant::now();
            match self.send_once(client, &url, request).await {
                Ok((status, content_type, body)) if !is_retryable_status(status) => {
                    if status.is_success() && profile.records_outcomes() {
                        self.breaker.record_success();
                        self.registry.record_success(index);
                    }
                    tracing::debug!(
                        upstream = %url,
                        attempt = attempt,
                        status = status.as_u16(),
                        latency_ms = start_time.elapsed().as_millis(),
                        "Upstream responded"
                    );
                    return Ok(UpstreamResponse {
                        upstream: self.registry.base_url(index).to_string(),
                        index,
                        status,
                        content_type,
                        body,
                        attempts: attempt,
                        latency: start_time.elapsed(),
                    });
                }
                Ok((status, content_type, body)) => {
                    last_status = Some(status.as_u16());
                    last_detail = format!(
                        "HTTP {}: {}",
                        status.as_u16(),
                        body_excerpt(&body, content_type.as_deref())
                    );
                }
                Err(e) => {
                    last_status = None;
                    last_detail = e;
                }
            }

            if profile.records_outcomes() {
                self.breaker.record_failure();
                self.registry.record_failure(index, &last_detail);
            }

            tracing::warn!(
                upstream = %url,
                attempt = attempt,
                max_attempts = max_attempts,
                status = ?last_status,
                error = %last_detail,
                "Upstream attempt failed"
            );

            if attempt < max_attempts {
                tokio::time::sleep(backoff_delay(&self.retry, attempt)).await;
            }
        }

        Err(UpstreamError::Exhausted {
            url,
            attempts: max_attempts,
            status: last_status,
            detail: last_detail,
        })
    }

    async fn send_once(
        &self,
        client: &Client,
        url: &str,
        request: &UpstreamRequest,
    ) -> Result<(StatusCode, Option<String>, Bytes), String> {
        let mut builder = client.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
        };

        let response = builder.send().await.map_err(describe_transport_error)?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(describe_transport_error)?;

        Ok((status, content_type, body))
    }
}

fn describe_transport_error(error: reqwest::Error) -> String {
    if error.is_timeout() {
        format!("timeout: {}", error)
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        format!("transport error: {}", error)
    }
}
