//! Resilient HTTP client for the remote ledger API.
//!
//! Every call is attempted up to a fixed budget. An attempt only counts as a
//! success when the transport completes, the status is exactly `200` and the
//! optional response validator accepts the body. Callers only ever see the
//! aggregate [`RequestError::RetryExhausted`].

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error};
use uuid::Uuid;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of attempts per call.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// Response acceptance predicate. `Err` carries the rejection reason.
pub type Validator = dyn Fn(&[u8]) -> Result<(), String> + Send + Sync;

/// HTTP verb supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
        }
    }
}

/// Request failures.
///
/// `Transport`, `Status` and `Validation` describe a single attempt and are
/// only ever seen wrapped inside `RetryExhausted`.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Connection, TLS, timeout or body read failure.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with something other than `200`.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The response body was rejected by the caller's validator.
    #[error("response rejected: {0}")]
    Validation(String),

    /// The request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// Every attempt failed.
    #[error("{method} {url} failed after {attempts} attempts: {last}")]
    RetryExhausted {
        method: Method,
        url: String,
        attempts: u32,
        last: Box<RequestError>,
    },
}

/// Client tuning knobs.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout applied to every single attempt
    pub timeout: Duration,
    /// Attempts per call (at least one)
    pub attempts: u32,
    /// Idle connections kept per host
    pub max_idle_per_host: usize,
    /// How long an idle pooled connection is kept
    pub idle_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
            max_idle_per_host: 100,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Pooled HTTP client with bounded retries.
#[derive(Debug, Clone)]
pub struct RequestClient {
    client: reqwest::Client,
    attempts: u32,
}

impl RequestClient {
    /// Create a client with the default configuration.
    pub fn new() -> Result<Self, RequestError> {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with custom timeout and retry budget.
    pub fn with_config(config: ClientConfig) -> Result<Self, RequestError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.idle_timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .build()?;

        Ok(Self {
            client,
            attempts: config.attempts.max(1),
        })
    }

    /// Attempts per call.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// GET `url`, returning the body of the first successful attempt.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, RequestError> {
        self.request(Method::Get, url, None, None).await
    }

    /// POST `payload` as JSON to `url`.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<Vec<u8>, RequestError> {
        let body = serde_json::to_vec(payload)?;
        self.request(Method::Post, url, Some(body), None).await
    }

    /// POST `payload` as JSON to `url`, accepting only bodies the validator approves.
    pub async fn post_json_validated<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
        validator: &Validator,
    ) -> Result<Vec<u8>, RequestError> {
        let body = serde_json::to_vec(payload)?;
        self.request(Method::Post, url, Some(body), Some(validator)).await
    }

    /// Issue a request with the full retry budget.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
        validator: Option<&Validator>,
    ) -> Result<Vec<u8>, RequestError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        debug!(%request_id, %method, url, "request started");

        let mut last = None;
        for attempt in 1..=self.attempts {
            match self.attempt(method, url, body.as_deref(), validator).await {
                Ok(data) => {
                    debug!(
                        %request_id,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        bytes = data.len(),
                        "request succeeded"
                    );
                    return Ok(data);
                }
                Err(e) => {
                    debug!(
                        %request_id,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        reason = %e,
                        "request attempt failed"
                    );
                    last = Some(e);
                }
            }
        }

        let last = last.unwrap_or(RequestError::Status(0));
        error!(
            %request_id,
            %method,
            url,
            attempts = self.attempts,
            elapsed_ms = started.elapsed().as_millis() as u64,
            reason = %last,
            "request failed after retries"
        );

        Err(RequestError::RetryExhausted {
            method,
            url: url.to_string(),
            attempts: self.attempts,
            last: Box::new(last),
        })
    }

    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<&[u8]>,
        validator: Option<&Validator>,
    ) -> Result<Vec<u8>, RequestError> {
        let builder = match method {
            Method::Get => self.client.get(url),
            Method::Post => self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json"),
        };
        let builder = match body {
            Some(body) => builder.body(body.to_vec()),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(RequestError::Status(status));
        }

        let data = response.bytes().await?.to_vec();
        if let Some(validate) = validator {
            validate(&data).map_err(RequestError::Validation)?;
        }
        Ok(data)
    }
}
