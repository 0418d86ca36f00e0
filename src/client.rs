//! ServiceNow Table API client.
//!
//! This module provides [`ServiceNowClient`], which wraps a [`Transport`]
//! with retry and response decoding.
//!
//! # Retry Logic
//!
//! Transient failures are retried up to [`RetryPolicy::max_attempts`] times
//! in total:
//! - HTTP 429 (rate limit): the `Retry-After` delay when present, otherwise
//!   exponential backoff
//! - HTTP 5xx: exponential backoff
//! - Timeouts: exponential backoff
//!
//! Backoff starts at one second, doubles per retry, gets 10-20% jitter, and
//! is capped at 60 seconds. Client errors (4xx except 429) are not retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::config::Config;
use crate::error::NowError;
use crate::models::{ListEnvelope, Record, SingleEnvelope, TableRequest};
use crate::transport::{HttpTransport, Transport};

/// Backoff schedule for transient failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Jitter range, as a fraction of the computed delay.
    pub jitter: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: (0.10, 0.20),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), given a jitter fraction.
    ///
    /// A server-supplied `retry_after` replaces the computed backoff. The
    /// result never exceeds `max_delay`.
    pub fn delay_for(&self, retry: u32, jitter: f64, retry_after: Option<Duration>) -> Duration {
        let delay = match retry_after {
            Some(delay) => delay,
            None => {
                let base = self
                    .initial_delay
                    .saturating_mul(2u32.saturating_pow(retry));
                base.mul_f64(1.0 + jitter)
            }
        };
        delay.min(self.max_delay)
    }

    fn sample_jitter(&self) -> f64 {
        let (low, high) = self.jitter;
        if high > low {
            rand::thread_rng().gen_range(low..=high)
        } else {
            low
        }
    }
}

/// Waits between retries. Replaced in tests to avoid real sleeping.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Read-only client for the ServiceNow Table API.
///
/// # Example
///
/// ```ignore
/// let config = Config::from_env()?;
/// let client = ServiceNowClient::new(&config)?;
///
/// let records = client.get_records(&TableRequest::list("incident")).await?;
/// ```
#[derive(Clone)]
pub struct ServiceNowClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ServiceNowClient {
    /// Creates a client that talks HTTP to the configured instance.
    ///
    /// # Errors
    ///
    /// Returns `NowError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(config: &Config) -> Result<Self, NowError> {
        Ok(Self::with_transport(Arc::new(HttpTransport::new(config)?)))
    }

    /// Creates a client over any transport, with the default retry policy.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replaces the sleeper used between retries.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Fetches a list of records. No matches is an empty vector.
    ///
    /// # Errors
    ///
    /// Returns the transport error once retries are exhausted, or
    /// `NowError::Serialization` if the body is not a `{"result": [...]}` envelope.
    pub async fn get_records(&self, request: &TableRequest) -> Result<Vec<Record>, NowError> {
        let body = self.fetch(request).await?;
        if body.is_null() {
            return Ok(Vec::new());
        }
        let envelope: ListEnvelope = serde_json::from_value(body)?;
        Ok(envelope.result)
    }

    /// Fetches one record by sys_id.
    ///
    /// Returns `None` when the instance answers with an empty record.
    /// A 404 is still reported as `NowError::NotFound`.
    ///
    /// # Errors
    ///
    /// Returns the transport error once retries are exhausted.
    pub async fn get_record(&self, request: &TableRequest) -> Result<Option<Record>, NowError> {
        let body = self.fetch(request).await?;
        if body.is_null() {
            return Ok(None);
        }
        let envelope: SingleEnvelope = serde_json::from_value(body)?;
        Ok(Some(envelope.result).filter(|r| !r.is_empty()))
    }

    /// Tests connectivity to the instance.
    ///
    /// Reads a single `sys_user` record to verify the instance is reachable
    /// and the credentials are accepted.
    ///
    /// # Errors
    ///
    /// Returns the underlying error when the check fails.
    pub async fn test_connection(&self) -> Result<(), NowError> {
        tracing::debug!("Testing connection to ServiceNow instance");

        let request = TableRequest::list("sys_user")
            .with_fields(vec!["sys_id".to_string()])
            .with_page(crate::models::Page {
                limit: Some(1),
                offset: None,
            });

        match self.get_records(&request).await {
            Ok(_) => {
                tracing::info!("Connection test successful");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(kind = e.kind(), "Connection test failed");
                Err(e)
            }
        }
    }

    async fn fetch(&self, request: &TableRequest) -> Result<serde_json::Value, NowError> {
        let operation = format!("GET {}", request.table);
        self.with_retry(&operation, || self.transport.get(request))
            .await
    }

    /// Executes an operation with retry logic for transient failures.
    async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> Result<T, NowError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, NowError>>,
    {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempts < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(
                        attempts - 1,
                        self.retry.sample_jitter(),
                        e.retry_after(),
                    );

                    tracing::debug!(
                        operation = operation,
                        attempt = attempts,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transient error"
                    );

                    self.sleeper.sleep(delay).await;
                }
                Err(e) => {
                    if attempts > 1 {
                        tracing::debug!(
                            operation = operation,
                            attempts = attempts,
                            "All retry attempts exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use reqwest::StatusCode;
    use serde_json::json;

    /// Replays canned responses in order.
    struct Scripted {
        responses: Mutex<Vec<Result<serde_json::Value, NowError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<serde_json::Value, NowError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn get(&self, _request: &TableRequest) -> Result<serde_json::Value, NowError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(NowError::validation("script exhausted")))
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<Duration>>);

    #[async_trait]
    impl Sleeper for Recording {
        async fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    fn client(transport: Arc<Scripted>, sleeper: Arc<Recording>) -> ServiceNowClient {
        ServiceNowClient::with_transport(transport).with_sleeper(sleeper)
    }

    fn server_error() -> NowError {
        NowError::Server {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, 0.0, None), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, 0.0, None), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, 0.0, None), Duration::from_secs(4));
        assert_eq!(
            policy.delay_for(0, 0.10, None),
            Duration::from_millis(1100)
        );
        assert_eq!(policy.delay_for(10, 0.2, None), Duration::from_secs(60));
    }

    #[test]
    fn test_retry_after_replaces_backoff_but_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(0, 0.15, Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.delay_for(0, 0.15, Some(Duration::from_secs(600))),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_jitter_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let j = policy.sample_jitter();
            assert!((0.10..=0.20).contains(&j));
        }
    }

    #[tokio::test]
    async fn test_retries_server_errors_then_succeeds() {
        let transport = Arc::new(Scripted::new(vec![
            Err(server_error()),
            Err(server_error()),
            Ok(json!({"result": [{"number": "INC0000001"}]})),
        ]));
        let sleeper = Arc::new(Recording::default());
        let records = client(transport.clone(), sleeper.clone())
            .get_records(&TableRequest::list("incident"))
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(transport.calls(), 3);
        let delays = sleeper.0.lock().unwrap().clone();
        assert_eq!(delays.len(), 2);
        assert!(delays[0] >= Duration::from_millis(1100) && delays[0] <= Duration::from_millis(1200));
        assert!(delays[1] >= Duration::from_millis(2200) && delays[1] <= Duration::from_millis(2400));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let transport = Arc::new(Scripted::new(vec![
            Err(server_error()),
            Err(server_error()),
            Err(server_error()),
            Ok(json!({"result": []})),
        ]));
        let sleeper = Arc::new(Recording::default());
        let err = client(transport.clone(), sleeper.clone())
            .get_records(&TableRequest::list("incident"))
            .await
            .unwrap_err();

        assert!(matches!(err, NowError::Server { .. }));
        assert_eq!(transport.calls(), 3);
        assert_eq!(sleeper.0.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let transport = Arc::new(Scripted::new(vec![Err(NowError::Permission { body: None })]));
        let sleeper = Arc::new(Recording::default());
        let err = client(transport.clone(), sleeper.clone())
            .get_records(&TableRequest::list("incident"))
            .await
            .unwrap_err();

        assert!(matches!(err, NowError::Permission { .. }));
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_uses_retry_after() {
        let transport = Arc::new(Scripted::new(vec![
            Err(NowError::RateLimited {
                retry_after: Some(Duration::from_secs(3)),
            }),
            Ok(json!({"result": []})),
        ]));
        let sleeper = Arc::new(Recording::default());
        client(transport, sleeper.clone())
            .get_records(&TableRequest::list("incident"))
            .await
            .unwrap();

        assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_secs(3)]);
    }

    #[tokio::test]
    async fn test_get_record_empty_is_none() {
        let transport = Arc::new(Scripted::new(vec![Ok(json!({"result": {}}))]));
        let record = client(transport, Arc::new(Recording::default()))
            .get_record(&TableRequest::single("change_request", "abc"))
            .await
            .unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_no_retry_policy() {
        let transport = Arc::new(Scripted::new(vec![Err(server_error())]));
        let sleeper = Arc::new(Recording::default());
        let err = client(transport.clone(), sleeper)
            .with_retry_policy(RetryPolicy::none())
            .get_records(&TableRequest::list("incident"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(transport.calls(), 1);
    }
}
