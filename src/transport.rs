//! HTTP transport for the ServiceNow Table API.
//!
//! [`Transport`] is the seam between query execution and the network: the
//! dispatcher and client only ever see a [`TableRequest`] go in and a JSON
//! body come out. [`HttpTransport`] is the real implementation over reqwest;
//! tests substitute their own.
//!
//! # Security
//!
//! Credentials are never logged. Error bodies are sanitized and truncated
//! before they are stored in a [`NowError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::NowError;
use crate::models::TableRequest;

/// Table API path prefix.
const TABLE_PATH: &str = "/api/now/table";

/// Executes one Table API read.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the GET described by `request` and returns the decoded body.
    ///
    /// Implementations must not retry; retries are the caller's concern.
    async fn get(&self, request: &TableRequest) -> Result<serde_json::Value, NowError>;
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    /// The underlying HTTP client (cloning is cheap).
    http: Client,

    /// Instance base URL, e.g. `https://dev12345.service-now.com`.
    instance: String,

    timeout: Duration,

    auth: Authenticator,
}

impl HttpTransport {
    /// Creates a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns `NowError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(config: &Config) -> Result<Self, NowError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(NowError::HttpClient)?;

        tracing::debug!(
            instance = %config.instance,
            auth = config.credentials.scheme(),
            timeout_secs = config.timeout.as_secs(),
            "Created ServiceNow transport"
        );

        Ok(Self {
            auth: Authenticator::new(
                http.clone(),
                config.instance.clone(),
                config.credentials.clone(),
            ),
            http,
            instance: config.instance.clone(),
            timeout: config.timeout,
        })
    }

    /// Builds the request URL. The sys_id is percent-encoded into the path.
    fn url(&self, request: &TableRequest) -> String {
        let mut url = format!(
            "{}{}/{}",
            self.instance,
            TABLE_PATH,
            urlencoding::encode(&request.table)
        );
        if let Some(sys_id) = &request.sys_id {
            url.push('/');
            url.push_str(&urlencoding::encode(sys_id));
        }
        url
    }

    /// Makes one request without any retry.
    async fn send(&self, request: &TableRequest) -> Result<serde_json::Value, NowError> {
        let url = self.url(request);
        let operation = format!("GET {}", url);

        tracing::debug!(
            table = %request.table,
            sys_id = request.sys_id.as_deref().unwrap_or(""),
            query = request.query.as_ref().map(|q| q.as_str()).unwrap_or(""),
            "Making Table API request"
        );

        let builder = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .query(&request.to_query_pairs());
        let builder = self.auth.apply(builder).await?;

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                return NowError::timeout(self.timeout, operation.clone());
            }
            NowError::Http(e)
        })?;
        let status = response.status();

        if !status.is_success() {
            return Err(self.handle_http_error(status, request, response).await);
        }

        let body = response.text().await.map_err(NowError::Http)?;

        tracing::trace!(bytes = body.len(), "Table API response");

        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Converts a non-success response into a [`NowError`].
    async fn handle_http_error(
        &self,
        status: StatusCode,
        request: &TableRequest,
        response: reqwest::Response,
    ) -> NowError {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.unwrap_or_default();
        let body = NowError::truncate_body(NowError::sanitize_message(&body, &self.auth.secrets()));
        let non_empty = |body: String| Some(body).filter(|b| !b.trim().is_empty());

        match status {
            StatusCode::UNAUTHORIZED => NowError::authentication(
                "the instance rejected the credentials",
                Some(status),
                non_empty(body),
            ),
            StatusCode::FORBIDDEN => NowError::Permission {
                body: non_empty(body),
            },
            StatusCode::NOT_FOUND => NowError::not_found(match &request.sys_id {
                Some(sys_id) => format!("{} record {}", request.table, sys_id),
                None => format!("table {}", request.table),
            }),
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!("Rate limited by ServiceNow instance");
                NowError::RateLimited { retry_after }
            }
            s if s.is_server_error() => {
                tracing::warn!(status = %status, "ServiceNow instance returned a server error");
                NowError::Server { status, body }
            }
            _ => NowError::ServiceNow { status, body },
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &TableRequest) -> Result<serde_json::Value, NowError> {
        match self.send(request).await {
            Err(NowError::Authentication {
                status: Some(StatusCode::UNAUTHORIZED),
                ..
            }) if self.auth.is_oauth() => {
                tracing::debug!("OAuth token rejected, refreshing and retrying once");
                self.auth.invalidate().await;
                self.send(request).await
            }
            other => other,
        }
    }
}
