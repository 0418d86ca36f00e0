//! Error types for now-query.
//!
//! This module defines `NowError`, the unified error type used throughout
//! the crate. Every variant maps onto one entry of the failure taxonomy the
//! CLI reports (`ValidationError`, `AuthenticationError`, `PermissionError`,
//! `NotFoundError`, `RateLimitError`, `ServerError`, `ServiceNowError`,
//! `ConfigurationError`).
//!
//! # Security
//!
//! Credentials must never reach logs or error output. Use
//! [`NowError::sanitize_message`] on anything built from external sources.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum length for HTTP error response bodies kept in an error.
pub const MAX_ERROR_BODY_LEN: usize = 500;

/// Unified error type for all now-query operations.
#[derive(Error, Debug)]
pub enum NowError {
    /// Configuration error - missing or invalid environment variables.
    #[error("configuration error: {0}")]
    Config(String),

    /// Input validation failed. Raised before any network call.
    #[error("validation error: {0}")]
    Validation(String),

    /// HTTP 401, or the OAuth token exchange failed.
    #[error("authentication failed: {message}")]
    Authentication {
        /// What failed.
        message: String,
        /// Status code of the rejecting response, if there was one.
        status: Option<StatusCode>,
        /// Response body, if the server sent one.
        body: Option<String>,
    },

    /// HTTP 403 - the credentials lack access to the table.
    #[error("access forbidden - insufficient permissions")]
    Permission {
        /// Response body, if the server sent one.
        body: Option<String>,
    },

    /// Requested record was not found.
    #[error("{resource} not found")]
    NotFound {
        /// Description of the missing record.
        resource: String,
    },

    /// Rate limited by the instance (HTTP 429).
    #[error("rate limit exceeded")]
    RateLimited {
        /// Delay suggested by the `Retry-After` header.
        retry_after: Option<Duration>,
    },

    /// Instance returned a 5xx status.
    #[error("server error ({status})")]
    Server {
        /// The status code returned.
        status: StatusCode,
        /// The response body.
        body: String,
    },

    /// Any other non-success status.
    #[error("API request failed ({status})")]
    ServiceNow {
        /// The status code returned.
        status: StatusCode,
        /// The response body.
        body: String,
    },

    /// Request timed out.
    #[error("request timed out after {duration:?} ({operation})")]
    Timeout {
        /// How long we waited.
        duration: Duration,
        /// The operation that timed out.
        operation: String,
    },

    /// HTTP request failed during transmission.
    #[error("failed to connect to ServiceNow: {0}")]
    Http(#[source] reqwest::Error),

    /// HTTP client initialization failed.
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NowError {
    /// Creates a configuration error for a missing environment variable.
    pub fn missing_env(var_name: &str) -> Self {
        NowError::Config(format!(
            "{} is required. Set it in ~/.claude/env or as an environment variable.",
            var_name
        ))
    }

    /// Creates a configuration error for an invalid value.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        NowError::Config(message.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        NowError::Validation(message.into())
    }

    /// Creates a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        NowError::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates an authentication error.
    pub fn authentication(
        message: impl Into<String>,
        status: Option<StatusCode>,
        body: Option<String>,
    ) -> Self {
        NowError::Authentication {
            message: message.into(),
            status,
            body,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(duration: Duration, operation: impl Into<String>) -> Self {
        NowError::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Name of the taxonomy entry this error belongs to.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            NowError::Config(_) => "ConfigurationError",
            NowError::Validation(_) => "ValidationError",
            NowError::Authentication { .. } => "AuthenticationError",
            NowError::Permission { .. } => "PermissionError",
            NowError::NotFound { .. } => "NotFoundError",
            NowError::RateLimited { .. } => "RateLimitError",
            NowError::Server { .. } | NowError::Timeout { .. } => "ServerError",
            NowError::ServiceNow { .. } | NowError::Http(_) | NowError::HttpClient(_) => {
                "ServiceNowError"
            }
            NowError::Serialization(_) => "ServiceNowError",
        }
    }

    /// HTTP status code behind this error, if it came from a response.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NowError::Authentication { status, .. } => status.map(|s| s.as_u16()),
            NowError::Permission { .. } => Some(403),
            NowError::RateLimited { .. } => Some(429),
            NowError::Server { status, .. } | NowError::ServiceNow { status, .. } => {
                Some(status.as_u16())
            }
            _ => None,
        }
    }

    /// Response body carried by this error, if any.
    fn body(&self) -> Option<&str> {
        match self {
            NowError::Authentication { body, .. } | NowError::Permission { body } => {
                body.as_deref()
            }
            NowError::Server { body, .. } | NowError::ServiceNow { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Returns true if this error is transient and the operation should be retried.
    ///
    /// Retryable errors are rate limiting (HTTP 429), server errors (HTTP 5xx)
    /// and request timeouts. Other 4xx responses are never retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            NowError::RateLimited { .. } => true,
            NowError::Server { .. } => true,
            NowError::Timeout { .. } => true,
            NowError::Http(e) => e.is_timeout(),
            NowError::ServiceNow { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// Returns true if this is a rate limit error.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, NowError::RateLimited { .. })
    }

    /// Returns the delay the server asked for, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            NowError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Replaces every occurrence of the given secrets with `[REDACTED]`.
    ///
    /// Empty secrets are ignored so that an unset credential cannot blank
    /// out the whole message.
    #[must_use]
    pub fn sanitize_message<S: AsRef<str>>(message: &str, secrets: &[S]) -> String {
        secrets
            .iter()
            .map(AsRef::as_ref)
            .filter(|s| !s.is_empty())
            .fold(message.to_string(), |acc, secret| {
                acc.replace(secret, "[REDACTED]")
            })
    }

    /// Truncates a response body to [`MAX_ERROR_BODY_LEN`] bytes on a char boundary.
    #[must_use]
    pub fn truncate_body(body: String) -> String {
        if body.len() <= MAX_ERROR_BODY_LEN {
            return body;
        }
        let mut end = MAX_ERROR_BODY_LEN;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }

    /// Structured detail for the failure envelope.
    ///
    /// Carries the taxonomy name, the status code when there is one, and the
    /// response body (parsed as JSON when it is JSON).
    #[must_use]
    pub fn detail<S: AsRef<str>>(&self, secrets: &[S]) -> serde_json::Value {
        let mut detail = serde_json::Map::new();
        detail.insert("type".to_string(), serde_json::json!(self.kind()));
        if let Some(status) = self.status_code() {
            detail.insert("status_code".to_string(), serde_json::json!(status));
        }
        if let Some(retry_after) = self.retry_after() {
            detail.insert(
                "retry_after_secs".to_string(),
                serde_json::json!(retry_after.as_secs()),
            );
        }
        if let Some(body) = self.body().filter(|b| !b.trim().is_empty()) {
            let body = Self::sanitize_message(body, secrets);
            let response = serde_json::from_str::<serde_json::Value>(&body)
                .unwrap_or(serde_json::Value::String(body));
            detail.insert("response".to_string(), response);
        }
        serde_json::Value::Object(detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_error() {
        let err = NowError::missing_env("SERVICENOW_INSTANCE");
        assert!(err.to_string().contains("SERVICENOW_INSTANCE"));
        assert!(err.to_string().contains("required"));
        assert_eq!(err.kind(), "ConfigurationError");
    }

    #[test]
    fn test_validation_error() {
        let err = NowError::validation("sys_id is required for get action");
        assert_eq!(
            err.to_string(),
            "validation error: sys_id is required for get action"
        );
        assert_eq!(err.kind(), "ValidationError");
    }

    #[test]
    fn test_not_found_error() {
        let err = NowError::not_found("Incident with sys_id 'abc123'");
        assert_eq!(err.to_string(), "Incident with sys_id 'abc123' not found");
    }

    #[test]
    fn test_is_retryable_rate_limited() {
        let err = NowError::RateLimited { retry_after: None };
        assert!(err.is_retryable());
        assert!(err.is_rate_limit());
        assert_eq!(err.kind(), "RateLimitError");
    }

    #[test]
    fn test_is_retryable_server_error() {
        let err = NowError::Server {
            status: StatusCode::BAD_GATEWAY,
            body: String::new(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_rate_limit());
        assert_eq!(err.kind(), "ServerError");
    }

    #[test]
    fn test_timeout_is_retryable_server_error() {
        let err = NowError::timeout(Duration::from_secs(30), "GET incident");
        assert!(err.is_retryable());
        assert_eq!(err.kind(), "ServerError");
        assert!(err.to_string().contains("30s"));
    }

    #[test]
    fn test_client_errors_not_retryable() {
        assert!(!NowError::not_found("x").is_retryable());
        assert!(!NowError::validation("bad").is_retryable());
        let auth = NowError::authentication(
            "Authentication failed",
            Some(StatusCode::UNAUTHORIZED),
            None,
        );
        assert!(!auth.is_retryable());
        assert!(!NowError::Permission { body: None }.is_retryable());
        let err = NowError::ServiceNow {
            status: StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_sanitize_message_removes_secrets() {
        let message = "basic s3cret failed, key k-123 rejected";
        let sanitized = NowError::sanitize_message(message, &["s3cret", "k-123"]);
        assert!(!sanitized.contains("s3cret"));
        assert!(!sanitized.contains("k-123"));
        assert_eq!(sanitized.matches("[REDACTED]").count(), 2);
    }

    #[test]
    fn test_sanitize_message_ignores_empty_secret() {
        let message = "Some error message";
        assert_eq!(NowError::sanitize_message(message, &[""]), message);
        assert_eq!(NowError::sanitize_message::<&str>(message, &[]), message);
    }

    #[test]
    fn test_truncate_body() {
        let short = "short".to_string();
        assert_eq!(NowError::truncate_body(short.clone()), short);

        let long = "é".repeat(MAX_ERROR_BODY_LEN);
        let truncated = NowError::truncate_body(long);
        assert!(truncated.ends_with("...[truncated]"));
        assert!(truncated.len() <= MAX_ERROR_BODY_LEN + "...[truncated]".len());
    }

    #[test]
    fn test_detail_parses_json_body() {
        let err = NowError::ServiceNow {
            status: StatusCode::BAD_REQUEST,
            body: r#"{"error":{"message":"Invalid table"}}"#.to_string(),
        };
        let detail = err.detail::<&str>(&[]);
        assert_eq!(detail["type"], "ServiceNowError");
        assert_eq!(detail["status_code"], 400);
        assert_eq!(detail["response"]["error"]["message"], "Invalid table");
    }

    #[test]
    fn test_detail_keeps_plain_body_and_redacts() {
        let err = NowError::Server {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "token tok-9 exploded".to_string(),
        };
        let detail = err.detail(&["tok-9"]);
        assert_eq!(detail["response"], "token [REDACTED] exploded");
    }

    #[test]
    fn test_detail_for_validation_has_type_only() {
        let detail = NowError::validation("bad").detail::<&str>(&[]);
        assert_eq!(detail, serde_json::json!({"type": "ValidationError"}));
    }
}
