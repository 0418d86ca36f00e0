//! Request authentication.
//!
//! Applies the configured credential scheme to outgoing requests. For OAuth
//! client credentials the access token is fetched from `/oauth_token.do` on
//! first use and cached until the instance rejects it.

use std::time::{Duration, Instant};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::Credentials;
use crate::error::NowError;

/// Path of the OAuth token endpoint, relative to the instance.
const TOKEN_PATH: &str = "/oauth_token.do";

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
struct AccessToken {
    value: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_at
            .map_or(true, |at| Instant::now() + EXPIRY_MARGIN < at)
    }
}

/// Attaches credentials to requests.
pub struct Authenticator {
    http: Client,
    instance: String,
    credentials: Credentials,
    /// SECURITY: Never log this value!
    token: Mutex<Option<AccessToken>>,
}

impl Authenticator {
    /// Creates an authenticator for `instance`.
    pub fn new(http: Client, instance: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http,
            instance: instance.into(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// True when a rejected request may succeed after [`Authenticator::invalidate`].
    pub fn is_oauth(&self) -> bool {
        matches!(self.credentials, Credentials::OAuth { .. })
    }

    /// Strings that must be scrubbed from any error text.
    pub fn secrets(&self) -> Vec<String> {
        self.credentials.secrets()
    }

    /// Adds the `Authorization` header for the configured scheme.
    ///
    /// # Errors
    ///
    /// Returns `NowError::Authentication` if an OAuth token cannot be obtained.
    pub async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder, NowError> {
        match &self.credentials {
            Credentials::ApiKey(key) => Ok(request.bearer_auth(key)),
            Credentials::Basic { username, password } => {
                Ok(request.basic_auth(username, Some(password)))
            }
            Credentials::OAuth { .. } => {
                let token = self.access_token().await?;
                Ok(request.bearer_auth(token))
            }
        }
    }

    /// Drops the cached OAuth token so the next request fetches a new one.
    pub async fn invalidate(&self) {
        let mut token = self.token.lock().await;
        if token.take().is_some() {
            tracing::debug!("Discarded cached OAuth token");
        }
    }

    async fn access_token(&self) -> Result<String, NowError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<AccessToken, NowError> {
        let Credentials::OAuth {
            client_id,
            client_secret,
        } = &self.credentials
        else {
            return Err(NowError::authentication(
                "OAuth token requested without OAuth credentials",
                None,
                None,
            ));
        };

        tracing::debug!("Requesting OAuth access token");

        let url = format!("{}{}", self.instance, TOKEN_PATH);
        let response = self
            .http
            .post(&url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                NowError::authentication(
                    format!("OAuth token request failed: {}", e),
                    None,
                    None,
                )
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body = NowError::truncate_body(NowError::sanitize_message(&body, &self.secrets()));

        if !status.is_success() {
            tracing::warn!(status = %status, "OAuth token request rejected");
            return Err(NowError::authentication(
                "OAuth token request rejected",
                Some(status),
                Some(body),
            ));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|_| {
            NowError::authentication(
                "OAuth token response did not contain an access_token",
                Some(StatusCode::OK),
                Some(body.clone()),
            )
        })?;
        if parsed.access_token.is_empty() {
            return Err(NowError::authentication(
                "OAuth token response contained an empty access_token",
                Some(status),
                None,
            ));
        }

        Ok(AccessToken {
            value: parsed.access_token,
            expires_at: parsed
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}
