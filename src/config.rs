//! Configuration management for now-query.
//!
//! This module handles loading configuration from environment variables,
//! with validation to ensure the instance URL and one complete set of
//! credentials are present.
//!
//! Variables already set in the process environment always win over values
//! read from an env file.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::NowError;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Variables whose values must never appear in output.
const SECRET_VARS: &[&str] = &[
    "SERVICENOW_API_KEY",
    "SERVICENOW_CLIENT_SECRET",
    "SERVICENOW_PASSWORD",
];

/// Credentials for one of the three supported authentication schemes.
///
/// Secret values must never be logged or included in error messages.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Sent as `Authorization: Bearer <key>`.
    ApiKey(String),

    /// OAuth 2.0 client-credentials grant against `/oauth_token.do`.
    OAuth {
        /// OAuth application client ID.
        client_id: String,
        /// OAuth application client secret.
        client_secret: String,
    },

    /// HTTP Basic authentication.
    Basic {
        /// ServiceNow user name.
        username: String,
        /// ServiceNow password.
        password: String,
    },
}

impl Credentials {
    /// Short name of the scheme, safe to log.
    pub fn scheme(&self) -> &'static str {
        match self {
            Credentials::ApiKey(_) => "api_key",
            Credentials::OAuth { .. } => "oauth",
            Credentials::Basic { .. } => "basic",
        }
    }

    /// Secret values that must be scrubbed from any output.
    pub fn secrets(&self) -> Vec<String> {
        match self {
            Credentials::ApiKey(key) => vec![key.clone()],
            Credentials::OAuth { client_secret, .. } => vec![client_secret.clone()],
            Credentials::Basic { password, .. } => vec![password.clone()],
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
            Credentials::OAuth { client_id, .. } => f
                .debug_struct("OAuth")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .finish(),
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Configuration for connecting to a ServiceNow instance.
#[derive(Clone, Debug)]
pub struct Config {
    /// Instance base URL without trailing slash (e.g., `https://acme.service-now.com`).
    pub instance: String,

    /// Selected authentication scheme.
    pub credentials: Credentials,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// The first env file found among `~/.claude/env` and `./.claude/env` is
    /// loaded first; it never overrides variables already set.
    ///
    /// # Required Environment Variables
    ///
    /// - `SERVICENOW_INSTANCE`: base URL of the instance
    /// - one of `SERVICENOW_API_KEY`, `SERVICENOW_CLIENT_ID` + `SERVICENOW_CLIENT_SECRET`,
    ///   or `SERVICENOW_USERNAME` + `SERVICENOW_PASSWORD`
    ///
    /// # Optional
    ///
    /// - `SERVICENOW_TIMEOUT`: request timeout in seconds (default 30)
    ///
    /// # Errors
    ///
    /// Returns `NowError::Config` if the instance or credentials are missing
    /// or invalid.
    pub fn from_env() -> Result<Self, NowError> {
        if let Some(path) = Self::load_env_file() {
            tracing::debug!(path = %path.display(), "Loaded env file");
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NowError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let instance = get("SERVICENOW_INSTANCE")
            .ok_or_else(|| NowError::missing_env("SERVICENOW_INSTANCE"))?;
        let instance = Self::validate_instance(&instance)?;

        let credentials = Self::select_credentials(
            get("SERVICENOW_API_KEY"),
            get("SERVICENOW_CLIENT_ID").zip(get("SERVICENOW_CLIENT_SECRET")),
            get("SERVICENOW_USERNAME").zip(get("SERVICENOW_PASSWORD")),
        )?;

        let timeout = Self::parse_timeout(get("SERVICENOW_TIMEOUT").as_deref());

        Ok(Config {
            instance,
            credentials,
            timeout,
        })
    }

    /// Secret values that must be scrubbed from any output.
    pub fn secrets(&self) -> Vec<String> {
        self.credentials.secrets()
    }

    /// Every secret present in the environment, whether or not it forms a
    /// complete credential set. Used to scrub failures reported before (or
    /// without) a valid configuration.
    pub fn env_secrets() -> Vec<String> {
        SECRET_VARS
            .iter()
            .filter_map(|name| env::var(name).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }

    /// Loads the first env file that exists, returning its path.
    fn load_env_file() -> Option<PathBuf> {
        let candidates = [
            dirs_next::home_dir().map(|home| home.join(".claude").join("env")),
            env::current_dir().ok().map(|cwd| cwd.join(".claude").join("env")),
        ];

        let path = candidates.into_iter().flatten().find(|p| p.is_file())?;
        match dotenvy::from_path(&path) {
            Ok(()) => Some(path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable env file");
                None
            }
        }
    }

    /// Picks the credential scheme. API key beats OAuth beats Basic.
    fn select_credentials(
        api_key: Option<String>,
        oauth: Option<(String, String)>,
        basic: Option<(String, String)>,
    ) -> Result<Credentials, NowError> {
        if let Some(key) = api_key {
            return Ok(Credentials::ApiKey(key));
        }
        if let Some((client_id, client_secret)) = oauth {
            return Ok(Credentials::OAuth {
                client_id,
                client_secret,
            });
        }
        if let Some((username, password)) = basic {
            return Ok(Credentials::Basic { username, password });
        }
        Err(NowError::invalid_config(
            "No valid authentication configured. Provide either:\n  \
             - SERVICENOW_USERNAME and SERVICENOW_PASSWORD for Basic auth\n  \
             - SERVICENOW_CLIENT_ID and SERVICENOW_CLIENT_SECRET for OAuth\n  \
             - SERVICENOW_API_KEY for API key authentication",
        ))
    }

    /// Validates and normalizes the instance URL.
    fn validate_instance(raw: &str) -> Result<String, NowError> {
        let raw = raw.trim().trim_end_matches('/');

        let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let parsed = Url::parse(&with_scheme).map_err(|e| {
            NowError::invalid_config(format!("SERVICENOW_INSTANCE is not a valid URL: {}", e))
        })?;
        if parsed.host_str().is_none() {
            return Err(NowError::invalid_config(
                "SERVICENOW_INSTANCE must include a host name",
            ));
        }

        Ok(with_scheme)
    }

    /// Parses `SERVICENOW_TIMEOUT`, falling back to the default on bad input.
    fn parse_timeout(raw: Option<&str>) -> Duration {
        match raw.map(str::parse::<u64>) {
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
            Some(_) => {
                tracing::warn!(
                    value = raw.unwrap_or_default(),
                    default_secs = DEFAULT_TIMEOUT_SECS,
                    "Invalid SERVICENOW_TIMEOUT, using default"
                );
                Duration::from_secs(DEFAULT_TIMEOUT_SECS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_missing_instance() {
        let err = Config::from_lookup(lookup(&[("SERVICENOW_API_KEY", "k")])).unwrap_err();
        assert!(err.to_string().contains("SERVICENOW_INSTANCE"));
    }

    #[test]
    fn test_missing_auth() {
        let err = Config::from_lookup(lookup(&[(
            "SERVICENOW_INSTANCE",
            "https://acme.service-now.com",
        )]))
        .unwrap_err();
        assert!(err.to_string().contains("No valid authentication"));
    }

    #[test]
    fn test_incomplete_basic_auth_is_missing_auth() {
        let err = Config::from_lookup(lookup(&[
            ("SERVICENOW_INSTANCE", "https://acme.service-now.com"),
            ("SERVICENOW_USERNAME", "admin"),
        ]))
        .unwrap_err();
        assert!(matches!(err, NowError::Config(_)));
    }

    #[test]
    fn test_basic_auth() {
        let config = Config::from_lookup(lookup(&[
            ("SERVICENOW_INSTANCE", "https://acme.service-now.com/"),
            ("SERVICENOW_USERNAME", "admin"),
            ("SERVICENOW_PASSWORD", "pw"),
        ]))
        .unwrap();
        assert_eq!(config.instance, "https://acme.service-now.com");
        assert_eq!(
            config.credentials,
            Credentials::Basic {
                username: "admin".to_string(),
                password: "pw".to_string()
            }
        );
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_api_key_takes_precedence() {
        let config = Config::from_lookup(lookup(&[
            ("SERVICENOW_INSTANCE", "https://acme.service-now.com"),
            ("SERVICENOW_USERNAME", "admin"),
            ("SERVICENOW_PASSWORD", "pw"),
            ("SERVICENOW_CLIENT_ID", "cid"),
            ("SERVICENOW_CLIENT_SECRET", "cs"),
            ("SERVICENOW_API_KEY", "key"),
        ]))
        .unwrap();
        assert_eq!(config.credentials.scheme(), "api_key");
    }

    #[test]
    fn test_oauth_beats_basic() {
        let config = Config::from_lookup(lookup(&[
            ("SERVICENOW_INSTANCE", "https://acme.service-now.com"),
            ("SERVICENOW_USERNAME", "admin"),
            ("SERVICENOW_PASSWORD", "pw"),
            ("SERVICENOW_CLIENT_ID", "cid"),
            ("SERVICENOW_CLIENT_SECRET", "cs"),
        ]))
        .unwrap();
        assert_eq!(config.credentials.scheme(), "oauth");
        assert_eq!(config.secrets(), vec!["cs".to_string()]);
    }

    #[test]
    fn test_whitespace_api_key_is_not_auth() {
        let err = Config::from_lookup(lookup(&[
            ("SERVICENOW_INSTANCE", "https://acme.service-now.com"),
            ("SERVICENOW_API_KEY", "   "),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("No valid authentication"));
    }

    #[test]
    fn test_validate_instance_adds_scheme() {
        assert_eq!(
            Config::validate_instance("acme.service-now.com/").unwrap(),
            "https://acme.service-now.com"
        );
        assert_eq!(
            Config::validate_instance("http://127.0.0.1:8080").unwrap(),
            "http://127.0.0.1:8080"
        );
    }

    #[test]
    fn test_validate_instance_rejects_garbage() {
        assert!(Config::validate_instance("https://bad host.example").is_err());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(Config::parse_timeout(Some("60")), Duration::from_secs(60));
        assert_eq!(
            Config::parse_timeout(Some("soon")),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
        assert_eq!(
            Config::parse_timeout(Some("0")),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
        assert_eq!(
            Config::parse_timeout(None),
            Duration::from_secs(DEFAULT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = Credentials::Basic {
            username: "admin".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
        assert!(!format!("{:?}", Credentials::ApiKey("k-1".to_string())).contains("k-1"));
    }
}
