//! # now-query
//!
//! now-query reads ServiceNow ITSM data (incidents, change requests,
//! problems, the service catalog, the CMDB and companies) through the Table
//! API.
//!
//! Every request is a small JSON document naming an action and its
//! parameters. The document is validated against a closed vocabulary before
//! anything touches the network, compiled into an encoded query, sent with
//! the configured credentials, and the records come back normalized for the
//! requested display-value mode.
//!
//! ## Features
//!
//! - **Six domains, one engine**: each domain is a table of actions
//!   (`get`, `query`, `search`, `latest`, ...) interpreted by a single dispatcher
//! - **Encoded queries**: typed clauses with the full operator set, caller
//!   fragments and ordering
//! - **Authentication**: API key, OAuth client credentials (cached token) or
//!   Basic
//! - **Error handling**: Automatic retry for rate limiting and server errors
//!   with exponential backoff
//! - **Security**: credentials are never logged and are redacted from every
//!   failure
//!
//! ## Architecture
//!
//! - [`config`] - Configuration loading from the environment and env files
//! - [`error`] - Error taxonomy and sanitization
//! - [`query`] - Encoded query builder
//! - [`models`] - Table requests, page windows and result shapes
//! - [`auth`] - Credential application and OAuth token cache
//! - [`transport`] - HTTP transport and status classification
//! - [`client`] - Retrying Table API client
//! - [`normalize`] - Reference field normalization
//! - [`dispatch`] - Domain action tables and the dispatcher
//! - [`cli`] - Command line surface
//!
//! ## Usage
//!
//! ```bash
//! export SERVICENOW_INSTANCE=acme.service-now.com
//! export SERVICENOW_USERNAME=integration
//! export SERVICENOW_PASSWORD=...
//!
//! echo '{"action": "list", "state": "-2"}' | now-query changes
//! ```
//!
//! ## Configuration
//!
//! - `SERVICENOW_INSTANCE`: instance URL (`https://` is added when missing)
//! - one credential set, in order of preference: `SERVICENOW_API_KEY`;
//!   `SERVICENOW_CLIENT_ID` + `SERVICENOW_CLIENT_SECRET`;
//!   `SERVICENOW_USERNAME` + `SERVICENOW_PASSWORD`
//!
//! Optional:
//! - `SERVICENOW_TIMEOUT`: request timeout in seconds (default 30)
//! - `RUST_LOG`: Log level (e.g., `now_query=debug`)
//!
//! ## Example
//!
//! Using the [`Dispatcher`](dispatch::Dispatcher) directly:
//!
//! ```no_run
//! use now_query::client::ServiceNowClient;
//! use now_query::config::Config;
//! use now_query::dispatch::{Dispatcher, Domain};
//! use serde_json::json;
//!
//! async fn example() -> Result<(), now_query::error::NowError> {
//!     let config = Config::from_env()?;
//!     let dispatcher = Dispatcher::new(ServiceNowClient::new(&config)?);
//!
//!     let result = dispatcher
//!         .run(Domain::Companies, json!({"action": "latest", "limit": 5}))
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod normalize;
pub mod query;
pub mod transport;
