//! Command line surface.
//!
//! Each domain is a subcommand that reads one JSON object (from `--input` or
//! stdin) and prints one JSON value. `check` validates the configuration and
//! optionally probes the instance.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};

use crate::client::ServiceNowClient;
use crate::config::Config;
use crate::dispatch::{Dispatcher, Domain, RequestSpec};
use crate::error::NowError;

/// Query ServiceNow ITSM tables with JSON requests.
#[derive(Debug, Parser)]
#[command(name = "now-query", version, about)]
pub struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands: one per domain plus `check`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Query incidents.
    Incidents(QueryArgs),
    /// Query change requests.
    Changes(QueryArgs),
    /// Query problems.
    Problems(QueryArgs),
    /// Query the service catalog.
    Catalog(QueryArgs),
    /// Query configuration items and relationships.
    Cmdb(QueryArgs),
    /// Query companies.
    Companies(QueryArgs),
    /// Validate configuration.
    Check {
        /// Also read one record to confirm the instance accepts the credentials.
        #[arg(long)]
        connect: bool,
    },
}

impl Command {
    /// The domain and arguments of a query subcommand.
    pub fn query(&self) -> Option<(Domain, &QueryArgs)> {
        match self {
            Command::Incidents(args) => Some((Domain::Incidents, args)),
            Command::Changes(args) => Some((Domain::Changes, args)),
            Command::Problems(args) => Some((Domain::Problems, args)),
            Command::Catalog(args) => Some((Domain::Catalog, args)),
            Command::Cmdb(args) => Some((Domain::Cmdb, args)),
            Command::Companies(args) => Some((Domain::Companies, args)),
            Command::Check { .. } => None,
        }
    }
}

/// Arguments shared by every domain subcommand.
#[derive(Debug, Clone, Default, Args)]
pub struct QueryArgs {
    /// Read the request from a file instead of stdin.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Print compact JSON instead of pretty-printed.
    #[arg(long)]
    pub compact: bool,
}

impl QueryArgs {
    /// Reads and parses the request document.
    ///
    /// # Errors
    ///
    /// Returns `NowError::Validation` when the input cannot be read or is
    /// not valid JSON.
    pub fn read_input(&self) -> Result<Value, NowError> {
        let text = match &self.input {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                NowError::validation(format!("failed to read {}: {}", path.display(), e))
            })?,
            None => {
                let mut text = String::new();
                std::io::stdin()
                    .read_to_string(&mut text)
                    .map_err(|e| NowError::validation(format!("failed to read stdin: {}", e)))?;
                text
            }
        };
        parse_input(&text)
    }
}

/// Parses a request document. Blank input is the empty object.
///
/// # Errors
///
/// Returns `NowError::Validation` for malformed JSON.
pub fn parse_input(text: &str) -> Result<Value, NowError> {
    if text.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(text)
        .map_err(|e| NowError::validation(format!("Invalid JSON input: {}", e)))
}

/// Runs the parsed command line and returns the text to print on stdout.
///
/// # Errors
///
/// Returns any failure, with context, for [`failure_json`] to report.
pub async fn run(cli: Cli) -> anyhow::Result<String> {
    match cli.command.query() {
        Some((domain, args)) => {
            let input = args.read_input()?;
            query(domain, input, args.compact).await
        }
        None => {
            let connect = matches!(cli.command, Command::Check { connect: true });
            check(connect).await
        }
    }
}

/// Validates `input` for `domain`, then loads configuration and executes it.
///
/// Validation runs first so a malformed request fails without credentials
/// or network access.
///
/// # Errors
///
/// Returns validation, configuration, or request failures.
pub async fn query(domain: Domain, input: Value, compact: bool) -> anyhow::Result<String> {
    let spec = RequestSpec::parse(domain, input)?;

    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::debug!(
        instance = %config.instance,
        auth = config.credentials.scheme(),
        "Configuration loaded"
    );

    let client = ServiceNowClient::new(&config).context("Failed to create ServiceNow client")?;
    let result = Dispatcher::new(client).execute(&spec).await?;

    let text = if compact {
        serde_json::to_string(&result)
    } else {
        serde_json::to_string_pretty(&result)
    };
    Ok(text.map_err(NowError::from)?)
}

async fn check(connect: bool) -> anyhow::Result<String> {
    let config = Config::from_env().context("Failed to load configuration")?;

    let message = if connect {
        let client =
            ServiceNowClient::new(&config).context("Failed to create ServiceNow client")?;
        client
            .test_connection()
            .await
            .context("Connection test failed")?;
        "Connected to ServiceNow"
    } else {
        "Configuration is valid"
    };

    let report = json!({
        "status": "ok",
        "message": message,
        "instance": config.instance,
    });
    Ok(serde_json::to_string_pretty(&report).map_err(NowError::from)?)
}

/// Builds the failure envelope written to stderr.
///
/// The message includes the context chain. When the root cause is a
/// [`NowError`], its structured detail is included. Every secret is
/// replaced with `[REDACTED]`.
pub fn failure_json<S: AsRef<str>>(err: &anyhow::Error, secrets: &[S]) -> Value {
    let message = NowError::sanitize_message(&format!("{:#}", err), secrets);
    let detail = err
        .downcast_ref::<NowError>()
        .map(|e| e.detail(secrets))
        .unwrap_or_else(|| json!({}));

    json!({
        "error": {
            "message": message,
            "detail": detail,
        },
        "status": "failure",
    })
}
