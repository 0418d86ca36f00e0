//! now-query - query ServiceNow ITSM tables from JSON requests
//!
//! Reads one JSON request per invocation and prints the result as JSON on
//! stdout. Failures are reported as a JSON envelope on stderr with exit
//! code 1.
//!
//! # Configuration
//!
//! Set the following environment variables (or use `~/.claude/env`,
//! `./.claude/env` or a `.env` file):
//!
//! - `SERVICENOW_INSTANCE`: base URL of the instance
//! - `SERVICENOW_API_KEY`, or `SERVICENOW_CLIENT_ID` + `SERVICENOW_CLIENT_SECRET`,
//!   or `SERVICENOW_USERNAME` + `SERVICENOW_PASSWORD`
//!
//! # Usage
//!
//! ```bash
//! echo '{"action": "latest", "limit": 5}' | now-query companies
//! now-query cmdb --input request.json --compact
//! now-query check --connect
//! ```

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use now_query::cli::{self, Cli};
use now_query::config::Config;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load .env file if present (ignore errors if not found)
    dotenvy::dotenv().ok();

    // stdout is reserved for the JSON result
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("now_query=warn")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();

    match cli::run(cli).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            let failure = cli::failure_json(&e, &Config::env_secrets());
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&failure).unwrap_or_else(|_| failure.to_string())
            );
            ExitCode::FAILURE
        }
    }
}
