//! InPost Buy operator CLI
//!
//! Drives the PKCE authorization flow against a credential file and calls
//! the InPost Buy API with the stored tokens:
//! 1. `authorize` prints the URL to open and stores the pending state
//! 2. `exchange` trades the callback's code for tokens
//! 3. `token`, `refresh` and the API commands reuse the stored tokens

mod commands;
mod config;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use inpost_auth::{FileCredentialStore, ReqwestHttpClient};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::App;
use crate::config::Config;

#[derive(Parser)]
#[command(name = "inpost-buy", about = "InPost Buy API client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (falls back to CONFIG_PATH, then inpost-buy.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a PKCE authorization and print the URL to open.
    Authorize,
    /// Exchange the authorization code from the redirect callback.
    Exchange {
        #[arg(long)]
        code: String,
        #[arg(long)]
        state: String,
    },
    /// Print a valid access token, refreshing it when stale.
    Token,
    /// Refresh the access token now.
    Refresh,
    /// List the category tree.
    Categories,
    /// List orders.
    Orders {
        /// Filter by order status.
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one order.
    Order { id: String },
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

async fn build_app(cli: &Cli) -> Result<App> {
    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?
        .inpost;

    info!(
        client_id = %config.client_id,
        sandbox = config.sandbox,
        credentials = %config.credentials_path.display(),
        "configuration loaded"
    );

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let http = ReqwestHttpClient::new(client).with_timeout(Duration::from_secs(config.timeout_secs));

    let store = FileCredentialStore::load(config.credentials_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load credentials from {}",
                config.credentials_path.display()
            )
        })?;

    Ok(App {
        config,
        http: Arc::new(http),
        store: Arc::new(store),
    })
}

async fn run(cli: Cli) -> Result<String> {
    let app = build_app(&cli).await?;
    match cli.command {
        Commands::Authorize => app.authorize().await,
        Commands::Exchange { code, state } => app.exchange(&code, &state).await,
        Commands::Token => app.token().await,
        Commands::Refresh => app.refresh().await,
        Commands::Categories => app.categories().await,
        Commands::Orders { status } => app.orders(status.as_deref()).await,
        Commands::Order { id } => app.order(&id).await,
    }
}

/// Retry hint for rate-limited or failing upstream calls.
fn retry_hint(err: &anyhow::Error) -> Option<String> {
    let auth_err = err
        .chain()
        .find_map(|e| e.downcast_ref::<inpost_auth::Error>())?;
    if !auth_err.is_retryable() {
        return None;
    }
    Some(match auth_err.retry_after() {
        Some(delay) => format!("retryable, server suggests waiting {}s", delay.as_secs()),
        None => "retryable, try again later".to_string(),
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_telemetry(&cli);

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            if let Some(hint) = retry_hint(&err) {
                eprintln!("{hint}");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inpost_auth::{ApiError, HttpResponse};
    use std::collections::HashMap;

    fn api_error(status: u16, retry_after: Option<&str>) -> anyhow::Error {
        let mut headers = HashMap::new();
        if let Some(v) = retry_after {
            headers.insert("retry-after".to_string(), v.to_string());
        }
        let response = HttpResponse {
            status,
            body: String::new(),
            headers,
        };
        anyhow::Error::new(inpost_auth::Error::from(ApiError::from_response(
            &response, "API error",
        )))
        .context("failed to list orders")
    }

    #[test]
    fn cli_parses_exchange_arguments() {
        let cli = Cli::try_parse_from([
            "inpost-buy",
            "--config",
            "/etc/inpost.toml",
            "exchange",
            "--code",
            "c-1",
            "--state",
            "s-1",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("/etc/inpost.toml"));
        assert!(matches!(
            cli.command,
            Commands::Exchange { ref code, ref state } if code == "c-1" && state == "s-1"
        ));
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["inpost-buy", "orders", "--status", "NEW", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        assert_eq!(cli.log_level, "warn");
        assert!(matches!(cli.command, Commands::Orders { status: Some(ref s) } if s == "NEW"));
    }

    #[test]
    fn exchange_requires_code_and_state() {
        assert!(Cli::try_parse_from(["inpost-buy", "exchange", "--code", "c"]).is_err());
    }

    #[test]
    fn retry_hint_reports_server_delay() {
        let hint = retry_hint(&api_error(429, Some("12"))).unwrap();
        assert!(hint.contains("12s"));
    }

    #[test]
    fn retry_hint_without_delay() {
        let hint = retry_hint(&api_error(503, None)).unwrap();
        assert_eq!(hint, "retryable, try again later");
    }

    #[test]
    fn no_retry_hint_for_client_errors() {
        assert!(retry_hint(&api_error(400, None)).is_none());
        assert!(retry_hint(&anyhow::anyhow!("plain failure")).is_none());
    }
}
