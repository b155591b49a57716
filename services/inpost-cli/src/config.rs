//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from the INPOST_CLIENT_SECRET env var or
//! client_secret_file, never stored in the TOML directly to avoid leaking it.

use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CLIENT_SECRET_ENV: &str = "INPOST_CLIENT_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub inpost: InPostConfig,
}

/// InPost Buy application settings
#[derive(Debug, Deserialize)]
pub struct InPostConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to INPOST_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub sandbox: bool,
    /// Needed for offer and order calls
    #[serde(default)]
    pub organization_id: Option<String>,
    /// Needed for the PKCE flow
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Replaces the environment's authorize endpoint
    #[serde(default)]
    pub authorize_url: Option<String>,
    /// Replaces the default scope set
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_expiry_buffer")]
    pub expiry_buffer_secs: i64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("inpost-credentials.json")
}

fn default_expiry_buffer() -> i64 {
    60
}

fn default_timeout() -> u64 {
    30
}

fn require_http_url(name: &str, value: &str) -> common::Result<()> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {value}"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. INPOST_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        let inpost = &mut config.inpost;

        if inpost.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }
        if let Some(ref uri) = inpost.redirect_uri {
            require_http_url("redirect_uri", uri)?;
        }
        if let Some(ref url) = inpost.authorize_url {
            require_http_url("authorize_url", url)?;
        }
        if inpost.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if inpost.expiry_buffer_secs < 0 {
            return Err(common::Error::Config(
                "expiry_buffer_secs must not be negative".into(),
            ));
        }

        // Env var takes precedence over file; blank counts as unset in both
        let env_secret = std::env::var(CLIENT_SECRET_ENV)
            .ok()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());
        if let Some(secret) = env_secret {
            inpost.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = inpost.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                inpost.client_secret = Some(Secret::new(secret));
            }
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("inpost-buy.toml")
    }
}

impl InPostConfig {
    pub fn client_secret(&self) -> common::Result<&str> {
        self.client_secret
            .as_ref()
            .map(|s| s.expose().as_str())
            .ok_or_else(|| {
                common::Error::Config(format!(
                    "client secret not set, use {CLIENT_SECRET_ENV} or client_secret_file"
                ))
            })
    }

    pub fn redirect_uri(&self) -> common::Result<&str> {
        self.redirect_uri
            .as_deref()
            .ok_or_else(|| common::Error::Config("redirect_uri is required for PKCE".into()))
    }

    pub fn organization_id(&self) -> common::Result<&str> {
        self.organization_id.as_deref().ok_or_else(|| {
            common::Error::Config("organization_id is required for offers and orders".into())
        })
    }
}
