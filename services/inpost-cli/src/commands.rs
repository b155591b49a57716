//! Subcommand implementations
//!
//! Each command returns the text to print so output can be asserted in
//! tests. Token values are never part of that text except for `token`,
//! whose whole purpose is to hand one to the operator.

use std::sync::Arc;

use anyhow::{Context, Result};
use inpost_auth::endpoints;
use inpost_auth::{
    AuthorizationParams, CodeExchange, FileCredentialStore, HttpClient, PkceOAuth2Client,
    PkceTokenProvider, TokenStore,
};
use inpost_client::InPostBuyClient;
use serde_json::Value;
use tracing::info;

use crate::config::InPostConfig;

/// Everything a command needs: settings, HTTP seam and the credential file.
pub struct App {
    pub config: InPostConfig,
    pub http: Arc<dyn HttpClient>,
    pub store: Arc<FileCredentialStore>,
}

impl App {
    fn oauth(&self) -> PkceOAuth2Client {
        PkceOAuth2Client::new(self.http.clone())
    }

    fn token_url(&self) -> &'static str {
        endpoints::token_url(self.config.sandbox)
    }

    fn token_provider(&self) -> Result<PkceTokenProvider> {
        let provider = PkceTokenProvider::new(
            self.store.clone(),
            self.oauth(),
            self.config.client_id.clone(),
            self.config.client_secret()?,
            self.token_url(),
        )
        .with_expiry_buffer(self.config.expiry_buffer_secs);
        Ok(provider)
    }

    /// API client authenticated with the stored PKCE tokens. Categories do
    /// not need an organization, so it is only enforced when `needs_org`.
    fn api_client(&self, needs_org: bool) -> Result<InPostBuyClient> {
        let organization_id = if needs_org {
            self.config.organization_id()?.to_string()
        } else {
            self.config.organization_id.clone().unwrap_or_default()
        };
        Ok(InPostBuyClient::new(
            self.http.clone(),
            Arc::new(self.token_provider()?),
            organization_id,
            self.config.sandbox,
        ))
    }

    pub async fn authorize(&self) -> Result<String> {
        let start = self
            .oauth()
            .initiate_authorization(
                AuthorizationParams {
                    redirect_uri: self.config.redirect_uri()?,
                    client_id: &self.config.client_id,
                    sandbox: self.config.sandbox,
                    authorize_url_override: self.config.authorize_url.as_deref(),
                    scopes: self.config.scopes.as_deref(),
                },
                self.store.as_ref(),
            )
            .await
            .context("failed to start authorization")?;

        Ok(format!(
            "Open this URL to authorize:\n{}\n\nstate: {}",
            start.authorize_url, start.state
        ))
    }

    pub async fn exchange(&self, code: &str, state: &str) -> Result<String> {
        let tokens = self
            .oauth()
            .exchange_code_for_tokens(
                CodeExchange {
                    code,
                    redirect_uri: self.config.redirect_uri()?,
                    client_id: &self.config.client_id,
                    client_secret: self.config.client_secret()?,
                    state,
                    token_url: self.token_url(),
                },
                self.store.as_ref(),
                self.store.as_ref(),
            )
            .await
            .context("authorization code exchange failed")?;

        info!(path = %self.store.path().display(), "tokens stored");
        Ok(format!(
            "Tokens stored in {} (access token expires in {}s)",
            self.store.path().display(),
            tokens.expires_in
        ))
    }

    pub async fn token(&self) -> Result<String> {
        use inpost_auth::AccessTokenProvider;

        let token = self
            .token_provider()?
            .access_token()
            .await
            .context("failed to obtain access token")?;
        Ok(token)
    }

    pub async fn refresh(&self) -> Result<String> {
        let refresh_token = self
            .store
            .refresh_token()
            .await
            .filter(|t| !t.is_empty())
            .ok_or(inpost_auth::Error::NoRefreshToken)?;

        self.oauth()
            .refresh_access_token(
                &refresh_token,
                &self.config.client_id,
                self.config.client_secret()?,
                self.token_url(),
                self.store.as_ref(),
            )
            .await
            .context("token refresh failed")?;

        let expires_at = self.store.expires_at().await.unwrap_or_default();
        Ok(format!("Access token refreshed, expires at unix time {expires_at}"))
    }

    pub async fn categories(&self) -> Result<String> {
        let categories = self
            .api_client(false)?
            .categories()
            .await
            .context("failed to fetch categories")?;
        pretty(&categories)
    }

    pub async fn orders(&self, status: Option<&str>) -> Result<String> {
        let orders = self
            .api_client(true)?
            .orders(status)
            .await
            .context("failed to list orders")?;
        pretty(&orders)
    }

    pub async fn order(&self, id: &str) -> Result<String> {
        let order = self
            .api_client(true)?
            .order(id)
            .await
            .with_context(|| format!("failed to fetch order {id}"))?;
        match order {
            Some(order) => pretty(&order),
            None => anyhow::bail!("order {id} not found"),
        }
    }
}

fn pretty(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to format response")
}
