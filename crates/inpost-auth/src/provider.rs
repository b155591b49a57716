//! Access-token providers consumed by the API client
//!
//! `ClientCredentialsTokenProvider` serves the server-to-server grant and
//! `PkceTokenProvider` serves tokens obtained through the PKCE flow,
//! refreshing them shortly before they expire.

use std::sync::Arc;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ApiError, Error, Result};
use crate::http::{BoxFuture, HttpClient, HttpRequest};
use crate::metrics::{GRANT_CLIENT_CREDENTIALS, record_token_request};
use crate::oauth::PkceOAuth2Client;
use crate::store::TokenStore;
use crate::token::{TokenFields, now_unix};

/// Seconds before `expires_at` at which a stored token is treated as stale.
pub const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;

/// Yields a bearer token for API requests.
pub trait AccessTokenProvider: Send + Sync {
    fn access_token(&self) -> BoxFuture<'_, Result<String>>;
}

/// Client-credentials grant with an in-memory cache.
///
/// The first call hits the token endpoint; later calls reuse the cached
/// token for the provider's lifetime. `expires_in` is ignored.
pub struct ClientCredentialsTokenProvider {
    http: Arc<dyn HttpClient>,
    token_url: String,
    client_id: String,
    client_secret: Secret<String>,
    cache: Mutex<Option<String>>,
}

impl ClientCredentialsTokenProvider {
    pub fn new(
        http: Arc<dyn HttpClient>,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            cache: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<String> {
        let request = HttpRequest::form(
            self.token_url.as_str(),
            &[
                ("grant_type", "client_credentials"),
                ("client_id", &self.client_id),
                ("client_secret", self.client_secret.expose()),
            ],
        );

        let response = self.http.send(request).await.inspect_err(|_| {
            record_token_request(GRANT_CLIENT_CREDENTIALS, false);
        })?;

        if response.is_error() {
            record_token_request(GRANT_CLIENT_CREDENTIALS, false);
            warn!(status = response.status, "client credentials grant rejected");
            return Err(ApiError::from_response(&response, "OAuth2 token request failed").into());
        }
        record_token_request(GRANT_CLIENT_CREDENTIALS, true);

        let fields = TokenFields::parse(&response.body, "OAuth2 token response")?;
        if fields.access_token.is_empty() {
            return Err(Error::MalformedResponse(
                "missing access_token in OAuth2 response".into(),
            ));
        }

        info!(client_id = %self.client_id, "client credentials token obtained");
        Ok(fields.access_token)
    }
}

impl AccessTokenProvider for ClientCredentialsTokenProvider {
    fn access_token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            // Lock held across the fetch so concurrent first callers share one request
            let mut cache = self.cache.lock().await;
            if let Some(token) = cache.as_ref() {
                return Ok(token.clone());
            }
            let token = self.fetch().await?;
            *cache = Some(token.clone());
            Ok(token)
        })
    }
}

/// Serves tokens from a `TokenStore`, refreshing when they are about to expire.
pub struct PkceTokenProvider {
    token_store: Arc<dyn TokenStore>,
    client: PkceOAuth2Client,
    client_id: String,
    client_secret: Secret<String>,
    token_url: String,
    expiry_buffer_secs: i64,
}

impl PkceTokenProvider {
    pub fn new(
        token_store: Arc<dyn TokenStore>,
        client: PkceOAuth2Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            token_store,
            client,
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret.into()),
            token_url: token_url.into(),
            expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
        }
    }

    pub fn with_expiry_buffer(mut self, secs: i64) -> Self {
        self.expiry_buffer_secs = secs;
        self
    }

    async fn current_or_refreshed(&self) -> Result<String> {
        let access_token = self.token_store.access_token().await;
        let expires_at = self.token_store.expires_at().await;

        if let (Some(token), Some(expires_at)) = (access_token, expires_at)
            && !token.is_empty()
            && now_unix() < expires_at.saturating_sub(self.expiry_buffer_secs)
        {
            return Ok(token);
        }

        let refresh_token = self
            .token_store
            .refresh_token()
            .await
            .filter(|t| !t.is_empty())
            .ok_or(Error::NoRefreshToken)?;

        debug!(buffer_secs = self.expiry_buffer_secs, "access token stale, refreshing");
        self.client
            .refresh_access_token(
                &refresh_token,
                &self.client_id,
                self.client_secret.expose(),
                &self.token_url,
                self.token_store.as_ref(),
            )
            .await
    }
}

impl AccessTokenProvider for PkceTokenProvider {
    fn access_token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.current_or_refreshed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedHttpClient;
    use crate::oauth::{AuthorizationParams, CodeExchange};
    use crate::store::{MemoryPkceStateStore, MemoryTokenStore, TokenRecord};

    const TOKEN_URL: &str = "https://token.example/token";

    fn pkce_provider(
        http: &Arc<ScriptedHttpClient>,
        store: &Arc<MemoryTokenStore>,
    ) -> PkceTokenProvider {
        PkceTokenProvider::new(
            store.clone(),
            PkceOAuth2Client::new(http.clone()),
            "cid",
            "secret",
            TOKEN_URL,
        )
    }

    #[tokio::test]
    async fn client_credentials_fetches_once_and_caches() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(200, r#"{"access_token":"cc-token","expires_in":5}"#);
        let provider = ClientCredentialsTokenProvider::new(http.clone(), TOKEN_URL, "cid", "secret");

        assert_eq!(provider.access_token().await.unwrap(), "cc-token");
        assert_eq!(provider.access_token().await.unwrap(), "cc-token");
        assert_eq!(http.calls(), 1);

        let form = http.form_fields(0);
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(form["client_id"], "cid");
        assert_eq!(form["client_secret"], "secret");
    }

    #[tokio::test]
    async fn client_credentials_concurrent_callers_share_one_request() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(200, r#"{"access_token":"cc-token"}"#);
        let provider = Arc::new(ClientCredentialsTokenProvider::new(
            http.clone(),
            TOKEN_URL,
            "cid",
            "secret",
        ));

        let a = provider.clone();
        let b = provider.clone();
        let (ra, rb) = tokio::join!(a.access_token(), b.access_token());
        assert_eq!(ra.unwrap(), "cc-token");
        assert_eq!(rb.unwrap(), "cc-token");
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn client_credentials_error_is_not_cached() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(401, r#"{"errorCode":"invalid_client","errorMessage":"Bad secret"}"#);
        http.push(200, r#"{"access_token":"cc-token"}"#);
        let provider = ClientCredentialsTokenProvider::new(http.clone(), TOKEN_URL, "cid", "secret");

        let err = provider.access_token().await.unwrap_err();
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "Bad secret (HTTP 401)");

        assert_eq!(provider.access_token().await.unwrap(), "cc-token");
        assert_eq!(http.calls(), 2);
    }

    #[tokio::test]
    async fn client_credentials_requires_access_token() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(200, r#"{"token_type":"Bearer"}"#);
        let provider = ClientCredentialsTokenProvider::new(http, TOKEN_URL, "cid", "secret");

        let err = provider.access_token().await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn pkce_provider_returns_fresh_token_without_network() {
        let http = Arc::new(ScriptedHttpClient::new());
        let store = Arc::new(MemoryTokenStore::with_record(TokenRecord {
            access_token: "stored-at".into(),
            refresh_token: "stored-rt".into(),
            expires_at: now_unix() + 3600,
        }));

        let token = pkce_provider(&http, &store).access_token().await.unwrap();

        assert_eq!(token, "stored-at");
        assert_eq!(http.calls(), 0);
    }

    #[tokio::test]
    async fn pkce_provider_refreshes_inside_expiry_buffer() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(200, r#"{"access_token":"fresh-at","expires_in":3600}"#);
        let store = Arc::new(MemoryTokenStore::with_record(TokenRecord {
            access_token: "stale-at".into(),
            refresh_token: "stored-rt".into(),
            // still valid, but within the 60s buffer
            expires_at: now_unix() + 30,
        }));

        let token = pkce_provider(&http, &store).access_token().await.unwrap();

        assert_eq!(token, "fresh-at");
        assert_eq!(http.calls(), 1);
        assert_eq!(http.form_fields(0)["refresh_token"], "stored-rt");
        let record = store.record().await.unwrap();
        assert_eq!(record.access_token, "fresh-at");
        assert_eq!(record.refresh_token, "stored-rt");
    }

    #[tokio::test]
    async fn pkce_provider_refreshes_exactly_at_buffer_boundary() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(200, r#"{"access_token":"fresh-at","expires_in":3600}"#);
        let store = Arc::new(MemoryTokenStore::with_record(TokenRecord {
            access_token: "edge-at".into(),
            refresh_token: "stored-rt".into(),
            // now == expires_at - buffer; the clock only moves forward from here
            expires_at: now_unix() + DEFAULT_EXPIRY_BUFFER_SECS,
        }));

        let token = pkce_provider(&http, &store).access_token().await.unwrap();

        assert_eq!(token, "fresh-at");
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn pkce_provider_extreme_expiry_does_not_overflow() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(200, r#"{"access_token":"fresh-at","expires_in":3600}"#);
        let store = Arc::new(MemoryTokenStore::with_record(TokenRecord {
            access_token: "stored-at".into(),
            refresh_token: "stored-rt".into(),
            expires_at: i64::MIN,
        }));

        let token = pkce_provider(&http, &store).access_token().await.unwrap();
        assert_eq!(token, "fresh-at");

        let far_future = Arc::new(MemoryTokenStore::with_record(TokenRecord {
            access_token: "stored-at".into(),
            refresh_token: "stored-rt".into(),
            expires_at: i64::MAX,
        }));
        let provider = pkce_provider(&http, &far_future).with_expiry_buffer(-1);
        assert_eq!(provider.access_token().await.unwrap(), "stored-at");
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn pkce_provider_honours_custom_buffer() {
        let http = Arc::new(ScriptedHttpClient::new());
        let store = Arc::new(MemoryTokenStore::with_record(TokenRecord {
            access_token: "stored-at".into(),
            refresh_token: "stored-rt".into(),
            expires_at: now_unix() + 30,
        }));

        let provider = pkce_provider(&http, &store).with_expiry_buffer(10);

        assert_eq!(provider.access_token().await.unwrap(), "stored-at");
        assert_eq!(http.calls(), 0);
    }

    #[tokio::test]
    async fn pkce_provider_without_refresh_token_errors() {
        let http = Arc::new(ScriptedHttpClient::new());
        let store = Arc::new(MemoryTokenStore::new());

        let err = pkce_provider(&http, &store).access_token().await.unwrap_err();

        assert!(matches!(err, Error::NoRefreshToken));
        assert_eq!(http.calls(), 0);
    }

    #[tokio::test]
    async fn pkce_provider_treats_empty_refresh_token_as_missing() {
        let http = Arc::new(ScriptedHttpClient::new());
        let store = Arc::new(MemoryTokenStore::with_record(TokenRecord {
            access_token: "expired".into(),
            refresh_token: String::new(),
            expires_at: 0,
        }));

        let err = pkce_provider(&http, &store).access_token().await.unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
    }

    #[tokio::test]
    async fn full_flow_from_authorization_to_refresh() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(200, r#"{"access_token":"at-1","refresh_token":"rt-1","expires_in":0}"#);
        http.push(200, r#"{"access_token":"at-2","refresh_token":"rt-2","expires_in":3600}"#);
        let oauth = PkceOAuth2Client::new(http.clone());
        let states = MemoryPkceStateStore::new();
        let tokens = Arc::new(MemoryTokenStore::new());

        let start = oauth
            .initiate_authorization(
                AuthorizationParams {
                    redirect_uri: "https://example.com/cb",
                    client_id: "cid",
                    sandbox: true,
                    authorize_url_override: None,
                    scopes: None,
                },
                &states,
            )
            .await
            .unwrap();

        oauth
            .exchange_code_for_tokens(
                CodeExchange {
                    code: "code",
                    redirect_uri: "https://example.com/cb",
                    client_id: "cid",
                    client_secret: "secret",
                    state: &start.state,
                    token_url: TOKEN_URL,
                },
                &states,
                tokens.as_ref(),
            )
            .await
            .unwrap();
        assert!(states.pending().await.is_none());

        // expires_in of 0 means the token is already stale
        let provider = pkce_provider(&http, &tokens);
        assert_eq!(provider.access_token().await.unwrap(), "at-2");
        assert_eq!(provider.access_token().await.unwrap(), "at-2");
        assert_eq!(http.calls(), 2);
        assert_eq!(tokens.refresh_token().await.as_deref(), Some("rt-2"));
    }
}
