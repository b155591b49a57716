//! OAuth2 Authorization Code flow with PKCE
//!
//! Three independent operations drive the flow:
//! 1. `initiate_authorization` stores a fresh `state`/`code_verifier` pair
//!    and returns the browser redirect URL (no network call)
//! 2. `exchange_code_for_tokens` verifies the returned `state`, trades the
//!    code for tokens and consumes the pending pair whatever the outcome
//! 3. `refresh_access_token` trades a refresh token for a new access token
//!
//! Only one pending authorization exists per state store; initiating again
//! overwrites it. Token records always overwrite the previous one.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::endpoints;
use crate::error::{ApiError, Error, Result};
use crate::http::{HttpClient, HttpRequest};
use crate::metrics::{GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, record_token_request};
use crate::pkce::{
    AuthorizationRequest, CODE_VERIFIER_LENGTH, STATE_LENGTH, build_authorization_url,
    compute_code_challenge, constant_time_eq, generate_random_string,
};
use crate::store::{PkceStateStore, TokenStore};
use crate::token::{TokenFields, TokenResponse, now_unix};

/// `expires_in` assumed for refresh responses that omit it.
pub const DEFAULT_REFRESH_EXPIRES_IN: i64 = 3600;

/// Inputs for `initiate_authorization`.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationParams<'a> {
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    pub sandbox: bool,
    /// Replaces the environment's authorize endpoint
    pub authorize_url_override: Option<&'a str>,
    /// Replaces `DEFAULT_SCOPES`
    pub scopes: Option<&'a [String]>,
}

/// Redirect target and the `state` the callback must echo back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationStart {
    pub authorize_url: String,
    pub state: String,
}

/// Inputs for `exchange_code_for_tokens`.
#[derive(Clone, Copy)]
pub struct CodeExchange<'a> {
    pub code: &'a str,
    pub redirect_uri: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    /// `state` received on the redirect callback
    pub state: &'a str,
    pub token_url: &'a str,
}

/// Client for the PKCE authorization code grant.
#[derive(Clone)]
pub struct PkceOAuth2Client {
    http: Arc<dyn HttpClient>,
}

impl PkceOAuth2Client {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Start an authorization: generate and store the PKCE pair, return the
    /// URL to redirect the user to.
    pub async fn initiate_authorization(
        &self,
        params: AuthorizationParams<'_>,
        state_store: &dyn PkceStateStore,
    ) -> Result<AuthorizationStart> {
        let state = generate_random_string(STATE_LENGTH);
        let code_verifier = generate_random_string(CODE_VERIFIER_LENGTH);
        let code_challenge = compute_code_challenge(&code_verifier);

        state_store.set_state(&state, &code_verifier).await?;

        let authorize_url = endpoints::authorize_url(params.sandbox, params.authorize_url_override);
        let scope = match params.scopes {
            Some(scopes) => scopes.join(" "),
            None => endpoints::default_scope_string(),
        };

        let url = build_authorization_url(&AuthorizationRequest {
            authorize_url: &authorize_url,
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            scope: &scope,
            state: &state,
            code_challenge: &code_challenge,
        });

        info!(
            client_id = params.client_id,
            sandbox = params.sandbox,
            "PKCE authorization initiated"
        );
        Ok(AuthorizationStart {
            authorize_url: url,
            state,
        })
    }

    /// Exchange an authorization code for tokens.
    ///
    /// The supplied `state` must match the stored one (constant-time); on a
    /// mismatch the token endpoint is never called. Once the endpoint has
    /// been called the pending pair is deleted whether or not the exchange
    /// succeeds, so a state/verifier pair is never replayed.
    pub async fn exchange_code_for_tokens(
        &self,
        exchange: CodeExchange<'_>,
        state_store: &dyn PkceStateStore,
        token_store: &dyn TokenStore,
    ) -> Result<TokenResponse> {
        let stored_state = state_store.state().await;
        match stored_state {
            Some(ref stored) if constant_time_eq(stored, exchange.state) => {}
            _ => {
                warn!(
                    stored = stored_state.is_some(),
                    "PKCE state mismatch, refusing code exchange"
                );
                return Err(Error::StateMismatch);
            }
        }

        let code_verifier = state_store
            .code_verifier()
            .await
            .ok_or(Error::MissingVerifier)?;

        let request = HttpRequest::form(
            exchange.token_url,
            &[
                ("grant_type", "authorization_code"),
                ("code", exchange.code),
                ("redirect_uri", exchange.redirect_uri),
                ("client_id", exchange.client_id),
                ("client_secret", exchange.client_secret),
                ("code_verifier", &code_verifier),
            ],
        );

        let response = match self.http.send(request).await {
            Ok(response) => response,
            Err(e) => {
                record_token_request(GRANT_AUTHORIZATION_CODE, false);
                discard_pending(state_store).await;
                return Err(e);
            }
        };

        if response.is_error() {
            record_token_request(GRANT_AUTHORIZATION_CODE, false);
            warn!(status = response.status, "token exchange rejected");
            discard_pending(state_store).await;
            return Err(ApiError::from_response(&response, "OAuth2 token exchange failed").into());
        }

        state_store.delete_state().await?;
        record_token_request(GRANT_AUTHORIZATION_CODE, true);

        let fields = TokenFields::parse(&response.body, "OAuth2 token response")?;
        let refresh_token = fields.refresh_token.unwrap_or_default();
        if fields.access_token.is_empty() || refresh_token.is_empty() {
            return Err(Error::MalformedResponse(
                "missing access_token or refresh_token in OAuth2 response".into(),
            ));
        }
        let expires_in = fields.expires_in.unwrap_or(0);

        token_store
            .set_tokens(
                &fields.access_token,
                &refresh_token,
                now_unix().saturating_add(expires_in),
            )
            .await?;

        info!(expires_in, "tokens issued from authorization code");
        Ok(TokenResponse {
            access_token: fields.access_token,
            refresh_token,
            expires_in,
        })
    }

    /// Refresh the access token and persist the new record.
    ///
    /// Servers may not rotate refresh tokens: when the response omits one,
    /// the original is stored again. Returns only the new access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
        token_url: &str,
        token_store: &dyn TokenStore,
    ) -> Result<String> {
        let request = HttpRequest::form(
            token_url,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
        );

        let response = self.http.send(request).await.inspect_err(|_| {
            record_token_request(GRANT_REFRESH_TOKEN, false);
        })?;

        if response.is_error() {
            record_token_request(GRANT_REFRESH_TOKEN, false);
            warn!(status = response.status, "token refresh rejected");
            return Err(ApiError::from_response(&response, "OAuth2 token refresh failed").into());
        }
        record_token_request(GRANT_REFRESH_TOKEN, true);

        let fields = TokenFields::parse(&response.body, "OAuth2 refresh response")?;
        if fields.access_token.is_empty() {
            return Err(Error::MalformedResponse(
                "missing access_token in OAuth2 refresh response".into(),
            ));
        }

        let rotated = fields.refresh_token.filter(|t| !t.is_empty());
        let effective_refresh = rotated.as_deref().unwrap_or(refresh_token);
        if effective_refresh.is_empty() {
            return Err(Error::MalformedResponse(
                "no refresh token in OAuth2 refresh response".into(),
            ));
        }
        let expires_in = fields.expires_in.unwrap_or(DEFAULT_REFRESH_EXPIRES_IN);

        token_store
            .set_tokens(
                &fields.access_token,
                effective_refresh,
                now_unix().saturating_add(expires_in),
            )
            .await?;

        info!(
            expires_in,
            rotated = rotated.is_some(),
            "access token refreshed"
        );
        Ok(fields.access_token)
    }
}

/// Delete the pending pair on a failed exchange. The exchange error is what
/// the caller needs to see, so a delete failure is only logged.
async fn discard_pending(state_store: &dyn PkceStateStore) {
    match state_store.delete_state().await {
        Ok(()) => debug!("discarded pending authorization after failed exchange"),
        Err(e) => warn!(error = %e, "failed to discard pending authorization"),
    }
}
