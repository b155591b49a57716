//! InPost Buy OAuth2 authentication library
//!
//! Provides the PKCE authorization code flow, token refresh, the
//! client-credentials grant, and pluggable storage for the pending
//! authorization and issued tokens. Usable on its own; the API client
//! consumes it through `AccessTokenProvider`.
//!
//! Flow:
//! 1. `PkceOAuth2Client::initiate_authorization` stores state + verifier
//!    and returns the redirect URL
//! 2. The callback hands `code` and `state` to `exchange_code_for_tokens`
//! 3. Tokens land in a `TokenStore` (in memory or `FileCredentialStore`)
//! 4. `PkceTokenProvider` serves them, refreshing near expiry

pub mod credentials;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod metrics;
pub mod oauth;
pub mod pkce;
pub mod provider;
pub mod store;
pub mod token;

pub use credentials::{CredentialFile, FileCredentialStore};
pub use endpoints::Environment;
pub use error::{ApiError, ApiErrorKind, Error, ErrorDetail, ErrorResponse, Result};
pub use http::{BoxFuture, HttpClient, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use oauth::{AuthorizationParams, AuthorizationStart, CodeExchange, PkceOAuth2Client};
pub use provider::{AccessTokenProvider, ClientCredentialsTokenProvider, PkceTokenProvider};
pub use store::{
    MemoryPkceStateStore, MemoryTokenStore, PendingAuthorization, PkceStateStore, TokenRecord,
    TokenStore,
};
pub use token::TokenResponse;
