//! Persistence seams for the PKCE flow
//!
//! `PkceStateStore` holds the single pending authorization (`state` plus
//! `code_verifier`) between the redirect and the code exchange.
//! `TokenStore` holds the single current token record. Both are supplied by
//! the host; this module also ships in-memory implementations.
//!
//! The core does not serialise access across callers. Hosts serving
//! concurrent requests must make their store implementation the single
//! authority (locking or compare-and-swap) so two refreshes cannot overwrite
//! each other's fresher token.

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::http::BoxFuture;

/// Pending authorization created by `initiate_authorization`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub code_verifier: String,
}

/// Current OAuth credential pair.
///
/// `expires_at` is an absolute unix timestamp in seconds, computed from the
/// local clock plus the server's `expires_in` at issuance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Storage for the pending PKCE `state` and `code_verifier`.
pub trait PkceStateStore: Send + Sync {
    /// Persist a new pending authorization, replacing any previous one.
    fn set_state<'a>(&'a self, state: &'a str, code_verifier: &'a str)
    -> BoxFuture<'a, Result<()>>;

    fn state(&self) -> BoxFuture<'_, Option<String>>;

    fn code_verifier(&self) -> BoxFuture<'_, Option<String>>;

    /// Remove the pending authorization after an exchange attempt.
    fn delete_state(&self) -> BoxFuture<'_, Result<()>>;
}

/// Storage for the current access/refresh token pair.
pub trait TokenStore: Send + Sync {
    /// Overwrite the stored record.
    fn set_tokens<'a>(
        &'a self,
        access_token: &'a str,
        refresh_token: &'a str,
        expires_at: i64,
    ) -> BoxFuture<'a, Result<()>>;

    fn access_token(&self) -> BoxFuture<'_, Option<String>>;

    fn refresh_token(&self) -> BoxFuture<'_, Option<String>>;

    fn expires_at(&self) -> BoxFuture<'_, Option<i64>>;
}

/// In-process `PkceStateStore`.
#[derive(Debug, Default)]
pub struct MemoryPkceStateStore {
    pending: Mutex<Option<PendingAuthorization>>,
}

impl MemoryPkceStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a pending authorization.
    pub fn with_pending(state: impl Into<String>, code_verifier: impl Into<String>) -> Self {
        Self {
            pending: Mutex::new(Some(PendingAuthorization {
                state: state.into(),
                code_verifier: code_verifier.into(),
            })),
        }
    }

    pub async fn pending(&self) -> Option<PendingAuthorization> {
        self.pending.lock().await.clone()
    }
}

impl PkceStateStore for MemoryPkceStateStore {
    fn set_state<'a>(
        &'a self,
        state: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            *self.pending.lock().await = Some(PendingAuthorization {
                state: state.to_string(),
                code_verifier: code_verifier.to_string(),
            });
            Ok(())
        })
    }

    fn state(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move { self.pending.lock().await.as_ref().map(|p| p.state.clone()) })
    }

    fn code_verifier(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            self.pending
                .lock()
                .await
                .as_ref()
                .map(|p| p.code_verifier.clone())
        })
    }

    fn delete_state(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.pending.lock().await.take();
            Ok(())
        })
    }
}

/// In-process `TokenStore`.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: Mutex<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }

    pub async fn record(&self) -> Option<TokenRecord> {
        self.record.lock().await.clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn set_tokens<'a>(
        &'a self,
        access_token: &'a str,
        refresh_token: &'a str,
        expires_at: i64,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            *self.record.lock().await = Some(TokenRecord {
                access_token: access_token.to_string(),
                refresh_token: refresh_token.to_string(),
                expires_at,
            });
            Ok(())
        })
    }

    fn access_token(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            self.record
                .lock()
                .await
                .as_ref()
                .map(|r| r.access_token.clone())
        })
    }

    fn refresh_token(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            self.record
                .lock()
                .await
                .as_ref()
                .map(|r| r.refresh_token.clone())
        })
    }

    fn expires_at(&self) -> BoxFuture<'_, Option<i64>> {
        Box::pin(async move { self.record.lock().await.as_ref().map(|r| r.expires_at) })
    }
}
