//! File-backed credential storage
//!
//! Keeps the pending PKCE authorization and the current token record in one
//! JSON document. All writes use atomic temp-file + rename to prevent
//! corruption on crash. A tokio Mutex serializes writes within the process.
//!
//! The store implements both `PkceStateStore` and `TokenStore`, so a CLI can
//! start an authorization in one invocation and finish it in the next.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::http::BoxFuture;
use crate::store::{PendingAuthorization, PkceStateStore, TokenRecord, TokenStore};

/// On-disk document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingAuthorization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenRecord>,
}

/// Credential file manager.
///
/// Reads clone from the in-memory copy; every mutation rewrites the file.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<CredentialFile>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path.
    ///
    /// A missing file is a cold start with no pending authorization and no
    /// tokens; the file is created on the first write.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let file: CredentialFile = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(
                path = %path.display(),
                pending = file.pending.is_some(),
                tokens = file.tokens.is_some(),
                "loaded credentials"
            );
            file
        } else {
            info!(path = %path.display(), "credential file not found, starting with empty store");
            CredentialFile::default()
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current document.
    pub async fn snapshot(&self) -> CredentialFile {
        self.state.lock().await.clone()
    }

    /// Apply `mutate` to a copy, persist it, then publish it in memory.
    /// A failed write leaves both the file and the in-memory document as
    /// they were.
    async fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut CredentialFile),
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        mutate(&mut next);
        write_atomic(&self.path, &next).await?;
        *state = next;
        Ok(())
    }
}

impl PkceStateStore for FileCredentialStore {
    fn set_state<'a>(
        &'a self,
        state: &'a str,
        code_verifier: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.update(|file| {
                file.pending = Some(PendingAuthorization {
                    state: state.to_string(),
                    code_verifier: code_verifier.to_string(),
                });
            })
            .await?;
            debug!("stored pending authorization");
            Ok(())
        })
    }

    fn state(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .pending
                .as_ref()
                .map(|p| p.state.clone())
        })
    }

    fn code_verifier(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .pending
                .as_ref()
                .map(|p| p.code_verifier.clone())
        })
    }

    fn delete_state(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.update(|file| file.pending = None).await?;
            debug!("deleted pending authorization");
            Ok(())
        })
    }
}

impl TokenStore for FileCredentialStore {
    fn set_tokens<'a>(
        &'a self,
        access_token: &'a str,
        refresh_token: &'a str,
        expires_at: i64,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.update(|file| {
                file.tokens = Some(TokenRecord {
                    access_token: access_token.to_string(),
                    refresh_token: refresh_token.to_string(),
                    expires_at,
                });
            })
            .await?;
            debug!(expires_at, "stored token record");
            Ok(())
        })
    }

    fn access_token(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .tokens
                .as_ref()
                .map(|t| t.access_token.clone())
        })
    }

    fn refresh_token(&self) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .tokens
                .as_ref()
                .map(|t| t.refresh_token.clone())
        })
    }

    fn expires_at(&self) -> BoxFuture<'_, Option<i64>> {
        Box::pin(async move { self.state.lock().await.tokens.as_ref().map(|t| t.expires_at) })
    }
}

/// Write the credential document atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. On unix the temporary file is created with mode 0600, so
/// the tokens and the PKCE verifier are never readable by other users.
async fn write_atomic(path: &Path, data: &CredentialFile) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        Some(_) => Path::new("."),
        None => return Err(Error::Io("credential path has no parent directory".into())),
    };

    let tmp_path = dir.join(format!(".inpost-credentials.tmp.{}", std::process::id()));

    // A leftover from a crashed write may carry looser permissions
    match tokio::fs::remove_file(&tmp_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::Io(format!("removing stale temp credential file: {e}"))),
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(&tmp_path)
        .await
        .map_err(|e| Error::Io(format!("creating temp credential file: {e}")))?;
    file.write_all(json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;
    file.flush()
        .await
        .map_err(|e| Error::Io(format!("flushing temp credential file: {e}")))?;
    drop(file);

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
