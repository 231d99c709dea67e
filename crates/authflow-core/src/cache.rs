//! Token cache storage and retrieval.
//!
//! Stores the session token in `<base>/auth.json` with restricted
//! permissions (0600). Tokens are never logged or displayed in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::actions::{Dispatch, Token, TokenAction};
use crate::config::paths;
use crate::store::{SessionState, SessionStatus};

/// Token cache filename.
const TOKEN_CACHE_FILE: &str = "auth.json";

/// Persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSession {
    pub username: String,
    pub token: Token,
}

impl CachedSession {
    /// Rebuilds the in-memory session this entry was written from.
    pub fn into_state(self) -> SessionState {
        SessionState {
            status: SessionStatus::SignedIn,
            username: Some(self.username),
            token: Some(self.token),
        }
    }
}

/// On-disk location of the cached session.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the default cache path under the authflow home.
    pub fn default_path() -> PathBuf {
        paths::authflow_home().join(TOKEN_CACHE_FILE)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the cached session.
    /// Returns `None` if the file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(&self) -> Result<Option<CachedSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read token cache from {}", self.path.display())
        })?;

        serde_json::from_str(&contents)
            .map(Some)
            .with_context(|| format!("Failed to parse token cache from {}", self.path.display()))
    }

    /// Saves the session to disk with restricted permissions (0600).
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, session: &CachedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(session).context("Failed to serialize token cache")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.path, contents)
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        Ok(())
    }

    /// Removes the cached session.
    /// Returns whether a session was cached.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(true)
    }

    /// Dispatcher that mirrors token actions into this cache.
    pub fn writer(&self) -> CacheWriter {
        CacheWriter {
            cache: self.clone(),
        }
    }
}

/// Persists `ReceiveToken` and removes the cache on `DiscardToken`.
///
/// Dispatch cannot fail, so I/O errors are logged and dropped.
#[derive(Debug, Clone)]
pub struct CacheWriter {
    cache: TokenCache,
}

impl Dispatch for CacheWriter {
    fn dispatch(&self, action: TokenAction) {
        match action {
            TokenAction::ReceiveToken { username, token } => {
                let session = CachedSession { username, token };
                if let Err(e) = self.cache.save(&session) {
                    tracing::warn!("Could not persist token: {e:#}");
                }
            }
            TokenAction::DiscardToken => {
                if let Err(e) = self.cache.clear() {
                    tracing::warn!("Could not remove cached token: {e:#}");
                }
            }
            TokenAction::FetchToken { .. } => {}
        }
    }
}
