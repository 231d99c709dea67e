//! User-session collaborator.
//!
//! The login flow only triggers `fetch_user`/`discard_user`; what those do
//! is up to the implementation. [`ApiUserSession`] loads the current user
//! from the API in a background task, so a slow or failing user lookup
//! never holds up or fails a login.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::http::HttpClient;
use crate::store::SessionStore;

/// Path of the current-user endpoint, relative to the API base URL.
pub const USER_PATH: &str = "/users";

/// Triggers invoked by the login flow around token changes.
pub trait UserSession {
    /// Called right after a token for `username` was published.
    fn fetch_user(&self, username: &str);

    /// Called right before the token is discarded.
    fn discard_user(&self);
}

impl<T: UserSession + ?Sized> UserSession for &T {
    fn fetch_user(&self, username: &str) {
        (**self).fetch_user(username);
    }

    fn discard_user(&self) {
        (**self).discard_user();
    }
}

impl<T: UserSession + ?Sized> UserSession for Arc<T> {
    fn fetch_user(&self, username: &str) {
        (**self).fetch_user(username);
    }

    fn discard_user(&self) {
        (**self).discard_user();
    }
}

/// Fetches `GET {base}/users` with the session token once logged in.
pub struct ApiUserSession<C> {
    base_url: String,
    client: C,
    store: Arc<SessionStore>,
    user: Arc<Mutex<UserSlot>>,
    pending: Mutex<Vec<JoinHandle<Result<serde_json::Value>>>>,
}

/// Loaded user plus the number of discards seen so far.
///
/// A fetch only stores its result if no discard happened since it started.
#[derive(Default)]
struct UserSlot {
    epoch: u64,
    user: Option<serde_json::Value>,
}

impl<C> ApiUserSession<C>
where
    C: HttpClient + Clone + Send + Sync + 'static,
{
    /// `store` is read for the token to authenticate the user request.
    pub fn new(base_url: impl Into<String>, client: C, store: Arc<SessionStore>) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            store,
            user: Arc::new(Mutex::new(UserSlot::default())),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Full URL of the current-user endpoint.
    pub fn user_url(&self) -> String {
        format!("{}{USER_PATH}", self.base_url.trim_end_matches('/'))
    }

    /// Last successfully fetched user, if any.
    pub fn user(&self) -> Option<serde_json::Value> {
        lock(&self.user).user.clone()
    }

    /// Waits for outstanding fetches and returns the outcome of the last one.
    ///
    /// Returns `Ok(None)` when nothing was in flight or the last fetch was
    /// aborted by `discard_user`.
    ///
    /// # Errors
    /// Returns the error of the last fetch if it failed.
    pub async fn settle(&self) -> Result<Option<serde_json::Value>> {
        let handles = std::mem::take(&mut *lock(&self.pending));
        let mut last = Ok(None);
        for handle in handles {
            last = match handle.await {
                Ok(result) => result.map(Some),
                Err(e) if e.is_cancelled() => Ok(None),
                Err(e) => Err(e).context("User fetch task panicked"),
            };
        }
        last
    }
}

impl<C> UserSession for ApiUserSession<C>
where
    C: HttpClient + Clone + Send + Sync + 'static,
{
    fn fetch_user(&self, username: &str) {
        let secret = self
            .store
            .snapshot()
            .token
            .and_then(|token| token.secret().map(str::to_string));
        let Some(secret) = secret else {
            tracing::warn!(username, "No usable token in session, skipping user fetch");
            return;
        };

        let client = self.client.clone();
        let url = self.user_url();
        let slot = Arc::clone(&self.user);
        let epoch = lock(&self.user).epoch;
        let username = username.to_string();

        let handle = tokio::spawn(async move {
            let result = fetch_current_user(&client, &url, &secret).await;
            match &result {
                Ok(user) => {
                    let mut slot = lock(&slot);
                    if slot.epoch == epoch {
                        tracing::info!(username = %username, "User loaded");
                        slot.user = Some(user.clone());
                    } else {
                        tracing::debug!(username = %username, "Dropping user loaded after discard");
                    }
                }
                Err(e) => tracing::warn!(username = %username, "User fetch failed: {e:#}"),
            }
            result
        });
        let mut pending = lock(&self.pending);
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    fn discard_user(&self) {
        let mut slot = lock(&self.user);
        slot.epoch += 1;
        slot.user = None;
        drop(slot);

        for handle in lock(&self.pending).drain(..) {
            handle.abort();
        }
    }
}

async fn fetch_current_user<C: HttpClient>(
    client: &C,
    url: &str,
    secret: &str,
) -> Result<serde_json::Value> {
    let authorization = format!("token {secret}");
    let response = client
        .get(
            url,
            &[
                ("Accept", "application/json"),
                ("Authorization", authorization.as_str()),
            ],
        )
        .await
        .context("Failed to send user request")?;

    if !response.is_success() {
        anyhow::bail!(
            "User request failed (HTTP {}): {}",
            response.status,
            response.status_text
        );
    }

    serde_json::from_slice(&response.body).context("Failed to parse user response")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
