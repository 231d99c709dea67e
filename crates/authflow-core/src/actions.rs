//! Token actions and the dispatch capability.
//!
//! Actions are the only way the login flow talks to the rest of the
//! application. Anything that wants to observe a session (the in-memory
//! store, the on-disk token cache, a test recorder) implements [`Dispatch`].

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Username/password pair for a single login attempt.
///
/// Serialized as the token request body and dropped afterwards.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Opaque token returned by the identity endpoint.
///
/// The shape is owned by the server; it is passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub serde_json::Value);

impl Token {
    /// Keys probed by [`Token::secret`], in order.
    const SECRET_KEYS: [&'static str; 3] = ["token", "access_token", "value"];

    /// Returns the bearer string carried by the token, if one can be found.
    ///
    /// Accepts a bare JSON string or an object with a `token`,
    /// `access_token` or `value` string field.
    pub fn secret(&self) -> Option<&str> {
        match &self.0 {
            serde_json::Value::String(s) => Some(s.as_str()),
            serde_json::Value::Object(map) => Self::SECRET_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(serde_json::Value::as_str)),
            _ => None,
        }
    }

    /// Returns a masked version of the secret for display (first 6 chars + ...).
    pub fn masked(&self) -> String {
        match self.secret() {
            Some(secret) if secret.chars().count() > 12 => {
                format!("{}...", secret.chars().take(6).collect::<String>())
            }
            _ => "***".to_string(),
        }
    }
}

/// Session signals consumed by stores and caches.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenAction {
    /// A token request for `username` is about to be sent.
    FetchToken { username: String },
    /// The identity endpoint issued `token` for `username`.
    ReceiveToken { username: String, token: Token },
    /// The current token must be forgotten.
    DiscardToken,
}

impl TokenAction {
    /// Wire-style action type name.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenAction::FetchToken { .. } => "FETCH_TOKEN",
            TokenAction::ReceiveToken { .. } => "RECEIVE_TOKEN",
            TokenAction::DiscardToken => "DISCARD_TOKEN",
        }
    }
}

/// Capability to publish a [`TokenAction`].
pub trait Dispatch {
    fn dispatch(&self, action: TokenAction);
}

impl<T: Dispatch + ?Sized> Dispatch for &T {
    fn dispatch(&self, action: TokenAction) {
        (**self).dispatch(action);
    }
}

impl<T: Dispatch + ?Sized> Dispatch for Arc<T> {
    fn dispatch(&self, action: TokenAction) {
        (**self).dispatch(action);
    }
}

impl<T: Dispatch + ?Sized> Dispatch for Box<T> {
    fn dispatch(&self, action: TokenAction) {
        (**self).dispatch(action);
    }
}

/// Adapts a plain `Fn(TokenAction)` into a [`Dispatch`].
pub struct DispatchFn<F>(F);

/// Wraps a closure as a dispatcher.
pub fn dispatch_fn<F>(f: F) -> DispatchFn<F>
where
    F: Fn(TokenAction),
{
    DispatchFn(f)
}

impl<F> Dispatch for DispatchFn<F>
where
    F: Fn(TokenAction),
{
    fn dispatch(&self, action: TokenAction) {
        (self.0)(action);
    }
}

/// Sends every action to each target, in insertion order.
#[derive(Default)]
pub struct Fanout {
    targets: Vec<Box<dyn Dispatch + Send + Sync>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, target: impl Dispatch + Send + Sync + 'static) -> Self {
        self.targets.push(Box::new(target));
        self
    }
}

impl Dispatch for Fanout {
    fn dispatch(&self, action: TokenAction) {
        let Some((last, rest)) = self.targets.split_last() else {
            return;
        };
        for target in rest {
            target.dispatch(action.clone());
        }
        last.dispatch(action);
    }
}
