//! Error types for the login flow.

use thiserror::Error;

/// Errors returned by [`crate::AuthController::login`].
#[derive(Error, Debug)]
pub enum AuthError {
    /// The identity endpoint answered with a non-2xx status.
    ///
    /// Displays as the bare status text (e.g. `Unauthorized`).
    #[error("{0}")]
    RequestFailed(String),

    /// The success body was not valid JSON.
    #[error("Failed to parse token response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The request never produced a response (connect, timeout, ...).
    #[error("Token request failed: {0}")]
    Transport(String),

    /// A logout happened while this login was in flight; its token was dropped.
    #[error("Login superseded by logout")]
    Superseded,
}

/// Result type alias using `AuthError`.
pub type AuthResult<T> = Result<T, AuthError>;
