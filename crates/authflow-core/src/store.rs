//! Session state and its reducer.
//!
//! The reducer is pure: it only mutates state. [`SessionStore`] wraps it
//! behind a mutex so actions are applied one at a time, in arrival order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::actions::{Dispatch, Token, TokenAction};

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No token held.
    #[default]
    SignedOut,
    /// A token request is in flight.
    Requesting,
    /// A token has been received.
    SignedIn,
}

/// Token-side view of the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub status: SessionStatus,
    pub username: Option<String>,
    pub token: Option<Token>,
}

impl SessionState {
    pub fn is_signed_in(&self) -> bool {
        self.status == SessionStatus::SignedIn
    }
}

/// Applies one action to the session state.
pub fn reduce(state: &mut SessionState, action: &TokenAction) {
    match action {
        TokenAction::FetchToken { username } => {
            state.status = SessionStatus::Requesting;
            state.username = Some(username.clone());
            state.token = None;
        }
        TokenAction::ReceiveToken { username, token } => {
            state.status = SessionStatus::SignedIn;
            state.username = Some(username.clone());
            state.token = Some(token.clone());
        }
        TokenAction::DiscardToken => *state = SessionState::default(),
    }
}

/// Thread-safe holder of [`SessionState`].
#[derive(Debug, Default)]
pub struct SessionStore {
    state: Mutex<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from a previously persisted state.
    pub fn with_state(state: SessionState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Dispatch for SessionStore {
    fn dispatch(&self, action: TokenAction) {
        let mut state = self.lock();
        reduce(&mut state, &action);
        tracing::debug!(action = action.kind(), status = ?state.status, "Session updated");
    }
}
