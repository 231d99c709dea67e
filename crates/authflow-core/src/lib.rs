//! Core authflow library (token actions, login flow, session store, config).

pub mod actions;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod store;
pub mod user;

pub use actions::{Credentials, Dispatch, DispatchFn, Fanout, Token, TokenAction, dispatch_fn};
pub use controller::AuthController;
pub use error::{AuthError, AuthResult};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use store::{SessionState, SessionStatus, SessionStore};
pub use user::{ApiUserSession, UserSession};
