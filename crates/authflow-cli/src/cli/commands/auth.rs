//! Auth command handlers.

use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use authflow_core::cache::{CachedSession, TokenCache};
use authflow_core::config::Config;
use authflow_core::{
    ApiUserSession, AuthController, Dispatch, Fanout, ReqwestClient, SessionState, SessionStore,
    Token, TokenAction,
};

type Users = Arc<ApiUserSession<ReqwestClient>>;

/// Controller wired to the in-memory store, the token cache and the user endpoint.
struct Session {
    store: Arc<SessionStore>,
    users: Users,
    controller: AuthController<ReqwestClient, Fanout, Users>,
}

impl Session {
    /// Starts from the cached session so logout knows who is signed in.
    fn open(config: &Config, cache: &TokenCache) -> Result<Self> {
        let restored = match cache.load() {
            Ok(cached) => cached.map(CachedSession::into_state).unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache: {e:#}");
                SessionState::default()
            }
        };
        let store = Arc::new(SessionStore::with_state(restored));

        let client = ReqwestClient::with_timeout(config.request_timeout())?;
        let users = Arc::new(ApiUserSession::new(
            config.base_url(),
            client.clone(),
            Arc::clone(&store),
        ));
        let dispatcher = Fanout::new().with(Arc::clone(&store)).with(cache.writer());
        let controller =
            AuthController::new(config.base_url(), client, dispatcher, Arc::clone(&users));

        Ok(Self {
            store,
            users,
            controller,
        })
    }
}

pub async fn login(config: &Config, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => read_password()?,
    };

    let cache = TokenCache::default();
    let session = Session::open(config, &cache)?;

    session.store.dispatch(TokenAction::FetchToken {
        username: username.to_string(),
    });
    session
        .controller
        .login(username, &password)
        .await
        .context("Login failed")?;

    let state = session.store.snapshot();
    let masked = state
        .token
        .as_ref()
        .map_or_else(|| "***".to_string(), Token::masked);
    println!("✓ Logged in as {username} (token: {masked})");

    // The cache writer can only log its failures; check what actually landed.
    let expected = state.token.map(|token| CachedSession {
        username: username.to_string(),
        token,
    });
    match cache.load() {
        Ok(saved) if saved.is_some() && saved == expected => {
            println!("  Token saved to: {}", cache.path().display());
        }
        Ok(_) => eprintln!(
            "Warning: token was not saved to {}; this login will not persist.",
            cache.path().display()
        ),
        Err(e) => eprintln!("Warning: token was not saved: {e:#}"),
    }

    if let Err(e) = session.users.settle().await {
        eprintln!("Warning: could not load user details: {e:#}");
    }

    Ok(())
}

pub fn logout(config: &Config) -> Result<()> {
    let cache = TokenCache::default();
    let had_session = cache.path().exists();

    let session = Session::open(config, &cache)?;
    let username = session.store.snapshot().username;
    session.controller.logout();

    if had_session {
        match username {
            Some(username) => println!("✓ Logged out {username}"),
            None => println!("✓ Logged out"),
        }
        println!("  Token removed from: {}", cache.path().display());
    } else {
        println!("Not logged in (no stored token found).");
    }
    Ok(())
}

pub fn status() -> Result<()> {
    let cache = TokenCache::default();
    match cache.load()? {
        Some(cached) => {
            println!(
                "Logged in as {} (token: {})",
                cached.username,
                cached.token.masked()
            );
            println!("  Token file: {}", cache.path().display());
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

fn read_password() -> Result<String> {
    if io::stdin().is_terminal() {
        eprint!("Password: ");
        io::stderr().flush()?;
    }

    let mut input = String::new();
    io::stdin()
        .lock()
        .read_line(&mut input)
        .context("Failed to read password from stdin")?;
    Ok(input.trim_end_matches(['\r', '\n']).to_string())
}
