//! Login/logout flow.
//!
//! `login` exchanges a username/password pair for a token and publishes
//! `ReceiveToken` followed by a user fetch. `logout` publishes the user
//! discard followed by `DiscardToken`. No other signals are emitted.
//!
//! ## Stale logins
//!
//! A login cannot be cancelled once sent. Every `logout` advances a
//! generation counter; a login whose response arrives after the counter
//! moved is dropped with [`AuthError::Superseded`] and emits nothing.
//! The check and the publish happen under the same lock that `logout`
//! takes, so a controller shared across threads never publishes a token
//! after the discard.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::actions::{Credentials, Dispatch, Token, TokenAction};
use crate::error::{AuthError, AuthResult};
use crate::http::HttpClient;
use crate::user::UserSession;

/// Path of the token endpoint, relative to the API base URL.
pub const TOKEN_PATH: &str = "/users/token";

const ACCEPT: &str = "application/json, text/plain, */*";
const CONTENT_TYPE: &str = "application/json";

/// Drives the token flow against a single identity endpoint.
pub struct AuthController<C, D, U> {
    base_url: String,
    client: C,
    dispatcher: D,
    user_session: U,
    generation: Mutex<u64>,
}

impl<C, D, U> AuthController<C, D, U>
where
    C: HttpClient,
    D: Dispatch,
    U: UserSession,
{
    pub fn new(base_url: impl Into<String>, client: C, dispatcher: D, user_session: U) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            dispatcher,
            user_session,
            generation: Mutex::new(0),
        }
    }

    /// Full URL of the token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.base_url.trim_end_matches('/'))
    }

    /// Requests a token for `username` and publishes it.
    ///
    /// Credentials are sent as-is; empty values are not rejected here.
    ///
    /// # Errors
    /// - [`AuthError::RequestFailed`] with the status text for non-2xx responses
    /// - [`AuthError::Parse`] if the success body is not JSON
    /// - [`AuthError::Transport`] if no response was received
    /// - [`AuthError::Superseded`] if `logout` ran while the request was in flight
    ///
    /// No signal is emitted on any error.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<()> {
        let generation = *self.generation();
        let url = self.token_url();
        let body = serde_json::to_vec(&Credentials::new(username, password))?;

        tracing::debug!(username, url = %url, "Requesting token");

        let response = self
            .client
            .post_json(
                &url,
                &[("Accept", ACCEPT), ("Content-Type", CONTENT_TYPE)],
                body,
            )
            .await?;

        if !response.is_success() {
            tracing::warn!(
                username,
                status = response.status,
                status_text = %response.status_text,
                "Token request rejected"
            );
            return Err(AuthError::RequestFailed(response.status_text));
        }

        let token: Token = serde_json::from_slice(&response.body)?;

        let current = self.generation();
        if *current != generation {
            tracing::info!(username, "Dropping token received after logout");
            return Err(AuthError::Superseded);
        }

        tracing::info!(username, "Token received");
        self.dispatcher.dispatch(TokenAction::ReceiveToken {
            username: username.to_string(),
            token,
        });
        self.user_session.fetch_user(username);
        drop(current);

        Ok(())
    }

    /// Discards the user and then the token. Unconditional.
    pub fn logout(&self) {
        let mut generation = self.generation();
        *generation += 1;
        tracing::info!("Discarding session");
        self.user_session.discard_user();
        self.dispatcher.dispatch(TokenAction::DiscardToken);
    }

    fn generation(&self) -> MutexGuard<'_, u64> {
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;
    use crate::http::HttpResponse;

    #[derive(Debug, Clone, PartialEq)]
    enum Signal {
        Action(TokenAction),
        FetchUser(String),
        DiscardUser,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        signals: Arc<Mutex<Vec<Signal>>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Signal> {
            std::mem::take(&mut *self.signals.lock().unwrap())
        }
    }

    impl Dispatch for Recorder {
        fn dispatch(&self, action: TokenAction) {
            self.signals.lock().unwrap().push(Signal::Action(action));
        }
    }

    impl UserSession for Recorder {
        fn fetch_user(&self, username: &str) {
            self.signals
                .lock()
                .unwrap()
                .push(Signal::FetchUser(username.to_string()));
        }

        fn discard_user(&self) {
            self.signals.lock().unwrap().push(Signal::DiscardUser);
        }
    }

    #[derive(Debug, Clone)]
    struct SentRequest {
        url: String,
        headers: Vec<(String, String)>,
        body: serde_json::Value,
    }

    /// Replies from a queue; a reply may be held back until released.
    #[derive(Default)]
    struct ScriptedClient {
        replies: Mutex<VecDeque<oneshot::Receiver<HttpResponse>>>,
        sent: Mutex<Vec<SentRequest>>,
    }

    impl ScriptedClient {
        fn replying(response: HttpResponse) -> Self {
            let client = Self::default();
            let (tx, rx) = oneshot::channel();
            tx.send(response).unwrap();
            client.replies.lock().unwrap().push_back(rx);
            client
        }

        fn held() -> (Self, oneshot::Sender<HttpResponse>) {
            let client = Self::default();
            let (tx, rx) = oneshot::channel();
            client.replies.lock().unwrap().push_back(rx);
            (client, tx)
        }

        fn sent(&self) -> Vec<SentRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl HttpClient for ScriptedClient {
        fn post_json(
            &self,
            url: &str,
            headers: &[(&str, &str)],
            body: Vec<u8>,
        ) -> impl Future<Output = AuthResult<HttpResponse>> + Send {
            self.sent.lock().unwrap().push(SentRequest {
                url: url.to_string(),
                headers: headers
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                body: serde_json::from_slice(&body).unwrap(),
            });
            let reply = self.replies.lock().unwrap().pop_front();
            async move {
                let reply = reply.expect("unexpected request");
                reply
                    .await
                    .map_err(|_| AuthError::Transport("connection closed".into()))
            }
        }

        fn get(
            &self,
            _url: &str,
            _headers: &[(&str, &str)],
        ) -> impl Future<Output = AuthResult<HttpResponse>> + Send {
            async { Err(AuthError::Transport("not scripted".into())) }
        }
    }

    fn response(status: u16, status_text: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            status_text: status_text.to_string(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn controller(
        client: ScriptedClient,
        recorder: &Recorder,
    ) -> AuthController<ScriptedClient, Recorder, Recorder> {
        AuthController::new(
            "http://api.test/api/v1",
            client,
            recorder.clone(),
            recorder.clone(),
        )
    }

    #[tokio::test]
    async fn test_login_success_emits_receive_then_fetch_user() {
        let recorder = Recorder::default();
        let ctl = controller(
            ScriptedClient::replying(response(200, "OK", r#"{"value":"abc123"}"#)),
            &recorder,
        );

        ctl.login("alice", "secret").await.unwrap();

        assert_eq!(
            recorder.take(),
            vec![
                Signal::Action(TokenAction::ReceiveToken {
                    username: "alice".into(),
                    token: Token(json!({"value": "abc123"})),
                }),
                Signal::FetchUser("alice".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_login_sends_single_json_post() {
        let recorder = Recorder::default();
        let ctl = controller(
            ScriptedClient::replying(response(200, "OK", r#"{"token":"t"}"#)),
            &recorder,
        );

        ctl.login("alice", "secret").await.unwrap();

        let sent = ctl.client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://api.test/api/v1/users/token");
        assert_eq!(
            sent[0].body,
            json!({"username": "alice", "password": "secret"})
        );
        assert!(
            sent[0]
                .headers
                .contains(&("Accept".into(), "application/json, text/plain, */*".into()))
        );
        assert!(
            sent[0]
                .headers
                .contains(&("Content-Type".into(), "application/json".into()))
        );
    }

    #[tokio::test]
    async fn test_login_passes_empty_credentials_through() {
        let recorder = Recorder::default();
        let ctl = controller(
            ScriptedClient::replying(response(400, "Bad Request", "")),
            &recorder,
        );

        let err = ctl.login("", "").await.unwrap_err();

        assert_eq!(err.to_string(), "Bad Request");
        assert_eq!(
            ctl.client.sent()[0].body,
            json!({"username": "", "password": ""})
        );
    }

    #[tokio::test]
    async fn test_login_unauthorized_rejects_without_signals() {
        let recorder = Recorder::default();
        let ctl = controller(
            ScriptedClient::replying(response(401, "Unauthorized", r#"{"detail":"no"}"#)),
            &recorder,
        );

        let err = ctl.login("alice", "wrong").await.unwrap_err();

        assert!(matches!(&err, AuthError::RequestFailed(text) if text == "Unauthorized"));
        assert_eq!(err.to_string(), "Unauthorized");
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_login_malformed_body_is_parse_error() {
        let recorder = Recorder::default();
        let ctl = controller(
            ScriptedClient::replying(response(200, "OK", "<html>")),
            &recorder,
        );

        let err = ctl.login("alice", "secret").await.unwrap_err();

        assert!(matches!(err, AuthError::Parse(_)));
        assert!(recorder.take().is_empty());
    }

    #[tokio::test]
    async fn test_login_transport_error_emits_nothing() {
        let recorder = Recorder::default();
        let (client, tx) = ScriptedClient::held();
        drop(tx);
        let ctl = controller(client, &recorder);

        let err = ctl.login("alice", "secret").await.unwrap_err();

        assert!(matches!(err, AuthError::Transport(_)));
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_logout_emits_discard_user_then_discard_token() {
        let recorder = Recorder::default();
        let ctl = controller(ScriptedClient::default(), &recorder);

        ctl.logout();
        let first = recorder.take();
        ctl.logout();
        let second = recorder.take();

        let expected = vec![
            Signal::DiscardUser,
            Signal::Action(TokenAction::DiscardToken),
        ];
        assert_eq!(first, expected);
        assert_eq!(second, expected);
        assert!(ctl.client.sent().is_empty());
    }

    #[tokio::test]
    async fn test_logout_during_login_drops_stale_token() {
        let recorder = Recorder::default();
        let (client, tx) = ScriptedClient::held();
        let ctl = controller(client, &recorder);

        let (result, ()) = tokio::join!(ctl.login("alice", "secret"), async {
            ctl.logout();
            tx.send(response(200, "OK", r#"{"value":"late"}"#)).unwrap();
        });

        assert!(matches!(result, Err(AuthError::Superseded)));
        assert_eq!(
            recorder.take(),
            vec![
                Signal::DiscardUser,
                Signal::Action(TokenAction::DiscardToken),
            ]
        );
    }

    #[tokio::test]
    async fn test_login_after_logout_is_not_superseded() {
        let recorder = Recorder::default();
        let ctl = controller(
            ScriptedClient::replying(response(200, "OK", r#"{"value":"fresh"}"#)),
            &recorder,
        );

        ctl.logout();
        recorder.take();
        ctl.login("bob", "pw").await.unwrap();

        assert_eq!(
            recorder.take(),
            vec![
                Signal::Action(TokenAction::ReceiveToken {
                    username: "bob".into(),
                    token: Token(json!({"value": "fresh"})),
                }),
                Signal::FetchUser("bob".into()),
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_logout_always_ends_with_discard() {
        let tail = vec![
            Signal::DiscardUser,
            Signal::Action(TokenAction::DiscardToken),
        ];

        for _ in 0..50 {
            let recorder = Recorder::default();
            let (client, tx) = ScriptedClient::held();
            let ctl = Arc::new(controller(client, &recorder));

            let login = tokio::spawn({
                let ctl = Arc::clone(&ctl);
                async move { ctl.login("alice", "secret").await }
            });
            while ctl.client.sent().is_empty() {
                tokio::task::yield_now().await;
            }

            let logout = tokio::spawn({
                let ctl = Arc::clone(&ctl);
                async move { ctl.logout() }
            });
            tx.send(response(200, "OK", r#"{"value":"race"}"#)).unwrap();

            let result = login.await.unwrap();
            logout.await.unwrap();

            let signals = recorder.take();
            match result {
                Ok(()) => assert_eq!(signals.len(), 4, "{signals:?}"),
                Err(AuthError::Superseded) => assert_eq!(signals, tail),
                Err(e) => panic!("unexpected error: {e}"),
            }
            assert_eq!(signals[signals.len() - 2..], tail[..]);
        }
    }

    #[test]
    fn test_token_url_tolerates_trailing_slash() {
        let recorder = Recorder::default();
        let ctl = AuthController::new(
            "http://api.test/",
            ScriptedClient::default(),
            recorder.clone(),
            recorder,
        );
        assert_eq!(ctl.token_url(), "http://api.test/users/token");
    }
}
