//! HTTP capability used by the login flow and the user-session collaborator.
//!
//! The flow never reaches for a global client: it is handed an
//! [`HttpClient`], which is [`ReqwestClient`] in production and a scripted
//! double in tests.

use std::future::Future;
use std::time::Duration;

use crate::error::{AuthError, AuthResult};

/// Status line and raw body of a finished request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Standard reason phrase for `status` (`"Unauthorized"` for 401).
    ///
    /// [`ReqwestClient`] does not forward the phrase the server sent: a
    /// custom phrase is replaced by the standard one, and a code without a
    /// standard phrase (599) yields the bare number.
    pub status_text: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Minimal HTTP client surface.
///
/// Only transport failures are errors; any status code is a response.
pub trait HttpClient {
    /// Sends `body` as a POST to `url` with the given headers.
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> impl Future<Output = AuthResult<HttpResponse>> + Send;

    /// Sends a GET to `url` with the given headers.
    fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = AuthResult<HttpResponse>> + Send;
}

/// `reqwest`-backed [`HttpClient`].
#[derive(Clone, Debug, Default)]
pub struct ReqwestClient {
    http_client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a client with a per-request timeout (`None` disables it).
    ///
    /// # Errors
    /// Returns an error if the underlying TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Option<Duration>) -> AuthResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| AuthError::Transport(format!("build HTTP client: {e}")))?;
        Ok(Self { http_client })
    }

    async fn execute(request: reqwest::RequestBuilder) -> AuthResult<HttpResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        let status_text = status
            .canonical_reason()
            .map_or_else(|| status.as_str().to_string(), str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text,
            body: body.to_vec(),
        })
    }

    fn with_headers(
        mut request: reqwest::RequestBuilder,
        headers: &[(&str, &str)],
    ) -> reqwest::RequestBuilder {
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request
    }
}

impl HttpClient for ReqwestClient {
    fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> impl Future<Output = AuthResult<HttpResponse>> + Send {
        let request = Self::with_headers(self.http_client.post(url), headers).body(body);
        Self::execute(request)
    }

    fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = AuthResult<HttpResponse>> + Send {
        let request = Self::with_headers(self.http_client.get(url), headers);
        Self::execute(request)
    }
}
