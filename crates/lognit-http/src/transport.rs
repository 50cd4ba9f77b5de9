//! Single authenticated request/response cycles and status classification.

use crate::cookies::CookieJar;
use crate::entity::Entity;
use crate::stream::RestStream;
use log::{debug, warn};
use lognit::ServerError;
use parking_lot::RwLock;
use reqwest::{Method, Response, StatusCode, Version};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct Credentials {
    username: String,
    password: String,
}

/// Executes requests against full URLs, sharing one cookie jar.
pub struct Transport {
    client: reqwest::Client,
    credentials: RwLock<Option<Credentials>>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("authenticating", &self.is_authenticating())
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(jar: Arc<CookieJar>) -> Result<Self, ServerError> {
        Self::with_timeout(jar, None)
    }

    pub fn with_timeout(jar: Arc<CookieJar>, timeout: Option<Duration>) -> Result<Self, ServerError> {
        let mut builder = reqwest::Client::builder()
            .cookie_provider(jar)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| ServerError::from_transport_error(e, "HTTP client setup"))?;

        Ok(Self {
            client,
            credentials: RwLock::new(None),
        })
    }

    /// Send these credentials with every following request, to any realm,
    /// without waiting for a challenge.
    pub fn authenticate(&self, username: &str, password: &str) {
        *self.credentials.write() = Some(Credentials {
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    pub fn is_authenticating(&self) -> bool {
        self.credentials.read().is_some()
    }

    /// Execute one request and decode the body; `None` when the body is empty.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        entity: Option<&Entity>,
    ) -> Result<Option<T>, ServerError> {
        let response = self.execute(method, url, entity).await?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ServerError::from_transport_error(e, url))?;
        if body.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| ServerError::from_decode_error(e, &format!("response from {url}")))
    }

    /// Execute one request and decode its body lazily, one item per line.
    pub async fn request_stream<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
    ) -> Result<RestStream<T>, ServerError> {
        let response = self.execute(method, url, None).await?;
        Ok(RestStream::from_response(response))
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        entity: Option<&Entity>,
    ) -> Result<Response, ServerError> {
        let mut request = self.client.request(method.clone(), url);
        if let Some(credentials) = self.credentials.read().clone() {
            request = request.basic_auth(credentials.username, Some(credentials.password));
        }
        if let Some(entity) = entity {
            request = request.form(entity.fields());
        }

        let response = request.send().await.map_err(|e| {
            warn!("{method} {url} failed before a response: {e}");
            ServerError::from_transport_error(e, &format!("{method} {url}"))
        })?;

        let status = response.status();
        debug!("{method} {url} -> {status}");

        classify(status, || status_line(response.version(), status))?;
        Ok(response)
    }
}

/// Render a status line the way it appears on the wire, e.g. `HTTP/1.1 404 Not Found`.
pub fn status_line(version: Version, status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{version:?} {} {reason}", status.as_u16()),
        None => format!("{version:?} {}", status.as_u16()),
    }
}

/// Map a status to success, [`ServerError::Unauthorized`] or
/// [`ServerError::RequestFailed`].
///
/// Every 3xx counts as unauthorized: the backend redirects to its login page
/// when the session is gone.
pub fn classify<F>(status: StatusCode, status_line: F) -> Result<(), ServerError>
where
    F: FnOnce() -> String,
{
    let code = status.as_u16();
    if (200..300).contains(&code) {
        return Ok(());
    }

    let status_line = status_line();
    if code == 401 || (300..400).contains(&code) {
        warn!("Session rejected: {status_line}");
        Err(ServerError::Unauthorized { status_line })
    } else {
        warn!("Request failed: {status_line}");
        Err(ServerError::RequestFailed { status_line })
    }
}
