//! Session-level client: one configured backend, its cookies and credentials.

use crate::cookies::{CookieJar, select_for_push};
use crate::entity::Entity;
use crate::push::{BayeuxClient, HANDSHAKE_TIMEOUT, JsonMessageListener, PushHandle};
use crate::stream::RestStream;
use crate::transport::Transport;
use log::{debug, info, warn};
use lognit::{ClientConfig, RestListener, ServerError, SessionState};
use parking_lot::RwLock;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub const DEFAULT_SERVER: &str = "localhost";

/// Client bound to one Lognit backend at a time.
///
/// Plain requests, streamed requests and push subscriptions all share the
/// same session: cookies set by HTTP responses are carried over to the push
/// connection when it is opened. Changing the server address while requests
/// from the old configuration are in flight must be serialized by the caller.
pub struct SessionClient {
    transport: Transport,
    jar: Arc<CookieJar>,
    server: RwLock<Option<String>>,
    push: tokio::sync::Mutex<Option<Arc<BayeuxClient>>>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("server", &self.server())
            .field("cookies", &self.jar.len())
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    pub fn new() -> Result<Self, ServerError> {
        let jar = Arc::new(CookieJar::new());
        let transport = Transport::new(jar.clone())?;
        Ok(Self::with_transport(transport, jar))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ServerError> {
        let jar = Arc::new(CookieJar::new());
        let transport = Transport::with_timeout(jar.clone(), config.request_timeout())?;
        let client = Self::with_transport(transport, jar);

        client.set_server(&config.server);
        if let Some((username, password)) = config.credentials() {
            client.authenticate(username, password);
        }
        Ok(client)
    }

    fn with_transport(transport: Transport, jar: Arc<CookieJar>) -> Self {
        Self {
            transport,
            jar,
            server: RwLock::new(None),
            push: tokio::sync::Mutex::new(None),
        }
    }

    pub fn server(&self) -> String {
        self.server
            .read()
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER.to_string())
    }

    /// Point the client at another backend.
    ///
    /// Cookies belong to the previous backend, so they are cleared whenever
    /// the address actually changes. Setting the same address again keeps them.
    pub fn set_server(&self, server: &str) {
        let server = normalize_server(server);
        let mut current = self.server.write();

        if let Some(previous) = current.as_deref() {
            if previous != server {
                info!("Switching server from {previous} to {server}, clearing cookies");
                self.jar.clear();
            }
        }
        *current = Some(server);
    }

    pub fn authenticate(&self, username: &str, password: &str) {
        self.transport.authenticate(username, password);
    }

    pub fn jar(&self) -> &Arc<CookieJar> {
        &self.jar
    }

    /// Absolute URL for `path`, collapsing one leading slash.
    pub fn url_for(&self, path: &str) -> String {
        let path = path.strip_prefix('/').unwrap_or(path);
        format!("{}/{path}", base_url(&self.server()))
    }

    /// Push endpoint of the configured server.
    pub fn push_url(&self) -> String {
        format!("{}/cometd", base_url(&self.server()))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ServerError> {
        self.transport
            .request(Method::GET, &self.url_for(path), None)
            .await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        entity: &Entity,
    ) -> Result<Option<T>, ServerError> {
        self.transport
            .request(Method::POST, &self.url_for(path), Some(entity))
            .await
    }

    pub async fn get_stream<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<RestStream<T>, ServerError> {
        self.transport
            .request_stream(Method::GET, &self.url_for(path))
            .await
    }

    /// Snapshot of the session for an external store.
    pub fn state(&self) -> SessionState {
        SessionState::new(self.jar.all(), self.server())
    }

    /// Replace the session with a saved one: cookies verbatim, server as saved.
    pub fn set_state(&self, state: &SessionState) {
        self.jar.clear();
        self.jar.add_all(state.cookies());
        *self.server.write() = Some(normalize_server(state.server()));
    }

    /// Subscribe `listener` to `channel` on the server's push endpoint.
    ///
    /// The push connection is opened on first use (copying the matching
    /// session cookies onto it before the handshake) and reused while the
    /// server stays the same.
    #[tracing::instrument(level = "debug", skip(self, listener))]
    pub async fn listen<T>(
        &self,
        channel: &str,
        listener: Arc<dyn RestListener<T>>,
    ) -> Result<PushHandle, ServerError>
    where
        T: DeserializeOwned + 'static,
    {
        let bayeux = self.push_connection().await?;
        bayeux
            .subscribe(channel, Arc::new(JsonMessageListener::new(listener)))
            .await?;
        Ok(PushHandle::new(bayeux, channel))
    }

    async fn push_connection(&self) -> Result<Arc<BayeuxClient>, ServerError> {
        let url = self.push_url();
        let mut push = self.push.lock().await;

        if let Some(existing) = push.as_ref() {
            if existing.url() == url && existing.is_connected() {
                debug!("Reusing push connection to {url}");
                return Ok(existing.clone());
            }
        }

        // Handles still pointing at the replaced session can no longer unsubscribe.
        if let Some(previous) = push.take() {
            debug!("Replacing push connection to {}", previous.url());
            if let Err(e) = previous.disconnect().await {
                warn!("Failed to disconnect push session at {}: {e}", previous.url());
            }
        }

        let parsed = Url::parse(&url).map_err(|e| ServerError::from_push_error(e, &url))?;
        let bayeux = BayeuxClient::new(url.as_str())?;
        let cookies = self.jar.all();
        for cookie in select_for_push(&cookies, &parsed) {
            bayeux.set_cookie(&cookie.name, &cookie.value);
        }

        bayeux.handshake(HANDSHAKE_TIMEOUT).await?;
        *push = Some(bayeux.clone());
        Ok(bayeux)
    }
}

fn normalize_server(server: &str) -> String {
    server.trim().trim_end_matches('/').to_string()
}

/// `server` with a scheme; plain HTTP unless one is given.
fn base_url(server: &str) -> String {
    if server.contains("://") {
        server.to_string()
    } else {
        format!("http://{server}")
    }
}
