//! Bayeux (CometD) long-polling client for server-pushed events.
//!
//! One [`BayeuxClient`] is one push session: a handshake yields a client id,
//! channels are subscribed on it, and a background task keeps a
//! `/meta/connect` long poll open, dispatching every data message to the
//! listener registered for its channel.

use dashmap::DashMap;
use log::{debug, info, warn};
use lognit::{RestListener, ServerError};
use parking_lot::{Mutex, RwLock};
use reqwest::header::COOKIE;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Fixed handshake timeout for every push connection.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(120_000);

/// Pause before retrying a failed long poll.
const RETRY_INTERVAL: Duration = Duration::from_millis(1_000);

const HANDSHAKE: &str = "/meta/handshake";
const CONNECT: &str = "/meta/connect";
const SUBSCRIBE: &str = "/meta/subscribe";
const UNSUBSCRIBE: &str = "/meta/unsubscribe";
const DISCONNECT: &str = "/meta/disconnect";

/// Receives the raw payload of every message published on one channel.
pub trait ChannelListener: Send + Sync {
    fn on_event(&self, payload: Value);
}

/// Decodes each payload as JSON into `T` before handing it on.
pub struct JsonMessageListener<T> {
    listener: Arc<dyn RestListener<T>>,
    _item: PhantomData<fn() -> T>,
}

impl<T> JsonMessageListener<T> {
    pub fn new(listener: Arc<dyn RestListener<T>>) -> Self {
        Self {
            listener,
            _item: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> ChannelListener for JsonMessageListener<T> {
    fn on_event(&self, payload: Value) {
        match serde_json::from_value::<T>(payload) {
            Ok(event) => self.listener.receive(event),
            Err(e) => warn!("Dropping push payload that does not decode: {e}"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Advice {
    #[serde(default)]
    reconnect: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BayeuxMessage {
    channel: String,
    #[serde(default)]
    successful: Option<bool>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    advice: Option<Advice>,
}

impl BayeuxMessage {
    fn is_meta(&self) -> bool {
        self.channel.starts_with("/meta/")
    }

    fn failure_reason(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "server reported failure".to_string())
    }

    fn reconnect_advice(&self) -> Option<&str> {
        self.advice.as_ref().and_then(|a| a.reconnect.as_deref())
    }
}

pub struct BayeuxClient {
    url: String,
    http: reqwest::Client,
    cookies: Mutex<BTreeMap<String, String>>,
    client_id: RwLock<Option<String>>,
    subscriptions: DashMap<String, Arc<dyn ChannelListener>>,
    next_id: AtomicU64,
    connect_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for BayeuxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BayeuxClient")
            .field("url", &self.url)
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl BayeuxClient {
    pub fn new(url: impl Into<String>) -> Result<Arc<Self>, ServerError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ServerError::from_push_error(e, "push client setup"))?;

        Ok(Arc::new(Self {
            url: url.into(),
            http,
            cookies: Mutex::new(BTreeMap::new()),
            client_id: RwLock::new(None),
            subscriptions: DashMap::new(),
            next_id: AtomicU64::new(1),
            connect_task: Mutex::new(None),
        }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Attach a cookie to every request of this push session.
    pub fn set_cookie(&self, name: &str, value: &str) {
        self.cookies.lock().insert(name.to_string(), value.to_string());
    }

    pub fn cookies(&self) -> BTreeMap<String, String> {
        self.cookies.lock().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.client_id.read().is_some()
    }

    pub fn subscribed_channels(&self) -> Vec<String> {
        self.subscriptions.iter().map(|e| e.key().clone()).collect()
    }

    /// Handshake within `timeout` and start the long-poll loop.
    pub async fn handshake(self: &Arc<Self>, timeout: Duration) -> Result<(), ServerError> {
        tokio::time::timeout(timeout, self.perform_handshake())
            .await
            .map_err(|_| {
                ServerError::from_push_error(
                    format!("no answer within {}ms", timeout.as_millis()),
                    "handshake",
                )
            })??;

        let mut task = self.connect_task.lock();
        if task.as_ref().is_none_or(|t| t.is_finished()) {
            *task = Some(tokio::spawn(Arc::clone(self).run_connect_loop()));
        }
        Ok(())
    }

    /// Register `listener` for `channel` and tell the server about it.
    pub async fn subscribe(
        &self,
        channel: &str,
        listener: Arc<dyn ChannelListener>,
    ) -> Result<(), ServerError> {
        if self
            .subscriptions
            .insert(channel.to_string(), listener)
            .is_some()
        {
            debug!("Replacing listener on push channel {channel}");
        }

        if let Err(e) = self.send_subscription(SUBSCRIBE, channel).await {
            self.subscriptions.remove(channel);
            return Err(e);
        }

        info!("Subscribed to push channel {channel}");
        Ok(())
    }

    pub async fn unsubscribe(&self, channel: &str) -> Result<(), ServerError> {
        self.subscriptions.remove(channel);
        self.send_subscription(UNSUBSCRIBE, channel).await?;
        info!("Unsubscribed from push channel {channel}");
        Ok(())
    }

    /// Stop the long-poll loop and end the session on the server.
    pub async fn disconnect(&self) -> Result<(), ServerError> {
        if let Some(task) = self.connect_task.lock().take() {
            task.abort();
        }

        let Some(client_id) = self.client_id.write().take() else {
            return Ok(());
        };

        let replies = self
            .send(json!([{
                "channel": DISCONNECT,
                "clientId": client_id,
                "id": self.next_message_id(),
            }]))
            .await?;
        expect_success(&replies, DISCONNECT)?;

        info!("Disconnected push session from {}", self.url);
        Ok(())
    }

    async fn perform_handshake(&self) -> Result<(), ServerError> {
        let replies = self
            .send(json!([{
                "channel": HANDSHAKE,
                "version": "1.0",
                "minimumVersion": "1.0",
                "supportedConnectionTypes": ["long-polling"],
                "id": self.next_message_id(),
            }]))
            .await?;

        let reply = expect_success(&replies, HANDSHAKE)?;
        let client_id = reply
            .client_id
            .clone()
            .ok_or_else(|| ServerError::from_push_error("missing clientId", HANDSHAKE))?;

        info!("Push handshake with {} succeeded", self.url);
        *self.client_id.write() = Some(client_id);
        Ok(())
    }

    async fn send_subscription(&self, meta: &str, channel: &str) -> Result<(), ServerError> {
        let client_id = self
            .client_id
            .read()
            .clone()
            .ok_or_else(|| ServerError::from_push_error("not handshaken", meta))?;

        let replies = self
            .send(json!([{
                "channel": meta,
                "clientId": client_id,
                "subscription": channel,
                "id": self.next_message_id(),
            }]))
            .await?;
        expect_success(&replies, meta)?;
        Ok(())
    }

    async fn run_connect_loop(self: Arc<Self>) {
        loop {
            let Some(client_id) = self.client_id.read().clone() else {
                debug!("Push session closed, stopping long poll");
                return;
            };

            let replies = self
                .send(json!([{
                    "channel": CONNECT,
                    "clientId": client_id,
                    "connectionType": "long-polling",
                    "id": self.next_message_id(),
                }]))
                .await;

            let replies = match replies {
                Ok(replies) => replies,
                Err(e) => {
                    warn!("Push long poll failed, retrying: {e}");
                    tokio::time::sleep(RETRY_INTERVAL).await;
                    continue;
                }
            };

            let mut rehandshake = false;
            for message in replies {
                if !message.is_meta() {
                    self.dispatch(message);
                    continue;
                }
                if message.channel != CONNECT || message.successful == Some(true) {
                    continue;
                }

                match message.reconnect_advice() {
                    Some("handshake") => rehandshake = true,
                    Some("none") => {
                        warn!("Server refused further push connects: {}", message.failure_reason());
                        self.client_id.write().take();
                        return;
                    }
                    _ => {
                        warn!("Push connect rejected: {}", message.failure_reason());
                        tokio::time::sleep(RETRY_INTERVAL).await;
                    }
                }
            }

            if rehandshake {
                if let Err(e) = self.rehandshake().await {
                    warn!("Push re-handshake failed, retrying: {e}");
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn rehandshake(&self) -> Result<(), ServerError> {
        self.perform_handshake().await?;
        for channel in self.subscribed_channels() {
            self.send_subscription(SUBSCRIBE, &channel).await?;
        }
        Ok(())
    }

    fn dispatch(&self, message: BayeuxMessage) {
        let listener = self
            .subscriptions
            .get(&message.channel)
            .map(|entry| Arc::clone(entry.value()));

        match (listener, message.data) {
            (Some(listener), Some(data)) => listener.on_event(data),
            (None, _) => debug!("No listener for push channel {}", message.channel),
            (Some(_), None) => debug!("Push message on {} without data", message.channel),
        }
    }

    async fn send(&self, messages: Value) -> Result<Vec<BayeuxMessage>, ServerError> {
        let mut request = self.http.post(&self.url).json(&messages);

        let cookie_header = self
            .cookies
            .lock()
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        if !cookie_header.is_empty() {
            request = request.header(COOKIE, cookie_header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServerError::from_push_error(e, &self.url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::from_push_error(
                format!("unexpected status {status}"),
                &self.url,
            ));
        }

        response
            .json::<Vec<BayeuxMessage>>()
            .await
            .map_err(|e| ServerError::from_push_error(e, &self.url))
    }

    fn next_message_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

fn expect_success<'a>(
    replies: &'a [BayeuxMessage],
    channel: &str,
) -> Result<&'a BayeuxMessage, ServerError> {
    let reply = replies
        .iter()
        .find(|m| m.channel == channel)
        .ok_or_else(|| ServerError::from_push_error("no reply", channel))?;

    if reply.successful == Some(true) {
        Ok(reply)
    } else {
        Err(ServerError::from_push_error(reply.failure_reason(), channel))
    }
}

/// Live subscription returned by `SessionClient::listen`.
#[derive(Debug)]
pub struct PushHandle {
    client: Arc<BayeuxClient>,
    channel: String,
}

impl PushHandle {
    pub(crate) fn new(client: Arc<BayeuxClient>, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn client(&self) -> &Arc<BayeuxClient> {
        &self.client
    }

    /// Unsubscribe the channel; the last handle on a session also disconnects it.
    pub async fn close(self) -> Result<(), ServerError> {
        self.client.unsubscribe(&self.channel).await?;
        if self.client.subscriptions.is_empty() {
            self.client.disconnect().await?;
        }
        Ok(())
    }
}
