//! HTTP and push transport for the Lognit client.
//!
//! This crate provides the session-level [`SessionClient`] together with the
//! pieces it is built from: a status-classifying [`Transport`], the session
//! [`CookieJar`] and its push bridge, lazily decoded [`RestStream`]s and a
//! Bayeux long-polling [`BayeuxClient`] for server-pushed events.

pub mod client;
pub mod cookies;
pub mod entity;
pub mod push;
pub mod stream;
pub mod transport;

pub use client::SessionClient;
pub use cookies::CookieJar;
pub use entity::Entity;
pub use push::{BayeuxClient, ChannelListener, HANDSHAKE_TIMEOUT, JsonMessageListener, PushHandle};
pub use stream::RestStream;
pub use transport::Transport;
