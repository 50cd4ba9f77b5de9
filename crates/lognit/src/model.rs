//! Wire and session data structures shared by the HTTP and push layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// MESSAGES
// =============================================================================

/// One log line as returned by a cluster node.
///
/// Field order matters: the derived `Ord` compares `timestamp` first and
/// falls through the remaining fields, which makes the order total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Message {
    /// Epoch milliseconds.
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub host: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub facility: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub app: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: BTreeMap<String, Vec<String>>,
}

impl Message {
    pub fn new(timestamp: i64, host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            host: host.into(),
            facility: String::new(),
            severity: String::new(),
            app: String::new(),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_origin(
        mut self,
        facility: impl Into<String>,
        severity: impl Into<String>,
        app: impl Into<String>,
    ) -> Self {
        self.facility = facility.into();
        self.severity = severity.into();
        self.app = app.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.metadata.insert(key.into(), values);
        self
    }

    /// Timestamp as a UTC date, `None` when out of chrono's range.
    pub fn date_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// Result set emitted by a single node for one query, or one live push.
///
/// `items` keep the order the node produced them in, which is not
/// necessarily timestamp order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBatch {
    #[serde(default, deserialize_with = "null_as_default")]
    pub historic: bool,
    /// Cluster size as reported by the emitting node; anything below 1 means
    /// the node sent no usable cluster information.
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_nodes: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Message>,
}

impl MessageBatch {
    pub fn historic(total_nodes: i64, items: Vec<Message>) -> Self {
        Self {
            historic: true,
            total_nodes,
            items,
        }
    }

    pub fn live(items: Vec<Message>) -> Self {
        Self {
            historic: false,
            total_nodes: 0,
            items,
        }
    }

    pub fn is_historic(&self) -> bool {
        self.historic
    }
}

/// Reads an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub domain: String,
    pub name: String,
    pub value: String,
    pub path: String,
    /// `None` for session cookies.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
}

impl Cookie {
    pub fn new(
        domain: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
        path: impl Into<String>,
        expiry: Option<DateTime<Utc>>,
        secure: bool,
    ) -> Self {
        Self {
            domain: domain.into(),
            name: name.into(),
            value: value.into(),
            path: path.into(),
            expiry,
            secure,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }
}

/// Snapshot of a login: the backend address plus the cookies it handed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    server: String,
    cookies: Vec<Cookie>,
}

impl SessionState {
    pub fn new(cookies: Vec<Cookie>, server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            cookies,
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }
}
