//! Client configuration and file loading.

use crate::ServerError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_HISTORIC_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_RELEASE_MAX: usize = 2_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// How long to wait for every cluster node to answer a historic query.
    #[serde(default = "default_historic_timeout_ms")]
    pub historic_timeout_ms: u64,
    /// Upper bound on historic messages printed per query.
    #[serde(default = "default_release_max")]
    pub release_max: usize,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_historic_timeout_ms() -> u64 {
    DEFAULT_HISTORIC_TIMEOUT_MS
}

fn default_release_max() -> usize {
    DEFAULT_RELEASE_MAX
}

impl ClientConfig {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            username: None,
            password: None,
            historic_timeout_ms: DEFAULT_HISTORIC_TIMEOUT_MS,
            release_max: DEFAULT_RELEASE_MAX,
            request_timeout_ms: None,
        }
    }

    /// Username and password, only when both are set.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }

    pub fn historic_timeout(&self) -> Duration {
        Duration::from_millis(self.historic_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a JSON (.json) or YAML (.yaml/.yml) file.
    /// Other extensions try JSON first, then YAML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ServerError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServerError::from_config_error(e, "config loading"))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "json" => serde_json::from_str(&content)
                .map_err(|e| ServerError::from_config_error(e, "JSON config parsing")),
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| ServerError::from_config_error(e, "YAML config parsing")),
            _ => serde_json::from_str(&content)
                .or_else(|_| serde_yaml::from_str(&content))
                .map_err(|e| {
                    ServerError::from_config_error(e, "config parsing (tried both JSON and YAML)")
                }),
        }
    }
}
