//! Connection manager configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration:
//!
//! ```toml
//! api_base_url = "https://social.example.com/api"
//! proxy_bypass_header = true
//!
//! [reconnect]
//! initial_delay_ms = 2000
//! max_delay_ms = 60000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use kinship_protocol::constants::{
    HANDSHAKE_TIMEOUT, HUB_PATH, KEEPALIVE_INTERVAL, REQUEST_TIMEOUT, SERVER_TIMEOUT,
};

use crate::types::ReconnectConfig;

/// Errors loading a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Settings for [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConnectionConfig {
    /// Base address of the REST API; the hub address is derived from it.
    pub api_base_url: String,
    /// Hub path appended to the REST host.
    pub hub_path: String,
    /// Attach the tunnelling-proxy bypass header to the upgrade request.
    pub proxy_bypass_header: bool,
    #[serde(rename = "request_timeout_ms", with = "millis")]
    pub request_timeout: Duration,
    #[serde(rename = "handshake_timeout_ms", with = "millis")]
    pub handshake_timeout: Duration,
    #[serde(rename = "keepalive_interval_ms", with = "millis")]
    pub keepalive_interval: Duration,
    #[serde(rename = "server_timeout_ms", with = "millis")]
    pub server_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for HubConnectionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".into(),
            hub_path: HUB_PATH.into(),
            proxy_bypass_header: true,
            request_timeout: REQUEST_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            server_timeout: SERVER_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl HubConnectionConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Serializes a [`Duration`] as whole milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
