//! Configuration for the push session client
//!
//! Loaded from TOML. Only `[server] url` is required; every timing falls back
//! to the fixed reconnection policy (500 ms stop pause, 5000 ms reconnect wait,
//! 5 s resubscribe batch timeout).

use crate::protocol::{SubscriptionMode, TableInfo, TriggerFormat, DEFAULT_TRIGGER_HEAD};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_ADAPTER: &str = "DEMO";
pub const DEFAULT_STOP_PAUSE_MS: u64 = 500;
pub const DEFAULT_RECONNECT_WAIT_MS: u64 = 5000;
pub const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 5;

const SUPPORTED_SCHEMES: [&str; 4] = ["http", "https", "ws", "wss"];

/// Top-level client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    pub server: ServerSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub mpn: MpnSection,
    /// Subscriptions applied by the `demo` command
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionEntry>,
}

/// Push server endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    pub url: String,
    /// Adapter set requested when opening the session
    #[serde(default = "default_adapter")]
    pub adapter: String,
}

fn default_adapter() -> String {
    DEFAULT_ADAPTER.to_string()
}

/// Reconnection timings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    /// Debounce applied by `stop(pause = true)`
    #[serde(default = "default_stop_pause_ms")]
    pub stop_pause_ms: u64,
    /// Delay between failed open attempts
    #[serde(default = "default_reconnect_wait_ms")]
    pub reconnect_wait_ms: u64,
    /// Upper bound on waiting for the resubscribe batch after a reconnect
    #[serde(default = "default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
}

fn default_stop_pause_ms() -> u64 {
    DEFAULT_STOP_PAUSE_MS
}

fn default_reconnect_wait_ms() -> u64 {
    DEFAULT_RECONNECT_WAIT_MS
}

fn default_batch_timeout_secs() -> u64 {
    DEFAULT_BATCH_TIMEOUT_SECS
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            stop_pause_ms: DEFAULT_STOP_PAUSE_MS,
            reconnect_wait_ms: DEFAULT_RECONNECT_WAIT_MS,
            batch_timeout_secs: DEFAULT_BATCH_TIMEOUT_SECS,
        }
    }
}

impl SessionSection {
    pub fn stop_pause(&self) -> Duration {
        Duration::from_millis(self.stop_pause_ms)
    }

    pub fn reconnect_wait(&self) -> Duration {
        Duration::from_millis(self.reconnect_wait_ms)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

/// Mobile push notification participation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MpnSection {
    /// Initial value of `enable_pn`
    #[serde(default)]
    pub enabled: bool,
    /// Field name prefixed to every trigger expression
    #[serde(default = "default_trigger_head")]
    pub trigger_head: String,
}

fn default_trigger_head() -> String {
    DEFAULT_TRIGGER_HEAD.to_string()
}

impl Default for MpnSection {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_head: default_trigger_head(),
        }
    }
}

/// One subscription as declared in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionEntry {
    pub group: String,
    pub schema: String,
    #[serde(default)]
    pub mode: SubscriptionMode,
    #[serde(default)]
    pub data_adapter: Option<String>,
    #[serde(default)]
    pub snapshot: bool,
    /// Request an MPN firing when the trigger field exceeds this value
    #[serde(default)]
    pub trigger: Option<f64>,
}

impl SubscriptionEntry {
    pub fn table_info(&self) -> TableInfo {
        let info = TableInfo::new(&self.group, &self.schema, self.mode).with_snapshot(self.snapshot);
        match &self.data_adapter {
            Some(adapter) => info.with_data_adapter(adapter),
            None => info,
        }
    }
}

/// Runtime settings consumed by the session core
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub adapter: String,
    pub stop_pause: Duration,
    pub reconnect_wait: Duration,
    pub batch_timeout: Duration,
    pub trigger_format: TriggerFormat,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            adapter: DEFAULT_ADAPTER.to_string(),
            stop_pause: Duration::from_millis(DEFAULT_STOP_PAUSE_MS),
            reconnect_wait: Duration::from_millis(DEFAULT_RECONNECT_WAIT_MS),
            batch_timeout: Duration::from_secs(DEFAULT_BATCH_TIMEOUT_SECS),
            trigger_format: TriggerFormat::default(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_server_url(&self.server.url)?;

        if self.server.adapter.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "server.adapter must not be empty".to_string(),
            ));
        }
        if self.session.batch_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.batch_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.mpn.trigger_head.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "mpn.trigger_head must not be empty".to_string(),
            ));
        }
        if let Some(entry) = self.subscriptions.iter().find(|s| s.group.trim().is_empty()) {
            return Err(ConfigError::InvalidConfig(format!(
                "subscription with schema '{}' has an empty group",
                entry.schema
            )));
        }

        Ok(())
    }

    /// Parsed server URL; valid once `validate` has passed
    pub fn server_url(&self) -> Result<Url, ConfigError> {
        parse_server_url(&self.server.url)
    }

    pub fn trigger_format(&self) -> TriggerFormat {
        TriggerFormat::new(&self.mpn.trigger_head)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            adapter: self.server.adapter.clone(),
            stop_pause: self.session.stop_pause(),
            reconnect_wait: self.session.reconnect_wait(),
            batch_timeout: self.session.batch_timeout(),
            trigger_format: self.trigger_format(),
        }
    }
}

/// Parse a push server URL, accepting http(s) and ws(s) endpoints with a host
pub fn parse_server_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidServerUrl(raw.to_string()))?;

    if !SUPPORTED_SCHEMES.contains(&url.scheme()) || url.host_str().is_none() {
        return Err(ConfigError::InvalidServerUrl(raw.to_string()));
    }

    Ok(url)
}
