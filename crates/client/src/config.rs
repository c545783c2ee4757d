//! Client configuration
//!
//! Loaded from TOML; every field has a default so a partial file (or no
//! file at all) is valid. Environment overrides are applied on top.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chatstream_protocol::DEFAULT_SESSION_ID;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8000/ws";
pub const DEFAULT_MODE: &str = "chat";
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend WebSocket endpoint
    pub url: String,
    /// Session to open on first connect
    pub session_id: String,
    /// Generation mode sent with each chat turn
    pub mode: String,
    /// Fragment coalescing interval
    pub flush_interval_ms: u64,
    pub reconnect: ReconnectConfig,
    /// Extra handshake headers (e.g. an auth header supplied by a token provider)
    pub headers: BTreeMap<String, String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            session_id: DEFAULT_SESSION_ID.to_string(),
            mode: DEFAULT_MODE.to_string(),
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            reconnect: ReconnectConfig::default(),
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fractional jitter applied to each delay, e.g. 0.1 for ±10%
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            jitter: 0.1,
        }
    }
}

impl ReconnectConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl ClientConfig {
    /// Parse only. Call `validate()` once every override layer is applied.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Apply `CHATSTREAM_URL` / `CHATSTREAM_SESSION` when set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(
            std::env::var("CHATSTREAM_URL").ok(),
            std::env::var("CHATSTREAM_SESSION").ok(),
        );
    }

    fn apply_overrides(&mut self, url: Option<String>, session_id: Option<String>) {
        if let Some(url) = url.filter(|v| !v.trim().is_empty()) {
            self.url = url.trim().to_string();
        }
        if let Some(session_id) = session_id.filter(|v| !v.trim().is_empty()) {
            self.session_id = session_id.trim().to_string();
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".into()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "url must use ws:// or wss://, got {url}"
            )));
        }
        if self.session_id.trim().is_empty() {
            return Err(ConfigError::Invalid("session_id must not be empty".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "flush_interval_ms must be greater than zero".into(),
            ));
        }
        let reconnect = &self.reconnect;
        if reconnect.base_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.base_delay_ms must be greater than zero".into(),
            ));
        }
        if reconnect.max_delay_ms < reconnect.base_delay_ms {
            return Err(ConfigError::Invalid(
                "reconnect.max_delay_ms must be >= reconnect.base_delay_ms".into(),
            ));
        }
        if !(0.0..1.0).contains(&reconnect.jitter) {
            return Err(ConfigError::Invalid(
                "reconnect.jitter must be in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}
