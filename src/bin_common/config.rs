//! Event client configuration
//!
//! Loaded from YAML (`config/events_config.yaml` by default) with an
//! environment override for the endpoint URL.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use stompsockets::{EventClient, FixedDelay, ProtocolMode, Topic};
use thiserror::Error;
use tracing::info;

/// Environment variable overriding `ws_url`
pub const WS_URL_ENV: &str = "STATUS_WS_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Reconnection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Connection attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Flat delay between attempts
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// Configuration for the `status_events` binary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Status endpoint, `ws://` or `wss://`
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// `stomp` (falls back to raw when the peer refuses) or `raw`
    #[serde(default)]
    pub protocol: ProtocolMode,

    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Client heart-beat interval, disabled when absent
    #[serde(default)]
    pub heartbeat_ms: Option<u64>,

    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Extra topic -> STOMP destination mappings
    #[serde(default)]
    pub topics: BTreeMap<String, String>,

    /// Topics the binary listens on
    #[serde(default = "default_subscribe")]
    pub subscribe: Vec<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_ws_url() -> String {
    "ws://localhost:8082/serv-stat".to_string()
}

fn default_handshake_timeout_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> usize {
    5
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_subscribe() -> Vec<String> {
    vec![Topic::SERVER_STATUS.to_string(), Topic::SCHEDULER_STATUS.to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            protocol: ProtocolMode::default(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_ms: None,
            reconnect: ReconnectConfig::default(),
            topics: BTreeMap::new(),
            subscribe: default_subscribe(),
            log_level: default_log_level(),
        }
    }
}

impl EventsConfig {
    /// Load configuration from a YAML file, then apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: EventsConfig = serde_yaml::from_str(&contents)?;

        config.override_ws_url(std::env::var(WS_URL_ENV).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parse and validate YAML without consulting the environment
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: EventsConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Replace `ws_url` when an override is present and non-empty
    pub fn override_ws_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|url| !url.trim().is_empty()) {
            info!("Overriding ws_url from {}", WS_URL_ENV);
            self.ws_url = url;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "ws_url must start with ws:// or wss://, got '{}'",
                self.ws_url
            )));
        }

        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "handshake_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "connect_timeout_ms must be > 0".to_string(),
            ));
        }

        if self.heartbeat_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "heartbeat_ms must be > 0 when set".to_string(),
            ));
        }

        if self.reconnect.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect.max_attempts must be >= 1".to_string(),
            ));
        }

        if self.reconnect.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect.interval_ms must be > 0".to_string(),
            ));
        }

        for (topic, destination) in &self.topics {
            if topic.trim().is_empty() || destination.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "topic mapping '{}' -> '{}' has an empty side",
                    topic, destination
                )));
            }
        }

        if let Some(topic) = self.subscribe.iter().find(|topic| topic.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "subscribe contains an empty topic: '{}'",
                topic
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {:?}",
                valid_levels
            )));
        }

        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect.interval_ms)
    }

    /// Build an event client from this configuration
    pub async fn build_client(&self) -> stompsockets::Result<EventClient> {
        let mut builder = stompsockets::builder()
            .url(self.ws_url.clone())
            .protocol(self.protocol)
            .handshake_timeout(self.handshake_timeout())
            .connect_timeout(self.connect_timeout())
            .reconnect_strategy(FixedDelay::new(
                self.reconnect_interval(),
                Some(self.reconnect.max_attempts),
            ));

        if let Some(heartbeat_ms) = self.heartbeat_ms {
            builder = builder.heartbeat(Duration::from_millis(heartbeat_ms));
        }

        for (topic, destination) in &self.topics {
            builder = builder.topic_destination(Topic::new(topic.clone())?, destination.clone());
        }

        builder.build().await
    }

    /// Log configuration
    pub fn log(&self) {
        info!("Event client configuration:");
        info!("  Endpoint: {}", self.ws_url);
        info!("  Protocol: {:?}", self.protocol);
        info!(
            "  Timeouts: handshake {}ms, connect {}ms",
            self.handshake_timeout_ms, self.connect_timeout_ms
        );
        match self.heartbeat_ms {
            Some(ms) => info!("  Heart-beat: {}ms", ms),
            None => info!("  Heart-beat: disabled"),
        }
        info!(
            "  Reconnect: {} attempts every {}ms",
            self.reconnect.max_attempts, self.reconnect.interval_ms
        );
        for (topic, destination) in &self.topics {
            info!("  Topic {} -> {}", topic, destination);
        }
        info!("  Subscribing to: {}", self.subscribe.join(", "));
    }
}
