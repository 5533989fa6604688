//! Integration test: Configuration utilities
//!
//! Tests config path lookup and loading `events_config.yaml` from disk.

use status_monitor::bin_common::{load_config_from_env, ConfigError, ConfigType, EventsConfig};
use status_monitor::stompsockets::ProtocolMode;
use std::env;
use std::io::Write;
use std::time::Duration;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_events_config_default() {
    // Clear env var to test default
    env::remove_var("EVENTS_CONFIG_PATH");

    let config_path = load_config_from_env(ConfigType::Events);
    assert_eq!(config_path.to_str().unwrap(), "config/events_config.yaml");
}

#[test]
fn test_custom_config() {
    let custom = ConfigType::Custom("custom/path.yaml".to_string());
    let config_path = load_config_from_env(custom);

    assert_eq!(config_path.to_str().unwrap(), "custom/path.yaml");
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
ws_url: wss://status.example.com/serv-stat
protocol: raw
handshake_timeout_ms: 1500
connect_timeout_ms: 3000
heartbeat_ms: 10000
reconnect:
  max_attempts: 3
  interval_ms: 2000
topics:
  deploy-status: /topic/deploy-status
subscribe:
  - server-status-update
  - deploy-status
log_level: debug
"#,
    );

    let config = EventsConfig::load(file.path()).unwrap();

    assert_eq!(config.protocol, ProtocolMode::Raw);
    assert_eq!(config.handshake_timeout(), Duration::from_millis(1500));
    assert_eq!(config.connect_timeout(), Duration::from_millis(3000));
    assert_eq!(config.heartbeat_ms, Some(10_000));
    assert_eq!(config.reconnect.max_attempts, 3);
    assert_eq!(config.reconnect_interval(), Duration::from_secs(2));
    assert_eq!(
        config.topics.get("deploy-status").map(String::as_str),
        Some("/topic/deploy-status")
    );
    assert_eq!(config.subscribe, vec!["server-status-update", "deploy-status"]);
}

#[test]
fn test_missing_file_is_file_error() {
    let err = EventsConfig::load("does/not/exist.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::FileError(_)));
}

#[test]
fn test_invalid_yaml_is_yaml_error() {
    let file = write_config("reconnect: [not, a, map]\n");
    let err = EventsConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::YamlError(_)));
}

#[test]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/events_config.yaml");
    let config = EventsConfig::from_yaml_str(&std::fs::read_to_string(path).unwrap()).unwrap();

    assert_eq!(config.reconnect.max_attempts, 5);
    assert_eq!(config.reconnect.interval_ms, 5000);
}

#[tokio::test]
async fn test_build_client_from_config() {
    let config = EventsConfig::from_yaml_str(
        "ws_url: ws://127.0.0.1:9/serv-stat\nreconnect:\n  max_attempts: 1\n  interval_ms: 10\n",
    )
    .unwrap();

    let client = config.build_client().await.unwrap();
    assert_eq!(client.url(), "ws://127.0.0.1:9/serv-stat");
    assert!(!client.is_connected());

    client.close().await;
}
