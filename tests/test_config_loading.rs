//! Configuration loading and validation tests
//!
//! Tests focus on BEHAVIOR of configuration loading, validation, and error handling:
//! what a client built from a file ends up doing, not how TOML is parsed.

use push_session::config::{ClientConfig, ConfigError, SessionSettings};
use push_session::protocol::SubscriptionMode;
use push_session::testing::{MockTransport, RecordingStatusListener, TransportCall};
use push_session::{ClientError, ConnectionStatus, PushClient};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{content}").unwrap();
    temp_file
}

#[test]
fn test_config_loads_successfully_from_valid_toml() {
    let temp_file = write_config(
        r#"
[server]
url = "https://push.example.com"
adapter = "QUOTES"

[session]
stop_pause_ms = 200
reconnect_wait_ms = 2000
batch_timeout_secs = 10

[mpn]
enabled = true
trigger_head = "ask"

[[subscriptions]]
group = "item1 item2"
schema = "last_price time"
data_adapter = "QUOTE_ADAPTER"
trigger = 100.5
"#,
    );

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.server.url, "https://push.example.com");
    assert_eq!(config.server.adapter, "QUOTES");
    assert!(config.mpn.enabled);
    assert_eq!(config.subscriptions.len(), 1);

    let entry = &config.subscriptions[0];
    assert_eq!(entry.mode, SubscriptionMode::Merge);
    assert_eq!(entry.trigger, Some(100.5));
    let info = entry.table_info();
    assert_eq!(info.group, "item1 item2");
    assert_eq!(info.data_adapter.as_deref(), Some("QUOTE_ADAPTER"));
    assert!(!info.snapshot);
}

#[test]
fn test_session_settings_follow_the_file() {
    let temp_file = write_config(
        r#"
[server]
url = "ws://localhost:8080"
adapter = "QUOTES"

[session]
stop_pause_ms = 200
reconnect_wait_ms = 2000
batch_timeout_secs = 10

[mpn]
trigger_head = "ask"
"#,
    );

    let settings = ClientConfig::load_from_file(temp_file.path())
        .unwrap()
        .session_settings();

    assert_eq!(settings.adapter, "QUOTES");
    assert_eq!(settings.stop_pause, Duration::from_millis(200));
    assert_eq!(settings.reconnect_wait, Duration::from_millis(2000));
    assert_eq!(settings.batch_timeout, Duration::from_secs(10));
    assert_eq!(settings.trigger_format.greater_than(3.5), "ask>3.5");
}

#[test]
fn test_omitted_sections_use_fixed_policy() {
    let temp_file = write_config("[server]\nurl = \"http://localhost:8080\"");

    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.session_settings(), SessionSettings::default());
    assert_eq!(config.session.stop_pause(), Duration::from_millis(500));
    assert_eq!(config.session.reconnect_wait(), Duration::from_millis(5000));
    assert_eq!(config.session.batch_timeout(), Duration::from_secs(5));
    assert!(!config.mpn.enabled);
}

#[test]
fn test_config_fails_when_file_missing() {
    let result = ClientConfig::load_from_file(Path::new("/nonexistent/push-session.toml"));

    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_config_fails_on_malformed_toml() {
    let temp_file = write_config("[server\nurl = ");

    let result = ClientConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_fails_on_unknown_subscription_mode() {
    let temp_file = write_config(
        r#"
[server]
url = "http://localhost:8080"

[[subscriptions]]
group = "item1"
schema = "bid"
mode = "sometimes"
"#,
    );

    let result = ClientConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_config_rejects_unsupported_server_scheme() {
    let temp_file = write_config("[server]\nurl = \"mqtt://localhost:1883\"");

    let result = ClientConfig::load_from_file(temp_file.path());

    match result {
        Err(ConfigError::InvalidServerUrl(url)) => assert_eq!(url, "mqtt://localhost:1883"),
        other => panic!("expected InvalidServerUrl, got {other:?}"),
    }
}

#[test]
fn test_config_rejects_empty_trigger_head() {
    let temp_file = write_config("[server]\nurl = \"http://localhost:8080\"\n[mpn]\ntrigger_head = \"\"");

    let result = ClientConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_round_trips_through_pretty_toml() {
    let temp_file = write_config(
        r#"
[server]
url = "http://localhost:8080"

[[subscriptions]]
group = "item3"
schema = "bid ask"
mode = "command"
snapshot = true
"#,
    );
    let config = ClientConfig::load_from_file(temp_file.path()).unwrap();

    let rendered = toml::to_string_pretty(&config).unwrap();

    assert_eq!(ClientConfig::from_toml_str(&rendered).unwrap(), config);
}

#[test]
fn test_invalid_config_surfaces_as_client_error() {
    let err: ClientError = ConfigError::InvalidConfig("bad".to_string()).into();

    assert!(err.to_string().contains("Configuration error"));
}

#[tokio::test(start_paused = true)]
async fn test_client_from_config_connects_to_configured_server() {
    // Arrange
    let config = ClientConfig::from_toml_str(
        "[server]\nurl = \"wss://push.example.com/ls\"\nadapter = \"QUOTES\"\n[mpn]\nenabled = true\n",
    )
    .unwrap();
    let transport = Arc::new(MockTransport::new());
    let status = RecordingStatusListener::new();

    // Act
    let client = PushClient::from_config(transport.clone(), &config).unwrap();
    client.set_status_listener(status.clone());
    assert!(client.is_pn_enabled());
    client.start();

    // Assert
    assert!(status.wait_for(ConnectionStatus::Streaming, Duration::from_secs(60)).await);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let calls = transport.get_calls().await;
    assert!(matches!(
        &calls[0],
        TransportCall::Open { adapter, server_url: Some(url) }
            if adapter == "QUOTES" && url.as_str() == "wss://push.example.com/ls"
    ));
    assert!(calls.contains(&TransportCall::InquireAllMpn));

    client.shutdown().await.unwrap();
}
