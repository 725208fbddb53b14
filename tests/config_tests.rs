//! Configuration loading tests
//!
//! Loads real files through the public API: layering, validation and the
//! conversion into a client configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use rtm_client::config::{init_config, AppConfig};
use rtm_client::{Error, ErrorCode, ProxyConfig};
use tempfile::TempDir;

/// Temporary config file
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new(content: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("client.toml");
        fs::write(&config_path, content).unwrap();
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    fn load(&self) -> rtm_client::Result<AppConfig> {
        AppConfig::load(Some(self.path()))
    }
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_file_uses_defaults() {
    let config = ConfigFixture::new("").load().unwrap();

    assert!(config.gateway.url.is_empty());
    assert_eq!(config.gateway.heartbeat_interval_ms, 3000);
    assert!(config.gateway.proxy.is_none());
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.json_format);
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new(
        r#"
[gateway]
url = "wss://gateway.example.com/websocket/abc"
heartbeat_interval_ms = 1000

[gateway.proxy]
host = "proxy.internal"
port = 8080

[logging]
level = "debug"
max_files = 2
json_format = true
"#,
    );

    let config = fixture.load().unwrap();
    assert_eq!(config.gateway.url, "wss://gateway.example.com/websocket/abc");
    assert_eq!(config.gateway.proxy, Some(ProxyConfig::new("proxy.internal", 8080)));
    assert_eq!(config.logging.max_files, 2);
    assert!(config.logging.json_format);

    let client = config.gateway.to_client_config().unwrap();
    assert_eq!(client.url(), "wss://gateway.example.com/websocket/abc");
    assert_eq!(client.heartbeat_interval(), Duration::from_millis(1000));
    assert_eq!(client.proxy().map(|p| p.host.as_str()), Some("proxy.internal"));
}

#[test]
fn test_log_file_tilde_is_expanded() {
    let config = ConfigFixture::new("[logging]\nfile = \"~/rtm/client.log\"\n")
        .load()
        .unwrap();

    let file = config.logging.file.unwrap();
    assert!(!file.starts_with('~'));
    assert!(file.ends_with("rtm/client.log"));
}

#[test]
fn test_config_roundtrips_through_toml() {
    let config = ConfigFixture::new("[gateway]\nurl = \"ws://127.0.0.1:9000/ws\"\n")
        .load()
        .unwrap();

    let rendered = toml::to_string_pretty(&config).unwrap();
    let reparsed = ConfigFixture::new(&rendered).load().unwrap();
    assert_eq!(reparsed.gateway.url, config.gateway.url);
    assert_eq!(reparsed.gateway.heartbeat_interval_ms, config.gateway.heartbeat_interval_ms);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_malformed_toml() {
    let err = ConfigFixture::new("[gateway\nurl = ").load().unwrap_err();

    assert!(matches!(err, Error::ConfigParse { .. }));
    assert_eq!(err.code(), ErrorCode::ConfigParseError);
}

#[test]
fn test_wrong_field_type() {
    let err = ConfigFixture::new("[gateway]\nheartbeat_interval_ms = \"fast\"\n")
        .load()
        .unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
}

#[test]
fn test_invalid_values() {
    let cases = [
        "[gateway]\nurl = \"https://gateway.example.com\"\n",
        "[gateway]\nheartbeat_interval_ms = 0\n",
        "[gateway.proxy]\nhost = \"\"\nport = 3128\n",
        "[gateway.proxy]\nhost = \"proxy\"\nport = 0\n",
        "[logging]\nlevel = \"verbose\"\n",
    ];

    for content in cases {
        let err = ConfigFixture::new(content).load().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConfigValidation, "content: {}", content);
        assert_eq!(err.exit_code(), 10);
    }
}

#[test]
fn test_missing_explicit_file() {
    let err = AppConfig::load(Some("/nonexistent/path/client.toml")).unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound { .. }));
}

#[test]
fn test_client_config_requires_url() {
    let config = ConfigFixture::new("").load().unwrap();
    let err = config.gateway.to_client_config().unwrap_err();

    assert!(err.to_string().contains("Gateway URL is not set"));
}

// ─────────────────────────────────────────────────────────────────
// Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_init_writes_loadable_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("client.toml");
    let path_str = path.to_string_lossy().to_string();

    init_config(Some(&path_str), false).unwrap();
    let config = AppConfig::load(Some(&path_str)).unwrap();

    assert_eq!(config.gateway.heartbeat_interval_ms, 3000);
    assert!(init_config(Some(&path_str), false).is_err());
}
