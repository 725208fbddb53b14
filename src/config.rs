//! Configuration for the `rtm-client` binary
//!
//! Sources, highest precedence first:
//! 1. CLI arguments
//! 2. Environment variables (RTM_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values
//!
//! The library API takes a [`ClientConfig`] directly; this module only turns
//! operator-facing settings into one.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::{ClientConfig, DEFAULT_HEARTBEAT_INTERVAL};
use crate::error::{Error, Result};
use crate::transport::ProxyConfig;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "RTM_CONFIG";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Gateway connection settings
    pub gateway: GatewaySettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Gateway connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    /// WebSocket URL returned by the gateway's connect API
    pub url: String,

    /// Heartbeat interval in milliseconds
    pub heartbeat_interval_ms: u64,

    /// HTTP proxy to tunnel through
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (unset = console only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL.as_millis() as u64,
            proxy: None,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl GatewaySettings {
    /// Build the library configuration; the URL must be set
    pub fn to_client_config(&self) -> Result<ClientConfig> {
        if self.url.is_empty() {
            return Err(Error::config_field_invalid(
                "gateway.url",
                "Gateway URL is not set (use --url, RTM_GATEWAY_URL or [gateway] url)",
            ));
        }

        let mut config = ClientConfig::new(self.url.clone())
            .with_heartbeat_interval(Duration::from_millis(self.heartbeat_interval_ms));
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy(proxy.clone());
        }
        Ok(config)
    }
}

impl AppConfig {
    /// Load from file (explicit, `RTM_CONFIG`, or the search path), then apply env overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let explicit = config_path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty()));

        let mut config = match Self::find_config_file(explicit.as_deref())? {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                let content = fs::read_to_string(&path)?;
                let config = toml::from_str(&content)
                    .map_err(|e| Error::config_parse(path.display().to_string(), e))?;
                info!(path = %path.display(), "Configuration loaded from file");
                config
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Resolve the configuration file to read, if any
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            return if path.exists() {
                Ok(Some(path))
            } else {
                Err(Error::config_not_found(path))
            };
        }

        let search_paths = [
            Some(PathBuf::from("rtm-client.toml")),
            dirs::config_dir().map(|p| p.join("rtm").join("client.toml")),
            dirs::home_dir().map(|p| p.join(".rtm").join("client.toml")),
            Some(PathBuf::from("/etc/rtm/client.toml")),
        ];

        for path in search_paths.into_iter().flatten() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply RTM_* environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RTM_GATEWAY_URL") {
            self.gateway.url = val;
        }
        if let Some(n) = env_parse("RTM_HEARTBEAT_INTERVAL_MS") {
            self.gateway.heartbeat_interval_ms = n;
        }

        let proxy_host = std::env::var("RTM_PROXY_HOST").ok();
        let proxy_port = env_parse::<u16>("RTM_PROXY_PORT");
        if proxy_host.is_some() || proxy_port.is_some() {
            let proxy = self
                .gateway
                .proxy
                .get_or_insert_with(|| ProxyConfig::new(String::new(), 0));
            if let Some(host) = proxy_host {
                proxy.host = host;
            }
            if let Some(port) = proxy_port {
                proxy.port = port;
            }
        }

        if let Ok(val) = std::env::var("RTM_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("RTM_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("RTM_LOG_JSON") {
            self.logging.json_format = parse_bool(&val);
        }
    }

    fn expand_paths(&mut self) {
        if let Some(file) = &self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Check field values; an empty gateway URL is allowed here
    pub fn validate(&self) -> Result<()> {
        let url = &self.gateway.url;
        if !url.is_empty() && !url.starts_with("ws://") && !url.starts_with("wss://") {
            return Err(Error::config_field_invalid(
                "gateway.url",
                format!("Gateway URL must start with ws:// or wss:// (got '{}')", url),
            ));
        }

        if self.gateway.heartbeat_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "gateway.heartbeat_interval_ms",
                "Heartbeat interval must be greater than zero",
            ));
        }

        if let Some(proxy) = &self.gateway.proxy {
            if proxy.host.trim().is_empty() {
                return Err(Error::config_field_invalid("gateway.proxy.host", "Proxy host cannot be empty"));
            }
            if proxy.port == 0 {
                return Err(Error::config_field_invalid("gateway.proxy.port", "Proxy port must be greater than zero"));
            }
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.trim().parse().ok())
}

fn parse_bool(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location written by `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".rtm")
        .join("client.toml")
}

/// Write a commented default configuration file; returns its path
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, DEFAULT_CONFIG).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

const DEFAULT_CONFIG: &str = r#"# rtm-client configuration

[gateway]
# WebSocket URL obtained from the gateway's connect API.
# Usually short-lived, so it is often passed with --url or RTM_GATEWAY_URL instead.
url = ""

# Heartbeat interval in milliseconds
heartbeat_interval_ms = 3000

# HTTP proxy to tunnel the connection through (CONNECT)
# [gateway.proxy]
# host = "proxy.example.com"
# port = 3128

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.rtm/logs/client.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(config.gateway.url.is_empty());
        assert_eq!(config.gateway.heartbeat_interval_ms, 3000);
        assert!(config.gateway.proxy.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let parsed: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        let defaults = AppConfig::default();

        assert_eq!(parsed.gateway.url, defaults.gateway.url);
        assert_eq!(parsed.gateway.heartbeat_interval_ms, defaults.gateway.heartbeat_interval_ms);
        assert_eq!(parsed.logging.max_files, defaults.logging.max_files);
    }

    #[test]
    fn test_env_override() {
        env::set_var("RTM_GATEWAY_URL", "wss://env.example.com/ws");
        env::set_var("RTM_HEARTBEAT_INTERVAL_MS", "1500");
        env::set_var("RTM_PROXY_HOST", "proxy.env");
        env::set_var("RTM_PROXY_PORT", "8080");
        env::set_var("RTM_LOG_JSON", "1");

        let mut config = AppConfig::default();
        config.apply_env_overrides();

        env::remove_var("RTM_GATEWAY_URL");
        env::remove_var("RTM_HEARTBEAT_INTERVAL_MS");
        env::remove_var("RTM_PROXY_HOST");
        env::remove_var("RTM_PROXY_PORT");
        env::remove_var("RTM_LOG_JSON");

        assert_eq!(config.gateway.url, "wss://env.example.com/ws");
        assert_eq!(config.gateway.heartbeat_interval_ms, 1500);
        assert_eq!(config.gateway.proxy, Some(ProxyConfig::new("proxy.env", 8080)));
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_validation_rejects_http_url() {
        let mut config = AppConfig::default();
        config.gateway.url = "http://gateway.example.com".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { field: Some(ref f), .. } if f == "gateway.url"));
    }

    #[test]
    fn test_validation_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.gateway.heartbeat_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_proxy() {
        let mut config = AppConfig::default();
        config.gateway.proxy = Some(ProxyConfig::new("", 3128));
        assert!(config.validate().is_err());

        config.gateway.proxy = Some(ProxyConfig::new("proxy.local", 0));
        assert!(config.validate().is_err());

        config.gateway.proxy = Some(ProxyConfig::new("proxy.local", 3128));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_client_config() {
        let settings = GatewaySettings {
            url: "wss://gateway.example.com/ws".to_string(),
            heartbeat_interval_ms: 250,
            proxy: Some(ProxyConfig::new("proxy.local", 3128)),
        };

        let client = settings.to_client_config().unwrap();
        assert_eq!(client.url(), "wss://gateway.example.com/ws");
        assert_eq!(client.heartbeat_interval(), Duration::from_millis(250));
        assert_eq!(client.proxy().map(|p| p.port), Some(3128));

        assert!(GatewaySettings::default().to_client_config().is_err());
    }

    #[test]
    fn test_parse_config_file() {
        let config: AppConfig = toml::from_str(
            r#"
[gateway]
url = "wss://custom.example.com/ws"
heartbeat_interval_ms = 10000

[gateway.proxy]
host = "proxy.corp"
port = 3128

[logging]
level = "debug"
"#,
        )
        .unwrap();

        assert_eq!(config.gateway.url, "wss://custom.example.com/ws");
        assert_eq!(config.gateway.heartbeat_interval_ms, 10000);
        assert_eq!(config.gateway.proxy, Some(ProxyConfig::new("proxy.corp", 3128)));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.max_files, 5);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let err = AppConfig::find_config_file(Some("/nonexistent/rtm/client.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_init_config_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("client.toml");
        let path_str = path.to_string_lossy().to_string();

        let written = init_config(Some(&path_str), false).unwrap();
        assert_eq!(written, path);
        assert!(fs::read_to_string(&path).unwrap().contains("[gateway]"));

        assert!(init_config(Some(&path_str), false).is_err());
        assert!(init_config(Some(&path_str), true).is_ok());
    }
}
