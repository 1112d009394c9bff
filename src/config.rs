//! Configuration module for Betafarm.

use serde::Deserialize;
use std::path::Path;

use crate::{BetafarmError, Result};

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL, used to build hub callback URLs.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_public_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "data/betafarm.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional log file; console only when unset.
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// PubSubHubbub subscriber configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Hub used when a feed does not advertise one.
    #[serde(default = "default_hub")]
    pub default_hub: String,
    /// Username for the default hub (empty = anonymous).
    #[serde(default)]
    pub default_hub_username: String,
    /// Password for the default hub (empty = anonymous).
    #[serde(default)]
    pub default_hub_password: String,
    /// Requested subscription lease in seconds.
    #[serde(default = "default_lease_seconds")]
    pub lease_seconds: u64,
    /// Renew subscriptions whose lease ends within this many seconds.
    #[serde(default = "default_renew_before")]
    pub renew_before_secs: u64,
    /// How often the lease renewer looks for expiring subscriptions.
    #[serde(default = "default_renew_check_interval")]
    pub renew_check_interval_secs: u64,
    /// Attempts per background task before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay of the exponential retry backoff, in milliseconds.
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total request timeout in seconds.
    #[serde(default = "default_total_timeout")]
    pub total_timeout_secs: u64,
    /// Maximum number of redirects.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Maximum size of a fetched page or feed in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
    /// Allow fetching from loopback/private addresses (development only).
    #[serde(default)]
    pub allow_private_hosts: bool,
}

fn default_hub() -> String {
    "http://superfeedr.com/hubbub".to_string()
}

fn default_lease_seconds() -> u64 {
    86400 // 1 day
}

fn default_renew_before() -> u64 {
    3600 // 1 hour
}

fn default_renew_check_interval() -> u64 {
    600 // 10 minutes
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    20
}

fn default_total_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_body_bytes() -> u64 {
    5 * 1024 * 1024 // 5MB
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            default_hub: default_hub(),
            default_hub_username: String::new(),
            default_hub_password: String::new(),
            lease_seconds: default_lease_seconds(),
            renew_before_secs: default_renew_before(),
            renew_check_interval_secs: default_renew_check_interval(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            total_timeout_secs: default_total_timeout(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
            allow_private_hosts: false,
        }
    }
}

/// Activity timeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    /// Page size of a project's activity stream.
    #[serde(default = "default_project_page_size")]
    pub project_page_size: u32,
    /// Page size of a user's dashboard.
    #[serde(default = "default_dashboard_page_size")]
    pub dashboard_page_size: u32,
}

fn default_project_page_size() -> u32 {
    10
}

fn default_dashboard_page_size() -> u32 {
    20
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            project_page_size: default_project_page_size(),
            dashboard_page_size: default_dashboard_page_size(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Push subscriber configuration.
    #[serde(default)]
    pub push: PushConfig,
    /// Activity timeline configuration.
    #[serde(default)]
    pub activity: ActivityConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(BetafarmError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BetafarmError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `BETAFARM_HUB_USERNAME`: default hub username
    /// - `BETAFARM_HUB_PASSWORD`: default hub password
    /// - `BETAFARM_PUBLIC_URL`: externally reachable base URL
    pub fn apply_env_overrides(&mut self) {
        if let Some(username) = non_empty_env("BETAFARM_HUB_USERNAME") {
            self.push.default_hub_username = username;
        }
        if let Some(password) = non_empty_env("BETAFARM_HUB_PASSWORD") {
            self.push.default_hub_password = password;
        }
        if let Some(public_url) = non_empty_env("BETAFARM_PUBLIC_URL") {
            self.server.public_url = public_url;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.push.default_hub.trim().is_empty() {
            return Err(BetafarmError::Config(
                "push.default_hub must not be empty".to_string(),
            ));
        }

        match url::Url::parse(&self.server.public_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(BetafarmError::Config(format!(
                    "server.public_url is not an absolute http(s) URL: {}",
                    self.server.public_url
                )));
            }
        }

        if self.activity.project_page_size == 0 || self.activity.dashboard_page_size == 0 {
            return Err(BetafarmError::Config(
                "activity page sizes must be greater than zero".to_string(),
            ));
        }

        if self.push.max_attempts == 0 {
            return Err(BetafarmError::Config(
                "push.max_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
