//! Server configuration loading from file and environment variables.

use eventful_db::DbRuntimeSettings;
use eventful_feed::FeedSettings;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Feed paging settings.
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "eventful_feed=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Feed configuration. Zero durations disable the corresponding feature.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Largest accepted `limit` query parameter.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Concurrent event lookups while hydrating invitations.
    #[serde(default = "default_hydrate_concurrency")]
    pub hydrate_concurrency: usize,

    /// Invitation rows requested per store round.
    #[serde(default = "default_invitation_batch_size")]
    pub invitation_batch_size: usize,

    /// Whole-request deadline in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Lifetime of cached continuation tokens in seconds.
    #[serde(default)]
    pub cursor_cache_ttl_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "eventful.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_page_size() -> u32 {
    FeedSettings::default().max_page_size
}

fn default_hydrate_concurrency() -> usize {
    FeedSettings::default().hydrate_concurrency
}

fn default_invitation_batch_size() -> usize {
    FeedSettings::default().invitation_batch_size
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            hydrate_concurrency: default_hydrate_concurrency(),
            invitation_batch_size: default_invitation_batch_size(),
            request_timeout_ms: default_request_timeout_ms(),
            cursor_cache_ttl_secs: 0,
        }
    }
}

impl DatabaseConfig {
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

impl FeedConfig {
    pub fn to_settings(&self) -> FeedSettings {
        FeedSettings {
            max_page_size: self.max_page_size.max(1),
            hydrate_concurrency: self.hydrate_concurrency.max(1),
            invitation_batch_size: self.invitation_batch_size.max(1),
            request_timeout: (self.request_timeout_ms > 0)
                .then(|| Duration::from_millis(self.request_timeout_ms)),
            cursor_cache_ttl: (self.cursor_cache_ttl_secs > 0)
                .then(|| Duration::from_secs(self.cursor_cache_ttl_secs)),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `EVENTFUL_HOST` overrides `server.host`
/// - `EVENTFUL_PORT` overrides `server.port`
/// - `EVENTFUL_DB_PATH` overrides `database.path`
/// - `EVENTFUL_LOG_LEVEL` overrides `logging.level`
/// - `EVENTFUL_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("EVENTFUL_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("EVENTFUL_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("EVENTFUL_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("EVENTFUL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("EVENTFUL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    Ok(config)
}

/// Parses TOML configuration text without applying environment overrides.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}
