//! Configuration for the WatchParty sync server
//!
//! Configuration can be loaded from a TOML file and/or environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main configuration for the sync server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Durable storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sync engine tuning
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP / WebSocket port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Directory of the web client, served at `/` when set
    #[serde(default)]
    pub static_dir: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            static_dir: None,
        }
    }
}

/// Durable store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid(format!(
                "unknown storage backend '{}'",
                other
            ))),
        }
    }
}

/// Durable storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite database file (created if missing)
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: PathBuf,
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("watchparty.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sqlite_path: default_sqlite_path(),
        }
    }
}

/// Sync engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Pending commands the engine queue holds before readers wait
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,

    /// Pending messages per connection before new ones are dropped
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

fn default_command_queue_capacity() -> usize {
    1024
}

fn default_outbound_queue_capacity() -> usize {
    64
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            command_queue_capacity: default_command_queue_capacity(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file if it exists, then apply `WATCHPARTY_*`
    /// environment overrides
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self, ConfigError> {
        let Some(p) = path else {
            return Self::from_env();
        };
        if !p.as_ref().exists() {
            tracing::warn!(
                path = %p.as_ref().display(),
                "Config file not found, using environment"
            );
            return Self::from_env();
        }

        let mut config = Self::from_file(p)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `WATCHPARTY_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("WATCHPARTY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("WATCHPARTY_HTTP_PORT") {
            if let Ok(p) = port.parse() {
                self.server.http_port = p;
            }
        }
        if let Ok(dir) = std::env::var("WATCHPARTY_STATIC_DIR") {
            self.server.static_dir = Some(dir);
        }

        // Storage
        if let Ok(backend) = std::env::var("WATCHPARTY_STORAGE_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        if let Ok(path) = std::env::var("WATCHPARTY_SQLITE_PATH") {
            self.storage.sqlite_path = PathBuf::from(path);
        }

        // Sync
        if let Ok(cap) = std::env::var("WATCHPARTY_COMMAND_QUEUE") {
            if let Ok(c) = cap.parse() {
                self.sync.command_queue_capacity = c;
            }
        }
        if let Ok(cap) = std::env::var("WATCHPARTY_OUTBOUND_QUEUE") {
            if let Ok(c) = cap.parse() {
                self.sync.outbound_queue_capacity = c;
            }
        }

        Ok(())
    }

    /// Address the HTTP listener binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.command_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "sync.command_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.sync.outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "sync.outbound_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
