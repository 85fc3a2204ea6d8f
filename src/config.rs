//! Client configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via CLI_CONFIG or --config)
//! 3. Environment variables
//! 4. Command-line flags

use batchwire_client::{ConnectionMode, RunnerConfig, DEFAULT_BATCH_SIZE};
use batchwire_protocol::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub batch: BatchConfig,
    pub timeouts: TimeoutConfig,
    pub connection: ConnectionConfig,
    pub source: SourceConfig,
    pub log: LogConfig,
}

impl Config {
    /// Loads configuration from `path` (or CLI_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("CLI_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides looked up by variable name. Unparseable values are
    /// ignored.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(id) = var("CLI_ID") {
            self.client.id = id;
        }
        if let Some(addr) = var("CLI_SERVER_ADDRESS") {
            self.client.server_address = addr;
        }
        if let Some(amount) = var("CLI_BATCH_MAXAMOUNT") {
            if let Ok(parsed) = amount.parse() {
                self.batch.max_amount = parsed;
            }
        }
        if let Some(period) = var("CLI_BATCH_PERIOD_MS") {
            if let Ok(parsed) = period.parse() {
                self.batch.period_ms = parsed;
            }
        }
        if let Some(secs) = var("CLI_ACK_TIMEOUT_SECS") {
            if let Ok(parsed) = secs.parse() {
                self.timeouts.ack_secs = parsed;
            }
        }
        if let Some(mode) = var("CLI_CONNECTION_MODE") {
            if let Ok(parsed) = mode.parse() {
                self.connection.mode = parsed;
            }
        }
        if let Some(path) = var("CLI_SOURCE_PATH") {
            self.source.path = Some(PathBuf::from(path));
        }
        if let Some(level) = var("CLI_LOG_LEVEL") {
            self.log.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.server_address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "client.server_address must not be empty".to_string(),
            ));
        }
        if self.batch.max_amount == 0 {
            return Err(ConfigError::ValidationError(
                "batch.max_amount must be at least 1".to_string(),
            ));
        }
        if self.source.path.is_none() {
            return Err(ConfigError::ValidationError(
                "source.path is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the runner settings.
    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig::new(self.client.id.clone())
            .with_batch_size(self.batch.max_amount)
            .with_connect_timeout(self.timeouts.connect_timeout())
            .with_ack_timeout(self.timeouts.ack_timeout())
            .with_batch_period(self.batch.period())
            .with_mode(self.connection.mode)
    }
}

/// Client identity and target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub id: String,
    /// `host:port` of the server.
    pub server_address: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            id: "1".to_string(),
            server_address: format!("server:{}", DEFAULT_PORT),
        }
    }
}

/// Batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum records per batch.
    pub max_amount: usize,
    /// Pause between batches in milliseconds (0 = none).
    pub period_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_amount: DEFAULT_BATCH_SIZE,
            period_ms: 0,
        }
    }
}

impl BatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    /// Bound on each acknowledgment wait.
    pub ack_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            ack_secs: 10,
        }
    }
}

impl TimeoutConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub mode: ConnectionMode,
}

/// Record file configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub path: Option<PathBuf>,
    /// Prepend the client id as the first field of every record.
    pub prefix_client_id: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: None,
            prefix_client_id: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when RUST_LOG is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
