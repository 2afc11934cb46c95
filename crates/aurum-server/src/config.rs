//! Application configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Upstream credentials and poll cadences. API keys left empty disable the
/// corresponding provider or scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub eodhd_api_key: String,
    #[serde(default)]
    pub twelve_data_api_key: String,
    #[serde(default)]
    pub metals_dev_api_key: String,
    #[serde(default = "default_twelve_data_interval_secs")]
    pub twelve_data_interval_secs: u64,
    #[serde(default = "default_naugold_interval_secs")]
    pub naugold_interval_secs: u64,
    #[serde(default = "default_watchdog_timeout_secs")]
    pub watchdog_timeout_secs: u64,
    #[serde(default = "default_reconnect_base_secs")]
    pub reconnect_base_delay_secs: u64,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_delay_secs: u64,
}

fn default_twelve_data_interval_secs() -> u64 {
    30
}

fn default_naugold_interval_secs() -> u64 {
    3
}

fn default_watchdog_timeout_secs() -> u64 {
    60
}

fn default_reconnect_base_secs() -> u64 {
    1
}

fn default_reconnect_max_secs() -> u64 {
    60
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            eodhd_api_key: String::new(),
            twelve_data_api_key: String::new(),
            metals_dev_api_key: String::new(),
            twelve_data_interval_secs: default_twelve_data_interval_secs(),
            naugold_interval_secs: default_naugold_interval_secs(),
            watchdog_timeout_secs: default_watchdog_timeout_secs(),
            reconnect_base_delay_secs: default_reconnect_base_secs(),
            reconnect_max_delay_secs: default_reconnect_max_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Relative change below which a window mean is suppressed.
    #[serde(default = "default_suppress_threshold")]
    pub suppress_threshold: f64,
    /// Force an emission for a flat price after this long.
    #[serde(default = "default_suppress_reset_secs")]
    pub suppress_reset_secs: u64,
}

fn default_window_secs() -> u64 {
    3
}

fn default_suppress_threshold() -> f64 {
    0.000001
}

fn default_suppress_reset_secs() -> u64 {
    60
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            suppress_threshold: default_suppress_threshold(),
            suppress_reset_secs: default_suppress_reset_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
}

fn default_queue_capacity() -> usize {
    100
}

fn default_heartbeat_secs() -> u64 {
    15
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            heartbeat_secs: default_heartbeat_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_max_records_per_asset")]
    pub max_records_per_asset: usize,
    /// Directory for the JSON Lines journal. Empty disables journaling.
    #[serde(default)]
    pub journal_dir: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

fn default_max_records_per_asset() -> usize {
    100_000
}

fn default_retention_days() -> u64 {
    7
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_records_per_asset: default_max_records_per_asset(),
            journal_dir: String::new(),
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl AppConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    /// API keys can always be supplied through the environment.
    pub fn load(path: &str) -> AppResult<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!(%path, "Config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Environment wins over file values for credentials.
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("EODHD_API_KEY") {
            self.providers.eodhd_api_key = key;
        }
        if let Ok(key) = std::env::var("TWELVE_DATA_API_KEY") {
            self.providers.twelve_data_api_key = key;
        }
        if let Ok(key) = std::env::var("METALS_DEV_API_KEY") {
            self.providers.metals_dev_api_key = key;
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.aggregation.window_secs)
    }
}
