//! Configuration loading and typed config structures for Citywatch.
//!
//! The canonical configuration lives in `citywatch-config.yaml`. This module
//! defines strongly-typed structs that mirror the YAML structure and a
//! loader that reads and validates the file. Every section is optional and
//! falls back to the defaults below.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but is outside its allowed range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level Citywatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CitywatchConfig {
    /// Snapshot store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Event loop settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Alert derivation thresholds.
    #[serde(default)]
    pub alerts: AlertConfig,

    /// External prediction source.
    #[serde(default)]
    pub predictions: PredictionConfig,

    /// Observer HTTP server.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CitywatchConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `CITYWATCH_PREDICTION_URL` overrides `predictions.source_url`
    /// - `CITYWATCH_OBSERVER_PORT` overrides `observer.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Override values with environment variables when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CITYWATCH_PREDICTION_URL") {
            self.predictions.source_url = val;
        }
        if let Ok(val) = std::env::var("CITYWATCH_OBSERVER_PORT") {
            match val.parse::<u16>() {
                Ok(port) => self.observer.port = port,
                Err(e) => tracing::warn!(value = %val, error = %e, "ignoring CITYWATCH_OBSERVER_PORT"),
            }
        }
    }

    /// Check cross-field ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.traffic_window == 0 {
            return Err(ConfigError::Invalid {
                field: "store.traffic_window",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.engine.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.queue_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.alerts.traffic_congestion_threshold > 10 {
            return Err(ConfigError::Invalid {
                field: "alerts.traffic_congestion_threshold",
                reason: format!(
                    "{} is outside the congestion scale 0-10",
                    self.alerts.traffic_congestion_threshold
                ),
            });
        }
        if self.predictions.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "predictions.timeout_ms",
                reason: "refresh needs an upper bound above zero".to_owned(),
            });
        }
        Ok(())
    }
}

/// Snapshot store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of traffic samples retained (most recent kept).
    #[serde(default = "default_traffic_window")]
    pub traffic_window: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            traffic_window: default_traffic_window(),
        }
    }
}

/// Event loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the inbound update queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// Alert derivation thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertConfig {
    /// Traffic samples at or above this congestion level raise an alert.
    #[serde(default = "default_traffic_congestion_threshold")]
    pub traffic_congestion_threshold: u8,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            traffic_congestion_threshold: default_traffic_congestion_threshold(),
        }
    }
}

/// External prediction source configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PredictionConfig {
    /// Base URL of the analysis service.
    #[serde(default = "default_prediction_url")]
    pub source_url: String,

    /// Upper bound on one refresh, in milliseconds.
    #[serde(default = "default_prediction_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            source_url: default_prediction_url(),
            timeout_ms: default_prediction_timeout_ms(),
        }
    }
}

/// Observer HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Bind address.
    #[serde(default = "default_observer_host")]
    pub host: String,

    /// TCP port.
    #[serde(default = "default_observer_port")]
    pub port: u16,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            host: default_observer_host(),
            port: default_observer_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

// ---------------------------------------------------------------------------
// Default value functions
// ---------------------------------------------------------------------------

const fn default_traffic_window() -> usize {
    24
}

const fn default_queue_capacity() -> usize {
    1024
}

const fn default_traffic_congestion_threshold() -> u8 {
    8
}

fn default_prediction_url() -> String {
    String::from("http://localhost:5000")
}

const fn default_prediction_timeout_ms() -> u64 {
    3000
}

fn default_observer_host() -> String {
    String::from("0.0.0.0")
}

const fn default_observer_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    String::from("info")
}
