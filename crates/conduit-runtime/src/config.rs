//! # Runtime Configuration
//!
//! Loaded from an optional TOML file, then overridden from the environment.
//!
//! ```toml
//! manifests = ["components/accounts.toml"]
//!
//! [bus]
//! queue_capacity = 100
//! stop_timeout_secs = 5
//!
//! [telemetry]
//! log_level = "info"
//! json_logs = false
//! ```
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `CONDUIT_QUEUE_CAPACITY` | `bus.queue_capacity` |
//! | `CONDUIT_STOP_TIMEOUT_SECS` | `bus.stop_timeout_secs` |
//! | `CONDUIT_MANIFESTS` | `manifests` (comma separated) |
//! | `CONDUIT_LOG_LEVEL` | `telemetry.log_level` |
//! | `CONDUIT_JSON_LOGS` | `telemetry.json_logs` |

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use conduit_bus::{BusConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_STOP_TIMEOUT};
use conduit_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Message bus parameters.
    pub bus: BusSettings,
    /// Component manifests registered at startup, in order.
    pub manifests: Vec<PathBuf>,
    /// Logging parameters.
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    /// Envelopes buffered before publishers suspend.
    pub queue_capacity: usize,
    /// Shutdown deadline for draining in-flight handlers.
    pub stop_timeout_secs: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json_logs: bool,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string. Missing keys keep defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// File (if any), then process environment, then validation.
    pub fn from_sources(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                Self::load(path)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `CONDUIT_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CONDUIT_QUEUE_CAPACITY") {
            match value.parse() {
                Ok(capacity) => self.bus.queue_capacity = capacity,
                Err(_) => warn!(value = %value, "CONDUIT_QUEUE_CAPACITY must be an integer"),
            }
        }
        if let Some(value) = lookup("CONDUIT_STOP_TIMEOUT_SECS") {
            match value.parse() {
                Ok(secs) => self.bus.stop_timeout_secs = secs,
                Err(_) => warn!(value = %value, "CONDUIT_STOP_TIMEOUT_SECS must be an integer"),
            }
        }
        if let Some(value) = lookup("CONDUIT_MANIFESTS") {
            self.manifests = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }
        if let Some(value) = lookup("CONDUIT_LOG_LEVEL") {
            self.telemetry.log_level = value;
        }
        if let Some(value) = lookup("CONDUIT_JSON_LOGS") {
            self.telemetry.json_logs = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.queue_capacity == 0 {
            return Err(ConfigError::Invalid("bus.queue_capacity must be at least 1".to_string()));
        }
        if self.telemetry.log_level.trim().is_empty() {
            return Err(ConfigError::Invalid("telemetry.log_level must not be empty".to_string()));
        }
        Ok(())
    }

    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.bus.stop_timeout_secs)
    }

    #[must_use]
    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            queue_capacity: self.bus.queue_capacity,
            stop_timeout: self.stop_timeout(),
        }
    }

    /// Telemetry config from the environment, with this file's settings on top.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig::from_env()
            .with_log_level(self.telemetry.log_level.clone())
            .with_json_logs(self.telemetry.json_logs)
    }
}
