//! Tracking configuration.
//!
//! Supplied at engine construction or through `configure` while stopped.
//! Loadable from JSON for hosts that keep it on disk.

use geotrail_env::DesiredAccuracy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration for the TrackingEngine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Provider hint, passed through untouched (default: Balanced)
    pub desired_accuracy: DesiredAccuracy,

    /// Minimum time between accepted samples; 0 disables the time gate (default: 30 s)
    pub min_interval_secs: f64,

    /// Minimum displacement from the last accepted sample; 0 disables the distance gate
    /// (default: 20 m)
    pub min_distance_m: f64,

    /// Readings with a larger accuracy radius are too imprecise (default: 100 m)
    pub max_accuracy_m: Option<f64>,

    /// Sampling loop cadence (default: 5 s)
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Deadline for a single poll (default: 5 s)
    #[serde(with = "duration_secs")]
    pub poll_timeout: Duration,

    /// Consecutive poll failures before the provider is declared down (default: 3)
    pub max_consecutive_failures: u32,

    /// Pause before the single store retry (default: 250 ms)
    #[serde(with = "duration_secs")]
    pub persist_retry_backoff: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            desired_accuracy: DesiredAccuracy::Balanced,
            min_interval_secs: 30.0,
            min_distance_m: 20.0,
            max_accuracy_m: Some(100.0),
            poll_interval: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(5),
            max_consecutive_failures: 3,
            persist_retry_backoff: Duration::from_millis(250),
        }
    }
}

impl TrackingConfig {
    /// Load configuration from a JSON file and validate it.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Checks every threshold for sign and finiteness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_interval_secs.is_finite() || self.min_interval_secs < 0.0 {
            return Err(ConfigError::invalid(
                "min_interval_secs",
                format!("must be a non-negative number, got {}", self.min_interval_secs),
            ));
        }
        if !self.min_distance_m.is_finite() || self.min_distance_m < 0.0 {
            return Err(ConfigError::invalid(
                "min_distance_m",
                format!("must be a non-negative number, got {}", self.min_distance_m),
            ));
        }
        if let Some(max) = self.max_accuracy_m {
            if !max.is_finite() || max <= 0.0 {
                return Err(ConfigError::invalid(
                    "max_accuracy_m",
                    format!("must be a positive number, got {}", max),
                ));
            }
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid("poll_interval", "must be non-zero"));
        }
        if self.poll_timeout.is_zero() {
            return Err(ConfigError::invalid("poll_timeout", "must be non-zero"));
        }
        if self.max_consecutive_failures == 0 {
            return Err(ConfigError::invalid(
                "max_consecutive_failures",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Returns a copy with the same loop cadence and poll deadline.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = interval;
        self
    }

    /// Returns a copy with both gating thresholds replaced.
    pub fn with_thresholds(mut self, min_distance_m: f64, min_interval_secs: f64) -> Self {
        self.min_distance_m = min_distance_m;
        self.min_interval_secs = min_interval_secs;
        self
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Configuration cannot change while a tracking session is active")]
    SessionActive,

    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs: f64 = Deserialize::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
