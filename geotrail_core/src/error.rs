//! Error types for the tracking engine.
//!
//! Loop failures are converted to events and never surface as `Err`.
//! Caller-invoked operations return these errors and also publish an
//! `ErrorOccurred` event carrying the matching [`ErrorReason`].

use crate::config::ConfigError;
use crate::sample::CoordinateError;
use crate::store::StoreError;
use geotrail_env::SourceError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category carried by `ErrorOccurred` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    /// User or OS refused location access; needs an explicit restart
    PermissionDenied,
    /// Provider failure (transient or persistent)
    ProviderUnavailable,
    /// Store write failed; the sample is lost
    PersistenceFailure,
    /// Invalid configuration or a change attempted mid-session
    ConfigurationError,
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorReason::PermissionDenied => "permission_denied",
            ErrorReason::ProviderUnavailable => "provider_unavailable",
            ErrorReason::PersistenceFailure => "persistence_failure",
            ErrorReason::ConfigurationError => "configuration_error",
        };
        f.write_str(name)
    }
}

/// Top-level error type for engine operations.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Provider error: {0}")]
    ProviderUnavailable(#[from] SourceError),

    #[error("Invalid reading: {0}")]
    InvalidReading(#[from] CoordinateError),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl TrackingError {
    /// Maps the error onto the event taxonomy.
    pub fn reason(&self) -> ErrorReason {
        match self {
            TrackingError::PermissionDenied(_) => ErrorReason::PermissionDenied,
            TrackingError::ProviderUnavailable(_) | TrackingError::InvalidReading(_) => {
                ErrorReason::ProviderUnavailable
            }
            TrackingError::Persistence(_) => ErrorReason::PersistenceFailure,
            TrackingError::Configuration(_) => ErrorReason::ConfigurationError,
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, TrackingError>;
