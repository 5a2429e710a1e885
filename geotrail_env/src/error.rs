//! Error types for the GeoTrail environment abstraction.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by a [`PositionSource`](crate::PositionSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// No fix arrived before the poll deadline
    #[error("Position request timed out after {0:?}")]
    TimedOut(Duration),

    /// Hardware or OS location service is not available
    #[error("Position provider unavailable: {0}")]
    Unavailable(String),

    /// The consent prompt itself failed (as opposed to being declined)
    #[error("Permission request failed: {0}")]
    PermissionRequest(String),
}

impl SourceError {
    /// Creates an unavailable error.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
