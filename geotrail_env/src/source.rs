//! Position source abstraction for the tracking engine.

use crate::error::SourceError;
use crate::types::{DesiredAccuracy, Permission, Reading};
use async_trait::async_trait;
use std::time::Duration;

/// Capability interface over the device's location provider.
///
/// # Implementations
///
/// - **Production**: wraps the platform location API
/// - **Simulation**: `ScriptedPositionSource` replaying a fixed script
///
/// # Poll Flow
///
/// ```text
/// Engine                        PositionSource                Provider
///   |                                 |                           |
///   |-- request_permission() -------->|-- consent prompt -------->|
///   |<------------ Granted/Denied ----|                           |
///   |                                 |                           |
///   |-- current_reading(acc, t) ----->|-- single fix request ---->|
///   |<---------- Reading / error -----|<------- fix or timeout ---|
/// ```
#[async_trait]
pub trait PositionSource: Send + Sync + 'static {
    /// Asks the user/OS for location access.
    ///
    /// # Returns
    /// * `Ok(Permission::Granted)` - tracking may proceed
    /// * `Ok(Permission::Denied)` - the user declined
    /// * `Err(SourceError::PermissionRequest)` - the prompt could not be shown
    async fn request_permission(&self) -> Result<Permission, SourceError>;

    /// Requests a single reading.
    ///
    /// # Arguments
    /// * `accuracy` - Battery/latency hint passed through to the provider
    /// * `timeout` - Deadline the provider should honour
    ///
    /// # Returns
    /// * `Ok(reading)` - A raw, unfiltered observation
    /// * `Err(SourceError::TimedOut)` - No fix before the deadline
    /// * `Err(SourceError::Unavailable)` - Provider failure
    async fn current_reading(
        &self,
        accuracy: DesiredAccuracy,
        timeout: Duration,
    ) -> Result<Reading, SourceError>;
}
