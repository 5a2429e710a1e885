//! Core environment context trait for GeoTrail engines.

use crate::SessionId;
use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, SystemTime};

/// The central interface for clock and scheduling access.
///
/// This trait abstracts the runtime so that the tracking engine can run
/// in both production (tokio) and simulation (virtual clock) environments.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time` and `tokio::spawn`
/// - **Simulation**: `SimContext` - virtual clock advanced by `sleep`
#[async_trait]
pub trait TrackerContext: Send + Sync + 'static {
    /// Returns the monotonic time since context creation.
    ///
    /// Used for session durations and timing diagnostics.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time.
    ///
    /// Used for session start stamps. In simulation this is derived from
    /// the virtual clock plus a fixed epoch.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Identity for a new tracking session.
    ///
    /// Random by default; simulation derives it from the seed so runs replay
    /// with the same ids.
    fn new_session_id(&self) -> SessionId {
        SessionId::new()
    }

    /// Spawns a background task.
    ///
    /// The sampling loop runs on a task spawned through this method so it
    /// never blocks the caller of `start()`.
    fn spawn<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
