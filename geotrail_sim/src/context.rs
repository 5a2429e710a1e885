//! Simulation context implementing TrackerContext for deterministic testing.

use async_trait::async_trait;
use geotrail_env::{SessionId, TrackerContext};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::Instrument;

/// Simulation context backed by a virtual clock.
///
/// - `sleep` advances virtual time instead of waiting, then yields once so
///   other tasks on the runtime get a turn
/// - `system_time` is a fixed epoch plus virtual time
/// - session ids are derived from the seed and a session counter
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<AtomicU64>,

    /// Epoch offset (virtual time 0 maps to this wall-clock time)
    epoch: SystemTime,

    /// Sessions handed out so far
    sessions: Arc<AtomicU64>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(AtomicU64::new(0)),
            epoch: UNIX_EPOCH + Duration::from_secs(1704067200), // 2024-01-01 00:00:00 UTC
            sessions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        self.virtual_time_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        self.virtual_time_ns.load(Ordering::SeqCst)
    }

    /// Unix milliseconds of virtual time zero.
    pub fn epoch_ms(&self) -> i64 {
        self.epoch
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            epoch: self.epoch,
            sessions: Arc::clone(&self.sessions),
        }
    }
}

#[async_trait]
impl TrackerContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    fn system_time(&self) -> SystemTime {
        self.epoch + self.now()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }

    fn new_session_id(&self) -> SessionId {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst);
        SessionId::from_seed(self.seed ^ n.wrapping_mul(0x9e3779b97f4a7c15))
    }

    fn spawn<F>(&self, name: &str, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("sim_task", name = %name, seed = self.seed);
        tokio::spawn(future.instrument(span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_sleep_advances_virtual_time_only() {
        let ctx = SimContext::new(1);
        let wall = std::time::Instant::now();

        ctx.sleep(Duration::from_secs(3600)).await;

        assert_eq!(ctx.now(), Duration::from_secs(3600));
        assert!(wall.elapsed() < Duration::from_secs(5));
        assert_eq!(
            ctx.system_time().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64,
            ctx.epoch_ms() + 3_600_000
        );
    }

    #[test]
    fn test_clones_share_the_clock() {
        let ctx = SimContext::new(7);
        let other = ctx.clone();
        other.advance_time(Duration::from_secs(2));
        assert_eq!(ctx.now(), Duration::from_secs(2));
        assert_eq!(ctx.seed(), 7);
    }

    #[test]
    fn test_session_ids_replay_per_seed() {
        let a = SimContext::new(42);
        let b = SimContext::new(42);

        let first = a.new_session_id();
        assert_eq!(first, b.new_session_id());
        assert_ne!(first, a.new_session_id());
        assert_ne!(first, SimContext::new(43).new_session_id());
    }
}
