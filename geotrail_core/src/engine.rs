//! Tracking Engine - owns the session state machine and the sampling loop.
//!
//! Wires the Sample Filter, the store and the event bus to the environment
//! seams (`TrackerContext`, `PositionSource`).
//!
//! # State machine
//!
//! ```text
//!            start()                 granted
//!  Stopped ──────────► AwaitingPermission ──────────► Tracking
//!     ▲                      │ denied                    │ │
//!     │                      ▼                           │ │ N consecutive
//!     │◄──────────────── Faulted ◄───────────────────────┘ │ poll failures
//!     │                                                    │
//!     └────────────────────── stop() ──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use geotrail_core::{MemorySampleStore, TrackingConfig, TrackingEngine};
//! use geotrail_env::TokioContext;
//!
//! let engine = TrackingEngine::new(
//!     TokioContext::shared(),
//!     Arc::new(platform_source),
//!     Arc::new(MemorySampleStore::new()),
//!     TrackingConfig::default(),
//! )?;
//! let (_, mut events) = engine.subscribe_channel();
//! engine.start().await?;
//! ```

use crate::catalog::SampleCatalog;
use crate::config::{ConfigError, TrackingConfig};
use crate::error::{ErrorReason, Result, TrackingError};
use crate::events::{EventBus, EventSubscriber, SubscriptionId, TrackingEvent};
use crate::filter::{self, Decision};
use crate::sample::{NewSample, Sample};
use crate::store::{persist_with_retry, SampleStore};
use geotrail_env::{Permission, PositionSource, Reading, SessionId, SourceError, TrackerContext};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackingState {
    Stopped,
    AwaitingPermission,
    Tracking,
    /// Transient: always followed by `Stopped`
    Faulted,
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Polls that completed (success or failure) while the session was current
    pub polls: u64,
    pub failures: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub persist_failures: u64,
}

/// Ephemeral state of one `Tracking` interval. Never persisted.
#[derive(Debug, Clone)]
pub struct TrackingSession {
    pub id: SessionId,
    pub config: TrackingConfig,
    pub last_accepted: Option<Sample>,
    pub started_at: SystemTime,
    pub stats: SessionStats,
}

impl TrackingSession {
    fn new(id: SessionId, config: TrackingConfig, started_at: SystemTime) -> Self {
        Self {
            id,
            config,
            last_accepted: None,
            started_at,
            stats: SessionStats::default(),
        }
    }
}

struct EngineState {
    state: TrackingState,
    config: TrackingConfig,
    session: Option<TrackingSession>,
    cancel: Option<CancellationToken>,
    /// Stats of the most recently ended session
    last_stats: SessionStats,
    /// Bumped on every `start()`; lets a superseded permission request bail out
    start_attempt: u64,
}

struct EngineShared<Ctx, Src, St> {
    context: Arc<Ctx>,
    source: Arc<Src>,
    store: Arc<St>,
    bus: EventBus,
    inner: Mutex<EngineState>,
}

/// Continuous location tracking engine.
///
/// Cheap to clone; clones share one state machine. At most one sampling loop
/// runs per engine. The state lock is never held across an `.await` or while
/// events are delivered.
pub struct TrackingEngine<Ctx, Src, St>
where
    Ctx: TrackerContext,
    Src: PositionSource,
    St: SampleStore,
{
    shared: Arc<EngineShared<Ctx, Src, St>>,
}

impl<Ctx, Src, St> Clone for TrackingEngine<Ctx, Src, St>
where
    Ctx: TrackerContext,
    Src: PositionSource,
    St: SampleStore,
{
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Ctx, Src, St> TrackingEngine<Ctx, Src, St>
where
    Ctx: TrackerContext,
    Src: PositionSource,
    St: SampleStore,
{
    /// Creates a stopped engine. Fails if `config` does not validate.
    pub fn new(
        context: Arc<Ctx>,
        source: Arc<Src>,
        store: Arc<St>,
        config: TrackingConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            shared: Arc::new(EngineShared {
                context,
                source,
                store,
                bus: EventBus::new(),
                inner: Mutex::new(EngineState {
                    state: TrackingState::Stopped,
                    config,
                    session: None,
                    cancel: None,
                    last_stats: SessionStats::default(),
                    start_attempt: 0,
                }),
            }),
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Requests permission and starts the sampling loop.
    ///
    /// Returns the resulting state. A no-op unless the engine is `Stopped`.
    /// If `stop()` is called while permission is pending, resolves to
    /// `Ok(Stopped)` and no loop is started.
    pub async fn start(&self) -> Result<TrackingState> {
        let attempt = {
            let mut inner = self.shared.inner.lock();
            if inner.state != TrackingState::Stopped {
                debug!(state = ?inner.state, "start ignored");
                return Ok(inner.state);
            }
            inner.state = TrackingState::AwaitingPermission;
            inner.start_attempt += 1;
            inner.start_attempt
        };

        info!("requesting location permission");
        let denial = match self.shared.source.request_permission().await {
            Ok(Permission::Granted) => None,
            Ok(Permission::Denied) => Some("location permission denied".to_string()),
            Err(e) => Some(e.to_string()),
        };

        let mut inner = self.shared.inner.lock();
        if inner.state != TrackingState::AwaitingPermission || inner.start_attempt != attempt {
            debug!("stopped while awaiting permission");
            return Ok(TrackingState::Stopped);
        }

        if let Some(message) = denial {
            inner.state = TrackingState::Faulted;
            drop(inner);

            warn!(%message, "location permission refused");
            self.shared.bus.publish(TrackingEvent::ErrorOccurred {
                reason: ErrorReason::PermissionDenied,
                message: message.clone(),
            });
            self.settle_fault();
            return Err(TrackingError::PermissionDenied(message));
        }

        let session = TrackingSession::new(
            self.shared.context.new_session_id(),
            inner.config.clone(),
            self.shared.context.system_time(),
        );
        let session_id = session.id;
        let config = session.config.clone();
        let cancel = CancellationToken::new();

        inner.state = TrackingState::Tracking;
        inner.session = Some(session);
        inner.cancel = Some(cancel.clone());
        drop(inner);

        info!(session = %session_id, interval = ?config.poll_interval, "tracking started");
        self.shared
            .bus
            .publish(TrackingEvent::StatusChanged { is_tracking: true });

        let engine = self.clone();
        self.shared.context.spawn(
            "sampling-loop",
            engine.run_sampling_loop(session_id, config, cancel),
        );

        Ok(TrackingState::Tracking)
    }

    /// Halts tracking. Idempotent: a no-op with no event unless tracking.
    ///
    /// A poll in flight is abandoned and its result discarded.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        match inner.state {
            TrackingState::Tracking => {
                if let Some(cancel) = inner.cancel.take() {
                    cancel.cancel();
                }
                let ended = inner.session.take();
                if let Some(session) = &ended {
                    inner.last_stats = session.stats;
                }
                inner.state = TrackingState::Stopped;
                drop(inner);

                if let Some(session) = ended {
                    info!(session = %session.id, stats = ?session.stats, "tracking stopped");
                }
                self.shared
                    .bus
                    .publish(TrackingEvent::StatusChanged { is_tracking: false });
            }
            TrackingState::AwaitingPermission => {
                inner.state = TrackingState::Stopped;
                debug!("start abandoned while awaiting permission");
            }
            TrackingState::Stopped | TrackingState::Faulted => {}
        }
    }

    /// Replaces the configuration. Only allowed while `Stopped`.
    pub fn configure(&self, config: TrackingConfig) -> std::result::Result<(), ConfigError> {
        config.validate()?;

        let mut inner = self.shared.inner.lock();
        if inner.state != TrackingState::Stopped {
            return Err(ConfigError::SessionActive);
        }
        inner.config = config;
        debug!(config = ?inner.config, "configuration updated");
        Ok(())
    }

    // =========================================================================
    // Manual fetch
    // =========================================================================

    /// Fetches, persists and publishes one reading, bypassing the filter.
    ///
    /// Allowed in any state. Requests permission first when not tracking.
    /// Never reads or updates the session's last accepted sample. Failures
    /// are returned and also published as `ErrorOccurred`.
    pub async fn current_location_once(&self) -> Result<Sample> {
        let result = self.fetch_once().await;
        if let Err(e) = &result {
            warn!(error = %e, "manual location fetch failed");
            self.shared.bus.publish(TrackingEvent::ErrorOccurred {
                reason: e.reason(),
                message: e.to_string(),
            });
        }
        result
    }

    async fn fetch_once(&self) -> Result<Sample> {
        let config = self.config();

        if !self.is_tracking() {
            match self.shared.source.request_permission().await {
                Ok(Permission::Granted) => {}
                Ok(Permission::Denied) => {
                    return Err(TrackingError::PermissionDenied(
                        "location permission denied".to_string(),
                    ))
                }
                Err(e) => return Err(TrackingError::PermissionDenied(e.to_string())),
            }
        }

        let reading = self.poll_reading(&config).await?;
        let sample = NewSample::from_reading(&reading)?;
        let stored = persist_with_retry(
            &*self.shared.context,
            &*self.shared.store,
            sample,
            config.persist_retry_backoff,
        )
        .await?;

        debug!(id = %stored.id, "manual sample stored");
        self.shared
            .bus
            .publish(TrackingEvent::SampleAccepted(stored.clone()));
        Ok(stored)
    }

    // =========================================================================
    // Sampling loop
    // =========================================================================

    async fn run_sampling_loop(
        self,
        session_id: SessionId,
        config: TrackingConfig,
        cancel: CancellationToken,
    ) {
        // Single writer; the session keeps a copy for inspection
        let mut last_accepted: Option<Sample> = None;
        let mut consecutive_failures: u32 = 0;

        loop {
            // Cadence runs from poll start, not from the end of the previous tick
            let tick_started = self.shared.context.now();

            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                polled = self.poll_reading(&config) => polled,
            };

            // Stopped (or restarted) while the poll was in flight
            if self.with_session(session_id, |s| s.stats.polls += 1).is_none() {
                debug!(session = %session_id, "discarding reading from ended session");
                break;
            }

            match polled {
                Ok(reading) => {
                    consecutive_failures = 0;
                    self.handle_reading(session_id, &config, reading, &mut last_accepted)
                        .await;
                }
                Err(e) => {
                    consecutive_failures += 1;
                    self.with_session(session_id, |s| s.stats.failures += 1);

                    if consecutive_failures >= config.max_consecutive_failures {
                        self.fault(session_id, &e, consecutive_failures);
                        break;
                    }

                    warn!(
                        session = %session_id,
                        consecutive = consecutive_failures,
                        error = %e,
                        "location poll failed"
                    );
                    self.shared.bus.publish(TrackingEvent::ReadingFailed {
                        consecutive: consecutive_failures,
                        message: e.to_string(),
                    });
                }
            }

            let next_tick = tick_started + config.poll_interval;
            let wait = next_tick.saturating_sub(self.shared.context.now());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = self.shared.context.sleep(wait) => {}
            }
        }

        debug!(session = %session_id, "sampling loop exited");
    }

    /// One provider request, bounded by the poll timeout on the context clock.
    async fn poll_reading(
        &self,
        config: &TrackingConfig,
    ) -> std::result::Result<Reading, SourceError> {
        let request = self
            .shared
            .source
            .current_reading(config.desired_accuracy, config.poll_timeout);

        // Request first: a ready answer must not advance a virtual clock
        tokio::select! {
            biased;
            result = request => result,
            _ = self.shared.context.sleep(config.poll_timeout) => {
                Err(SourceError::TimedOut(config.poll_timeout))
            }
        }
    }

    async fn handle_reading(
        &self,
        session_id: SessionId,
        config: &TrackingConfig,
        reading: Reading,
        last_accepted: &mut Option<Sample>,
    ) {
        if let Decision::Reject(reason) = filter::decide(&reading, last_accepted.as_ref(), config) {
            self.with_session(session_id, |s| s.stats.rejected += 1);
            debug!(?reason, timestamp_ms = reading.timestamp_ms, "reading rejected");
            return;
        }

        let sample = match NewSample::from_reading(&reading) {
            Ok(sample) => sample,
            Err(e) => {
                self.with_session(session_id, |s| s.stats.rejected += 1);
                debug!(error = %e, "reading rejected");
                return;
            }
        };

        if self.with_session(session_id, |_| ()).is_none() {
            return;
        }

        match persist_with_retry(
            &*self.shared.context,
            &*self.shared.store,
            sample,
            config.persist_retry_backoff,
        )
        .await
        {
            Ok(stored) => {
                *last_accepted = Some(stored.clone());
                let current = self
                    .with_session(session_id, |s| {
                        s.last_accepted = Some(stored.clone());
                        s.stats.accepted += 1;
                    })
                    .is_some();

                if current {
                    debug!(id = %stored.id, timestamp_ms = stored.timestamp_ms, "sample accepted");
                    self.shared.bus.publish(TrackingEvent::SampleAccepted(stored));
                }
            }
            Err(e) => {
                let current = self
                    .with_session(session_id, |s| s.stats.persist_failures += 1)
                    .is_some();

                if current {
                    error!(session = %session_id, error = %e, "accepted sample lost");
                    self.shared.bus.publish(TrackingEvent::ErrorOccurred {
                        reason: ErrorReason::PersistenceFailure,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Ends the session after the provider failed too often.
    fn fault(&self, session_id: SessionId, last_error: &SourceError, failures: u32) {
        let mut inner = self.shared.inner.lock();
        if !matches!(&inner.session, Some(s) if s.id == session_id) {
            return;
        }
        inner.state = TrackingState::Faulted;
        if let Some(cancel) = inner.cancel.take() {
            cancel.cancel();
        }
        if let Some(session) = inner.session.take() {
            inner.last_stats = session.stats;
        }
        drop(inner);

        error!(
            session = %session_id,
            failures,
            error = %last_error,
            "location provider unavailable; stopping"
        );
        self.shared.bus.publish(TrackingEvent::ErrorOccurred {
            reason: ErrorReason::ProviderUnavailable,
            message: format!("{} consecutive failures, last: {}", failures, last_error),
        });

        // Published while still Faulted; start() stays a no-op until settled
        self.shared
            .bus
            .publish(TrackingEvent::StatusChanged { is_tracking: false });
        self.settle_fault();
    }

    fn settle_fault(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == TrackingState::Faulted {
            inner.state = TrackingState::Stopped;
        }
    }

    /// Runs `f` on the session if `session_id` is still the current one.
    fn with_session<R>(
        &self,
        session_id: SessionId,
        f: impl FnOnce(&mut TrackingSession) -> R,
    ) -> Option<R> {
        let mut inner = self.shared.inner.lock();
        match inner.session.as_mut() {
            Some(session) if session.id == session_id => Some(f(session)),
            _ => None,
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn state(&self) -> TrackingState {
        self.shared.inner.lock().state
    }

    pub fn is_tracking(&self) -> bool {
        self.state() == TrackingState::Tracking
    }

    pub fn config(&self) -> TrackingConfig {
        self.shared.inner.lock().config.clone()
    }

    /// Last sample accepted by the current session.
    pub fn last_accepted(&self) -> Option<Sample> {
        self.shared
            .inner
            .lock()
            .session
            .as_ref()
            .and_then(|s| s.last_accepted.clone())
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.shared.inner.lock().session.as_ref().map(|s| s.id)
    }

    /// Snapshot of the current session, if tracking.
    pub fn session(&self) -> Option<TrackingSession> {
        self.shared.inner.lock().session.clone()
    }

    /// Counters of the current session, or of the last one after it ended.
    pub fn session_stats(&self) -> SessionStats {
        let inner = self.shared.inner.lock();
        inner
            .session
            .as_ref()
            .map(|s| s.stats)
            .unwrap_or(inner.last_stats)
    }

    // =========================================================================
    // Events & consumers
    // =========================================================================

    pub fn events(&self) -> &EventBus {
        &self.shared.bus
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriptionId {
        self.shared.bus.subscribe(subscriber)
    }

    pub fn subscribe_fn<F>(&self, f: F) -> SubscriptionId
    where
        F: Fn(&TrackingEvent) + Send + Sync + 'static,
    {
        self.shared.bus.subscribe_fn(f)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<TrackingEvent>) {
        self.shared.bus.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    pub fn store(&self) -> &Arc<St> {
        &self.shared.store
    }

    /// Read-side view over the same store.
    pub fn catalog(&self) -> SampleCatalog<St> {
        SampleCatalog::new(Arc::clone(&self.shared.store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySampleStore;
    use async_trait::async_trait;
    use geotrail_env::{DesiredAccuracy, TokioContext};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Answers from a script; pends forever once it runs dry.
    struct FakeSource {
        permission: Permission,
        script: parking_lot::Mutex<VecDeque<std::result::Result<Reading, SourceError>>>,
    }

    impl FakeSource {
        fn new(
            permission: Permission,
            script: Vec<std::result::Result<Reading, SourceError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                permission,
                script: parking_lot::Mutex::new(script.into()),
            })
        }
    }

    #[async_trait]
    impl PositionSource for FakeSource {
        async fn request_permission(&self) -> std::result::Result<Permission, SourceError> {
            Ok(self.permission)
        }

        async fn current_reading(
            &self,
            _accuracy: DesiredAccuracy,
            _timeout: Duration,
        ) -> std::result::Result<Reading, SourceError> {
            let next = self.script.lock().pop_front();
            match next {
                Some(outcome) => outcome,
                None => std::future::pending().await,
            }
        }
    }

    type TestEngine = TrackingEngine<TokioContext, FakeSource, MemorySampleStore>;

    fn engine(source: Arc<FakeSource>) -> TestEngine {
        let config = TrackingConfig::default()
            .with_poll_interval(Duration::from_millis(10))
            .with_thresholds(0.0, 0.0);
        // Long deadline: a dry script hangs instead of counting as failures
        let config = TrackingConfig {
            poll_timeout: Duration::from_secs(30),
            persist_retry_backoff: Duration::from_millis(1),
            ..config
        };
        TrackingEngine::new(
            TokioContext::shared(),
            source,
            Arc::new(MemorySampleStore::new()),
            config,
        )
        .unwrap()
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TrackingEvent>) -> TrackingEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    fn reading(ts: i64) -> std::result::Result<Reading, SourceError> {
        Ok(Reading::new(54.32, 10.12, ts).with_accuracy(5.0))
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = TrackingConfig::default().with_thresholds(-5.0, 0.0);
        let result = TrackingEngine::new(
            TokioContext::shared(),
            FakeSource::new(Permission::Granted, vec![]),
            Arc::new(MemorySampleStore::new()),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_emits_status_then_first_sample() {
        let engine = engine(FakeSource::new(Permission::Granted, vec![reading(1_000)]));
        let (_, mut rx) = engine.subscribe_channel();

        assert_eq!(engine.start().await.unwrap(), TrackingState::Tracking);
        assert!(engine.is_tracking());

        assert_eq!(
            next_event(&mut rx).await,
            TrackingEvent::StatusChanged { is_tracking: true }
        );
        let TrackingEvent::SampleAccepted(sample) = next_event(&mut rx).await else {
            panic!("expected a sample");
        };
        assert_eq!(sample.timestamp_ms, 1_000);
        assert_eq!(engine.last_accepted(), Some(sample));

        engine.stop();
    }

    #[tokio::test]
    async fn test_start_while_tracking_is_noop() {
        let engine = engine(FakeSource::new(Permission::Granted, vec![]));
        let (_, mut rx) = engine.subscribe_channel();

        engine.start().await.unwrap();
        let first_session = engine.session_id();
        assert_eq!(engine.start().await.unwrap(), TrackingState::Tracking);
        assert_eq!(engine.session_id(), first_session);

        next_event(&mut rx).await;
        assert!(rx.try_recv().is_err());
        engine.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let engine = engine(FakeSource::new(Permission::Granted, vec![]));
        let (_, mut rx) = engine.subscribe_channel();

        engine.stop();
        assert!(rx.try_recv().is_err());

        engine.start().await.unwrap();
        engine.stop();
        engine.stop();

        assert_eq!(
            next_event(&mut rx).await,
            TrackingEvent::StatusChanged { is_tracking: true }
        );
        assert_eq!(
            next_event(&mut rx).await,
            TrackingEvent::StatusChanged { is_tracking: false }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.state(), TrackingState::Stopped);
    }

    #[tokio::test]
    async fn test_permission_denied() {
        let engine = engine(FakeSource::new(Permission::Denied, vec![reading(1)]));
        let (_, mut rx) = engine.subscribe_channel();

        let err = engine.start().await.unwrap_err();
        assert_eq!(err.reason(), ErrorReason::PermissionDenied);
        assert_eq!(engine.state(), TrackingState::Stopped);

        assert!(matches!(
            next_event(&mut rx).await,
            TrackingEvent::ErrorOccurred { reason: ErrorReason::PermissionDenied, .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_consecutive_failures_fault_the_session() {
        let failures = (0..3)
            .map(|_| Err(SourceError::unavailable("no fix")))
            .collect();
        let engine = engine(FakeSource::new(Permission::Granted, failures));
        let (_, mut rx) = engine.subscribe_channel();

        engine.start().await.unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            TrackingEvent::StatusChanged { is_tracking: true }
        );
        for n in 1..=2 {
            assert!(matches!(
                next_event(&mut rx).await,
                TrackingEvent::ReadingFailed { consecutive, .. } if consecutive == n
            ));
        }
        assert!(matches!(
            next_event(&mut rx).await,
            TrackingEvent::ErrorOccurred { reason: ErrorReason::ProviderUnavailable, .. }
        ));
        assert_eq!(
            next_event(&mut rx).await,
            TrackingEvent::StatusChanged { is_tracking: false }
        );
        assert_eq!(engine.state(), TrackingState::Stopped);
        assert_eq!(engine.session_stats().failures, 3);
    }

    #[tokio::test]
    async fn test_configure_only_while_stopped() {
        let engine = engine(FakeSource::new(Permission::Granted, vec![]));
        let updated = TrackingConfig::default().with_thresholds(50.0, 60.0);

        engine.start().await.unwrap();
        assert!(matches!(
            engine.configure(updated.clone()),
            Err(ConfigError::SessionActive)
        ));

        engine.stop();
        engine.configure(updated.clone()).unwrap();
        assert_eq!(engine.config(), updated);
    }

    #[tokio::test]
    async fn test_manual_fetch_bypasses_session_state() {
        let engine = engine(FakeSource::new(Permission::Granted, vec![reading(7_000)]));
        let (_, mut rx) = engine.subscribe_channel();

        let sample = engine.current_location_once().await.unwrap();

        assert_eq!(sample.timestamp_ms, 7_000);
        assert_eq!(engine.state(), TrackingState::Stopped);
        assert_eq!(engine.last_accepted(), None);
        assert_eq!(next_event(&mut rx).await, TrackingEvent::SampleAccepted(sample));
        assert_eq!(engine.store().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_manual_fetch_failure_is_returned_and_published() {
        let engine = engine(FakeSource::new(
            Permission::Granted,
            vec![Err(SourceError::unavailable("gps off"))],
        ));
        let (_, mut rx) = engine.subscribe_channel();

        let err = engine.current_location_once().await.unwrap_err();

        assert_eq!(err.reason(), ErrorReason::ProviderUnavailable);
        assert!(matches!(
            next_event(&mut rx).await,
            TrackingEvent::ErrorOccurred { reason: ErrorReason::ProviderUnavailable, .. }
        ));
    }
    /// Answers every poll after a fixed delay and records when each poll began.
    struct SlowSource {
        latency: Duration,
        poll_starts: parking_lot::Mutex<Vec<tokio::time::Instant>>,
    }

    #[async_trait]
    impl PositionSource for SlowSource {
        async fn request_permission(&self) -> std::result::Result<Permission, SourceError> {
            Ok(Permission::Granted)
        }

        async fn current_reading(
            &self,
            _accuracy: DesiredAccuracy,
            _timeout: Duration,
        ) -> std::result::Result<Reading, SourceError> {
            self.poll_starts.lock().push(tokio::time::Instant::now());
            tokio::time::sleep(self.latency).await;
            Ok(Reading::new(54.32, 10.12, 1_000))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_cadence_ignores_provider_latency() {
        let source = Arc::new(SlowSource {
            latency: Duration::from_millis(150),
            poll_starts: parking_lot::Mutex::new(Vec::new()),
        });
        let config = TrackingConfig {
            poll_interval: Duration::from_millis(200),
            poll_timeout: Duration::from_secs(1),
            ..TrackingConfig::default().with_thresholds(0.0, 0.0)
        };
        let engine = TrackingEngine::new(
            TokioContext::shared(),
            Arc::clone(&source),
            Arc::new(MemorySampleStore::new()),
            config,
        )
        .unwrap();

        engine.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        engine.stop();

        let starts = source.poll_starts.lock().clone();
        assert!(starts.len() >= 5, "only {} polls", starts.len());
        for pair in starts.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(
                gap >= Duration::from_millis(200) && gap < Duration::from_millis(210),
                "poll gap {:?}",
                gap
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_provider_times_out_on_context_clock() {
        let engine = TrackingEngine::new(
            TokioContext::shared(),
            FakeSource::new(Permission::Granted, vec![]),
            Arc::new(MemorySampleStore::new()),
            TrackingConfig {
                poll_interval: Duration::from_secs(5),
                poll_timeout: Duration::from_secs(1),
                ..TrackingConfig::default()
            },
        )
        .unwrap();
        let (_, mut rx) = engine.subscribe_channel();

        engine.start().await.unwrap();
        next_event(&mut rx).await;

        let TrackingEvent::ReadingFailed { consecutive, message } = next_event(&mut rx).await
        else {
            panic!("expected a reading failure");
        };
        assert_eq!(consecutive, 1);
        assert!(message.contains("timed out"));
        engine.stop();
    }

    #[tokio::test]
    async fn test_status_off_is_published_before_fault_settles() {
        let failures = (0..3)
            .map(|_| Err(SourceError::unavailable("no fix")))
            .collect();
        let engine = engine(FakeSource::new(Permission::Granted, failures));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let observer = engine.clone();
        let states = Arc::clone(&seen);
        engine.subscribe_fn(move |event| {
            if let TrackingEvent::StatusChanged { is_tracking: false } = event {
                states.lock().push(observer.state());
            }
        });
        let (_, mut rx) = engine.subscribe_channel();

        engine.start().await.unwrap();
        while !matches!(
            next_event(&mut rx).await,
            TrackingEvent::StatusChanged { is_tracking: false }
        ) {}

        assert_eq!(*seen.lock(), vec![TrackingState::Faulted]);
        assert_eq!(engine.state(), TrackingState::Stopped);
    }
}
