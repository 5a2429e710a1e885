//! Scripted position source with fault injection.

use async_trait::async_trait;
use geotrail_env::{DesiredAccuracy, Permission, PositionSource, Reading, SourceError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// One scripted answer to `current_reading`.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Answer immediately with a reading
    Fix(Reading),
    /// Answer immediately with an error
    Fail(SourceError),
    /// Answer with a reading once `release()` is called
    Held(Reading),
}

/// Fake provider that replays a script of outcomes.
///
/// Once the script runs dry, every further poll signals exhaustion and never
/// resolves, so a runner knows the scenario has been fully consumed.
pub struct ScriptedPositionSource {
    permission: Mutex<Result<Permission, SourceError>>,
    script: Mutex<VecDeque<ScriptStep>>,
    polls: AtomicU64,
    permission_requests: AtomicU64,
    exhausted: Notify,
    held: Notify,
    release: Notify,
}

impl ScriptedPositionSource {
    pub fn new(permission: Permission, script: Vec<ScriptStep>) -> Self {
        Self {
            permission: Mutex::new(Ok(permission)),
            script: Mutex::new(script.into()),
            polls: AtomicU64::new(0),
            permission_requests: AtomicU64::new(0),
            exhausted: Notify::new(),
            held: Notify::new(),
            release: Notify::new(),
        }
    }

    pub fn shared(permission: Permission, script: Vec<ScriptStep>) -> Arc<Self> {
        Arc::new(Self::new(permission, script))
    }

    /// Changes the answer to future permission requests.
    pub fn set_permission(&self, answer: Result<Permission, SourceError>) {
        *self.permission.lock() = answer;
    }

    /// Appends steps to the end of the script.
    pub fn extend(&self, steps: impl IntoIterator<Item = ScriptStep>) {
        self.script.lock().extend(steps);
    }

    /// Number of `current_reading` calls so far.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn permission_requests(&self) -> u64 {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    /// Resolves once a poll found the script empty.
    pub async fn wait_exhausted(&self) {
        self.exhausted.notified().await;
    }

    /// Resolves once a poll is parked on a `Held` step.
    pub async fn wait_held(&self) {
        self.held.notified().await;
    }

    /// Lets the parked `Held` poll answer.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[async_trait]
impl PositionSource for ScriptedPositionSource {
    async fn request_permission(&self) -> Result<Permission, SourceError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission.lock().clone()
    }

    async fn current_reading(
        &self,
        _accuracy: DesiredAccuracy,
        _timeout: Duration,
    ) -> Result<Reading, SourceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().pop_front();

        match step {
            Some(ScriptStep::Fix(reading)) => Ok(reading),
            Some(ScriptStep::Fail(error)) => Err(error),
            Some(ScriptStep::Held(reading)) => {
                self.held.notify_one();
                self.release.notified().await;
                Ok(reading)
            }
            None => {
                self.exhausted.notify_one();
                std::future::pending().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(ts: i64) -> ScriptStep {
        ScriptStep::Fix(Reading::new(1.0, 2.0, ts))
    }

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let source = ScriptedPositionSource::new(
            Permission::Granted,
            vec![fix(1), ScriptStep::Fail(SourceError::unavailable("off")), fix(2)],
        );
        let poll = || source.current_reading(DesiredAccuracy::High, Duration::from_secs(1));

        assert_eq!(poll().await.unwrap().timestamp_ms, 1);
        assert!(poll().await.is_err());
        assert_eq!(poll().await.unwrap().timestamp_ms, 2);
        assert_eq!(source.polls(), 3);
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn test_exhaustion_is_signalled() {
        let source = Arc::new(ScriptedPositionSource::new(Permission::Granted, vec![]));
        let poller = Arc::clone(&source);
        let task = tokio::spawn(async move {
            let _ = poller
                .current_reading(DesiredAccuracy::Balanced, Duration::from_secs(1))
                .await;
        });

        tokio::time::timeout(Duration::from_secs(2), source.wait_exhausted())
            .await
            .unwrap();
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_permission_answer_can_change() {
        let source = ScriptedPositionSource::new(Permission::Denied, vec![]);
        assert_eq!(source.request_permission().await.unwrap(), Permission::Denied);

        source.set_permission(Ok(Permission::Granted));
        assert!(source.request_permission().await.unwrap().is_granted());
        assert_eq!(source.permission_requests(), 2);
    }
}
