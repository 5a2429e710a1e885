//! Store wrapper that fails scheduled appends.

use async_trait::async_trait;
use geotrail_core::{NewSample, Sample, SampleStore, StoreError};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps any store and fails the append attempts listed in the schedule.
///
/// Attempts are counted from zero across every `append` call, including the
/// engine's retry, so `{3, 4}` loses one sample and `{3}` is absorbed.
pub struct FaultyStore<St> {
    inner: St,
    failing_attempts: BTreeSet<usize>,
    attempts: AtomicUsize,
    injected: AtomicUsize,
}

impl<St: SampleStore> FaultyStore<St> {
    pub fn new(inner: St, failing_attempts: impl IntoIterator<Item = usize>) -> Self {
        Self {
            inner,
            failing_attempts: failing_attempts.into_iter().collect(),
            attempts: AtomicUsize::new(0),
            injected: AtomicUsize::new(0),
        }
    }

    /// Number of failures injected so far.
    pub fn injected_failures(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<St: SampleStore> SampleStore for FaultyStore<St> {
    async fn append(&self, sample: NewSample) -> Result<Sample, StoreError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing_attempts.contains(&attempt) {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Storage(format!(
                "injected failure on append attempt {}",
                attempt
            )));
        }
        self.inner.append(sample).await
    }

    async fn query_all(&self) -> Result<Vec<Sample>, StoreError> {
        self.inner.query_all().await
    }

    async fn query_by_time_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Sample>, StoreError> {
        self.inner.query_by_time_range(start_ms, end_ms).await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.inner.clear_all().await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }
}
