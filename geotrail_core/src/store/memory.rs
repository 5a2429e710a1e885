//! In-memory sample store.

use super::{SampleStore, StoreError};
use crate::sample::{NewSample, Sample, SampleId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Volatile store for hosts without durable storage, simulation and tests.
///
/// Supports injecting append failures to exercise the persistence error path.
pub struct MemorySampleStore {
    inner: Mutex<MemoryInner>,
    failing_appends: AtomicU32,
}

struct MemoryInner {
    samples: Vec<Sample>,
    next_id: u64,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                samples: Vec::new(),
                next_id: 1,
            }),
            failing_appends: AtomicU32::new(0),
        }
    }

    /// Makes the next `n` appends fail with a storage error.
    pub fn fail_next_appends(&self, n: u32) {
        self.failing_appends.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn sorted(mut samples: Vec<Sample>) -> Vec<Sample> {
        samples.sort_by_key(|s| (s.timestamp_ms, s.id));
        samples
    }
}

impl Default for MemorySampleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleStore for MemorySampleStore {
    async fn append(&self, sample: NewSample) -> Result<Sample, StoreError> {
        if self.take_injected_failure() {
            return Err(StoreError::Storage("injected append failure".to_string()));
        }

        let mut inner = self.inner.lock();
        let id = SampleId(inner.next_id);
        inner.next_id += 1;
        let stored = sample.into_sample(id);
        inner.samples.push(stored.clone());
        Ok(stored)
    }

    async fn query_all(&self) -> Result<Vec<Sample>, StoreError> {
        let samples = self.inner.lock().samples.clone();
        Ok(Self::sorted(samples))
    }

    async fn query_by_time_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Sample>, StoreError> {
        let samples: Vec<Sample> = self
            .inner
            .lock()
            .samples
            .iter()
            .filter(|s| s.timestamp_ms >= start_ms && s.timestamp_ms <= end_ms)
            .cloned()
            .collect();
        Ok(Self::sorted(samples))
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.inner.lock().samples.clear();
        Ok(())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.lock().samples.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geotrail_env::Reading;

    fn new_sample(ts: i64) -> NewSample {
        NewSample::from_reading(&Reading::new(1.0, 2.0, ts)).unwrap()
    }

    #[tokio::test]
    async fn test_ids_increase_and_query_sorted_by_time() {
        let store = MemorySampleStore::new();
        let a = store.append(new_sample(300)).await.unwrap();
        let b = store.append(new_sample(100)).await.unwrap();
        let c = store.append(new_sample(200)).await.unwrap();

        assert!(a.id < b.id && b.id < c.id);

        let all = store.query_all().await.unwrap();
        let times: Vec<i64> = all.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[tokio::test]
    async fn test_range_is_inclusive() {
        let store = MemorySampleStore::new();
        for ts in [100, 200, 300, 400] {
            store.append(new_sample(ts)).await.unwrap();
        }

        let hits = store.query_by_time_range(200, 300).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(store.query_by_time_range(300, 200).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemorySampleStore::new();
        store.fail_next_appends(1);

        assert!(store.append(new_sample(1)).await.is_err());
        assert!(store.append(new_sample(2)).await.is_ok());
        assert_eq!(store.count().await.unwrap(), 1);

        store.clear_all().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
