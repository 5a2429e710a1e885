//! Persistent Store contract for accepted samples.
//!
//! The engine only appends. Bulk reads serve the rendering side; `clear_all`
//! belongs to the management layer and is never called by the engine.

mod memory;
mod sled_store;

pub use memory::MemorySampleStore;
pub use sled_store::SledSampleStore;

use crate::sample::{NewSample, Sample};
use async_trait::async_trait;
use geotrail_env::TrackerContext;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Storage errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Durable sample log.
///
/// Implementations must be safe under concurrent callers: the sampling loop
/// and a manual fetch may append at the same time.
#[async_trait]
pub trait SampleStore: Send + Sync + 'static {
    /// Assigns an id and persists the sample. Durable once this returns `Ok`.
    async fn append(&self, sample: NewSample) -> Result<Sample, StoreError>;

    /// All samples, ascending by timestamp (ties by id).
    async fn query_all(&self) -> Result<Vec<Sample>, StoreError>;

    /// Samples with `start_ms <= timestamp_ms <= end_ms`, ascending.
    async fn query_by_time_range(&self, start_ms: i64, end_ms: i64)
        -> Result<Vec<Sample>, StoreError>;

    /// Deletes every sample. Irreversible.
    async fn clear_all(&self) -> Result<(), StoreError>;

    /// Number of stored samples.
    async fn count(&self) -> Result<usize, StoreError>;
}

/// Appends with a single retry after `backoff`, then gives up.
pub async fn persist_with_retry<Ctx, St>(
    context: &Ctx,
    store: &St,
    sample: NewSample,
    backoff: Duration,
) -> Result<Sample, StoreError>
where
    Ctx: TrackerContext,
    St: SampleStore + ?Sized,
{
    match store.append(sample.clone()).await {
        Ok(stored) => Ok(stored),
        Err(first) => {
            warn!(error = %first, ?backoff, "sample append failed; retrying once");
            context.sleep(backoff).await;
            store.append(sample).await
        }
    }
}
