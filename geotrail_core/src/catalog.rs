//! Read side for renderers, plus the management-only bulk clear.

use crate::extent::{
    aggregate_cells, compute_extent_with_floor, CellBucket, Extent, DEFAULT_SPAN_FLOOR_DEG,
};
use crate::sample::Sample;
use crate::store::{SampleStore, StoreError};
use h3o::Resolution;
use std::sync::Arc;
use tracing::info;

/// Loads persisted samples and fits views to them.
pub struct SampleCatalog<St: SampleStore> {
    store: Arc<St>,
    span_floor_deg: f64,
}

impl<St: SampleStore> Clone for SampleCatalog<St> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            span_floor_deg: self.span_floor_deg,
        }
    }
}

impl<St: SampleStore> SampleCatalog<St> {
    pub fn new(store: Arc<St>) -> Self {
        Self {
            store,
            span_floor_deg: DEFAULT_SPAN_FLOOR_DEG,
        }
    }

    /// Overrides the minimum view span used by the extent helpers.
    pub fn with_span_floor(mut self, floor_deg: f64) -> Self {
        self.span_floor_deg = floor_deg;
        self
    }

    pub async fn load_all(&self) -> Result<Vec<Sample>, StoreError> {
        self.store.query_all().await
    }

    /// Samples with `start_ms <= timestamp <= end_ms`.
    pub async fn load_by_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Sample>, StoreError> {
        self.store.query_by_time_range(start_ms, end_ms).await
    }

    pub async fn extent_all(&self) -> Result<Option<Extent>, StoreError> {
        let samples = self.load_all().await?;
        Ok(compute_extent_with_floor(&samples, self.span_floor_deg))
    }

    pub async fn extent_by_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Option<Extent>, StoreError> {
        let samples = self.load_by_range(start_ms, end_ms).await?;
        Ok(compute_extent_with_floor(&samples, self.span_floor_deg))
    }

    /// Per-cell sample counts over the whole log.
    pub async fn cells_all(&self, resolution: Resolution) -> Result<Vec<CellBucket>, StoreError> {
        let samples = self.load_all().await?;
        Ok(aggregate_cells(&samples, resolution))
    }

    /// Deletes every stored sample. Irreversible; never called by the engine.
    pub async fn clear_all(&self) -> Result<(), StoreError> {
        let removed = self.store.count().await?;
        self.store.clear_all().await?;
        info!(removed, "sample log cleared");
        Ok(())
    }
}
