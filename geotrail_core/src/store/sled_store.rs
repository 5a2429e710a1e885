//! Sled-backed persistent sample store.
//!
//! Keys are `(timestamp, id)` encoded big-endian so the tree iterates in
//! time order and range queries are plain key-range scans. Values are JSON.

use super::{SampleStore, StoreError};
use crate::sample::{NewSample, Sample, SampleId};
use async_trait::async_trait;
use std::path::Path;

const SAMPLE_TREE: &str = "samples";

/// Persistent sample log on an embedded key-value database.
pub struct SledSampleStore {
    db: sled::Db,
    samples: sled::Tree,
}

impl SledSampleStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Storage(format!("Failed to open sled DB: {}", e)))?;
        Self::from_db(db)
    }

    /// Create a temporary store that is removed on drop (tests, simulation)
    pub fn open_temp() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Storage(format!("Failed to open temp DB: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let samples = db
            .open_tree(SAMPLE_TREE)
            .map_err(|e| StoreError::Storage(format!("Failed to open sample tree: {}", e)))?;
        Ok(Self { db, samples })
    }

    /// Runs blocking sled I/O off the async worker threads.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(sled::Db, sled::Tree) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        let tree = self.samples.clone();
        tokio::task::spawn_blocking(move || op(db, tree))
            .await
            .map_err(|e| StoreError::Storage(format!("Storage task failed: {}", e)))?
    }
}

/// Order-preserving key: sign-flipped timestamp, then id.
fn sample_key(timestamp_ms: i64, id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&((timestamp_ms as u64) ^ (1 << 63)).to_be_bytes());
    key[8..].copy_from_slice(&id.to_be_bytes());
    key
}

fn decode(value: &[u8]) -> Result<Sample, StoreError> {
    serde_json::from_slice(value)
        .map_err(|e| StoreError::Serialization(format!("Corrupt sample record: {}", e)))
}

fn collect<I>(entries: I) -> Result<Vec<Sample>, StoreError>
where
    I: Iterator<Item = sled::Result<(sled::IVec, sled::IVec)>>,
{
    entries
        .map(|entry| {
            let (_, value) =
                entry.map_err(|e| StoreError::Storage(format!("Iteration failed: {}", e)))?;
            decode(&value)
        })
        .collect()
}

#[async_trait]
impl SampleStore for SledSampleStore {
    async fn append(&self, sample: NewSample) -> Result<Sample, StoreError> {
        self.blocking(move |db, tree| {
            let id = db
                .generate_id()
                .map_err(|e| StoreError::Storage(format!("Id generation failed: {}", e)))?;
            let stored = sample.into_sample(SampleId(id));
            let value = serde_json::to_vec(&stored)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            tree.insert(sample_key(stored.timestamp_ms, id), value)
                .map_err(|e| StoreError::Storage(format!("Insert failed: {}", e)))?;
            tree.flush()
                .map_err(|e| StoreError::Storage(format!("Flush failed: {}", e)))?;
            Ok(stored)
        })
        .await
    }

    async fn query_all(&self) -> Result<Vec<Sample>, StoreError> {
        self.blocking(|_, tree| collect(tree.iter())).await
    }

    async fn query_by_time_range(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Sample>, StoreError> {
        if start_ms > end_ms {
            return Ok(Vec::new());
        }
        self.blocking(move |_, tree| {
            let lo = sample_key(start_ms, 0);
            let hi = sample_key(end_ms, u64::MAX);
            collect(tree.range(lo..=hi))
        })
        .await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.blocking(|_, tree| {
            tree.clear()
                .map_err(|e| StoreError::Storage(format!("Clear failed: {}", e)))?;
            tree.flush()
                .map_err(|e| StoreError::Storage(format!("Flush failed: {}", e)))?;
            Ok(())
        })
        .await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.blocking(|_, tree| Ok(tree.len())).await
    }
}
