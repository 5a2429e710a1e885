//! GeoTrail Core - continuous location tracking on top of an abstract provider.
//!
//! The engine polls a position source on a fixed cadence, keeps the readings
//! that moved far enough or waited long enough, persists them and tells
//! observers about it:
//! 1. **Sample Filter** ([`filter`]): pure accept/reject decision (distance OR interval)
//! 2. **Tracking Engine** ([`engine`]): permission handshake, sampling loop, fault policy
//! 3. **Event Bus** ([`events`]): in-process pub/sub with snapshot delivery
//! 4. **Persistent Store** ([`store`]): sled and in-memory sample logs
//! 5. **Extent Aggregator** ([`extent`]): view fitting and H3 cell counts

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod extent;
pub mod filter;
pub mod sample;
pub mod store;

// Re-export key types for convenience
pub use catalog::SampleCatalog;
pub use config::{ConfigError, TrackingConfig};
pub use engine::{SessionStats, TrackingEngine, TrackingSession, TrackingState};
pub use error::{ErrorReason, TrackingError};
pub use events::{EventBus, EventSubscriber, SubscriptionId, TrackingEvent};
pub use extent::{
    aggregate_cells, compute_extent, compute_extent_with_floor, CellBucket, Coordinate, Extent,
    Span,
};
pub use filter::{decide, Decision, RejectReason};
pub use sample::{CoordinateError, NewSample, Sample, SampleId};
pub use store::{MemorySampleStore, SampleStore, SledSampleStore, StoreError};
