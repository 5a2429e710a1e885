//! GeoTrail Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the GeoTrail tracking
//! engine run against a real device in **Production** (tokio + a platform
//! location provider) and against scripted fakes in **Simulation**.
//!
//! # What gets intercepted
//!
//! - Time (`now()`, `system_time()`, `sleep()`)
//! - Task spawning (`spawn()`)
//! - Session identity (`new_session_id()`)
//! - Location access (`request_permission()`, `current_reading()`)
//!
//! # Example
//!
//! ```ignore
//! use geotrail_env::{DesiredAccuracy, PositionSource, TrackerContext};
//!
//! async fn poll_once<Ctx: TrackerContext, Src: PositionSource>(ctx: &Ctx, src: &Src) {
//!     let reading = src
//!         .current_reading(DesiredAccuracy::Balanced, Duration::from_secs(5))
//!         .await;
//!     ctx.sleep(Duration::from_secs(5)).await;
//! }
//! ```

mod context;
mod error;
mod source;
mod tokio_impl;
mod types;

pub use context::TrackerContext;
pub use error::SourceError;
pub use source::PositionSource;
pub use tokio_impl::TokioContext;
pub use types::{DesiredAccuracy, Permission, Reading, SessionId};
