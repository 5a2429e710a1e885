//! GeoTrail Deterministic Simulation Harness
//!
//! Runs the real tracking engine against a scripted world so that long
//! tracking sessions and provider faults replay identically from one seed.
//!
//! # Core Principle: intercept every source of non-determinism
//!
//! - **Time**: `SimContext` virtual clock; the engine's sleeps advance it instantly
//! - **Location**: `ScriptedPositionSource` replays oracle-generated readings and faults
//! - **Storage**: `FaultyStore` fails scheduled appends on top of any store
//! - **Randomness**: all noise derived from a single 64-bit seed
//! - **Identity**: session ids derived from the same seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌───────────┐    script    ┌──────────────────────────┐    │
//! │  │  Oracle   │─────────────►│  ScriptedPositionSource  │    │
//! │  │ (seeded)  │              └────────────┬─────────────┘    │
//! │  └───────────┘                           │ polls            │
//! │                              ┌───────────▼─────────────┐    │
//! │  SimContext (virtual clock)─►│     TrackingEngine      │    │
//! │                              └──────┬──────────┬───────┘    │
//! │                          events     │          │ append     │
//! │                       ┌─────────────▼┐   ┌─────▼───────┐    │
//! │                       │EventRecorder │   │ FaultyStore │    │
//! │                       └──────────────┘   └─────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use geotrail_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::ProviderOutage);
//! assert!(result.passed);
//! ```

mod context;
mod oracle;
mod recorder;
mod runner;
pub mod scenarios;
mod source;
mod store;

pub use context::SimContext;
pub use oracle::{MotionProfile, Oracle};
pub use recorder::{EventCounts, EventRecorder};
pub use runner::{ScenarioResult, ScenarioRunner, SimError};
pub use source::{ScriptStep, ScriptedPositionSource};
pub use store::FaultyStore;
