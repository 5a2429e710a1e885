//! Scenario runner - drives the real engine against scripted providers.
//!
//! Each run builds a fresh virtual clock, oracle-generated script and store,
//! runs the engine until the script is consumed or the engine stops on its
//! own, then checks the outcome against the engine's guarantees.

use crate::context::SimContext;
use crate::oracle::{MotionProfile, Oracle};
use crate::recorder::{EventCounts, EventRecorder};
use crate::scenarios::ScenarioId;
use crate::source::{ScriptStep, ScriptedPositionSource};
use crate::store::FaultyStore;

use geotrail_core::{
    decide, ConfigError, Decision, ErrorReason, Extent, MemorySampleStore, Sample, SampleStore,
    SessionStats, SledSampleStore, StoreError, TrackingConfig, TrackingEngine, TrackingEvent,
    TrackingState,
};
use geotrail_env::{Permission, Reading, SourceError, TrackerContext};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Kiel harbour
const ORIGIN: (f64, f64) = (54.3233, 10.1228);

/// Fixes delivered before the provider goes down in `ProviderOutage`.
const FIXES_BEFORE_OUTAGE: usize = 10;

/// Errors that abort a scenario before it can be judged.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("Engine configuration rejected: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to build runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("Scenario did not finish within {0:?}")]
    Deadline(Duration),
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all checks
    pub passed: bool,

    /// Engine counters of the (last) session
    pub stats: SessionStats,

    /// Events observed, by kind
    pub events: EventCounts,

    /// Samples in the store at the end
    pub stored: usize,

    /// Virtual time consumed, in seconds
    pub final_time_secs: f64,

    /// View fitted to the stored samples
    pub extent: Option<Extent>,

    /// Failure message if any
    pub failure_reason: Option<String>,
}

impl ScenarioResult {
    fn errored(scenario: ScenarioId, seed: u64, error: SimError) -> Self {
        Self {
            scenario,
            seed,
            passed: false,
            stats: SessionStats::default(),
            events: EventCounts::default(),
            stored: 0,
            final_time_secs: 0.0,
            extent: None,
            failure_reason: Some(error.to_string()),
        }
    }
}

/// Inputs of one run.
struct ScenarioPlan {
    config: TrackingConfig,
    permission: Permission,
    script: Vec<ScriptStep>,
    /// Append attempts the store fails
    store_faults: Vec<usize>,
    /// Poll failures the script contains
    poll_failures: usize,
}

/// What a run produced.
struct Outcome {
    plan_config: TrackingConfig,
    poll_failures: usize,
    start_error: Option<ErrorReason>,
    events: Vec<TrackingEvent>,
    counts: EventCounts,
    accepted: Vec<Sample>,
    errors: Vec<ErrorReason>,
    stored: Vec<Sample>,
    stats: SessionStats,
    final_state: TrackingState,
    final_time: Duration,
    injected_store_failures: usize,
    extent: Option<Extent>,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Master seed
    seed: u64,

    /// Engine configuration every scenario starts from
    config: TrackingConfig,

    /// Polls scripted per scenario
    polls: usize,

    /// Sled directory; in-memory store when unset
    db_dir: Option<PathBuf>,

    /// Real-time bound on a single run
    deadline: Duration,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: TrackingConfig::default(),
            polls: 120,
            db_dir: None,
            deadline: Duration::from_secs(30),
        }
    }

    /// Sets the base engine configuration.
    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the number of scripted polls.
    pub fn with_polls(mut self, polls: usize) -> Self {
        self.polls = polls.max(FIXES_BEFORE_OUTAGE + 1);
        self
    }

    /// Persists samples with sled under `dir` (one database per scenario and seed).
    pub fn with_db_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.db_dir = Some(dir.into());
        self
    }

    /// Runs a scenario on a fresh single-threaded runtime.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();

        match runtime {
            Ok(runtime) => runtime.block_on(self.run_async(scenario)),
            Err(e) => ScenarioResult::errored(scenario, self.seed, e.into()),
        }
    }

    /// Runs a scenario on the caller's runtime.
    pub async fn run_async(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        if scenario.is_fault() {
            debug!("{}", scenario.description());
        }

        let context = SimContext::shared(self.seed);
        let plan = self.plan(scenario, &context);

        let outcome = match &self.db_dir {
            None => self.execute(&context, plan, MemorySampleStore::new()).await,
            Some(dir) => self.execute_on_sled(&context, dir, scenario, plan).await,
        };

        match outcome {
            Ok(outcome) => self.judge(scenario, outcome),
            Err(e) => {
                warn!(scenario = %scenario, error = %e, "scenario aborted");
                ScenarioResult::errored(scenario, self.seed, e)
            }
        }
    }

    fn plan(&self, scenario: ScenarioId, context: &SimContext) -> ScenarioPlan {
        let config = self.config.clone();
        let physics_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut oracle = Oracle::new(physics_seed, ORIGIN, context.epoch_ms());
        let dt = config.poll_interval;
        let bound = config.max_consecutive_failures as usize;

        let fixes = |oracle: &mut Oracle, profile: MotionProfile, n: usize| -> Vec<ScriptStep> {
            oracle
                .track(n, dt, &profile)
                .into_iter()
                .map(ScriptStep::Fix)
                .collect()
        };

        let mut plan = ScenarioPlan {
            config,
            permission: Permission::Granted,
            script: Vec::new(),
            store_faults: Vec::new(),
            poll_failures: 0,
        };

        match scenario {
            ScenarioId::Commute | ScenarioId::PermissionDenied => {
                plan.script = fixes(&mut oracle, MotionProfile::driving(), self.polls);
                if scenario == ScenarioId::PermissionDenied {
                    plan.permission = Permission::Denied;
                }
            }
            ScenarioId::Dwell => {
                plan.script = fixes(&mut oracle, MotionProfile::stationary(), self.polls);
            }
            ScenarioId::NoisyFix => {
                plan.script = fixes(&mut oracle, MotionProfile::urban_walk(), self.polls);
            }
            ScenarioId::FlakyProvider => {
                plan.script = fixes(&mut oracle, MotionProfile::driving(), self.polls);
                // A lone failure only stays harmless when the bound is above one
                if bound >= 2 {
                    for (i, step) in plan.script.iter_mut().enumerate() {
                        if i % 4 == 3 {
                            *step = ScriptStep::Fail(SourceError::unavailable("no fix"));
                            plan.poll_failures += 1;
                        }
                    }
                }
            }
            ScenarioId::ProviderOutage => {
                let profile = MotionProfile::driving();
                plan.script = fixes(&mut oracle, profile.clone(), FIXES_BEFORE_OUTAGE);
                let timeout = plan.config.poll_timeout;
                plan.script
                    .extend((0..bound).map(|_| ScriptStep::Fail(SourceError::TimedOut(timeout))));
                plan.poll_failures = bound;
                let rest = self.polls.saturating_sub(FIXES_BEFORE_OUTAGE);
                plan.script.extend(fixes(&mut oracle, profile, rest));
            }
            ScenarioId::StoreOutage => {
                plan.script = fixes(&mut oracle, MotionProfile::driving(), self.polls);
                // Attempts 3 and 4 lose the fourth sample, attempt 7 is retried
                plan.store_faults = vec![3, 4, 7];
            }
        }

        plan
    }

    async fn execute_on_sled(
        &self,
        context: &Arc<SimContext>,
        dir: &Path,
        scenario: ScenarioId,
        plan: ScenarioPlan,
    ) -> Result<Outcome, SimError> {
        let path = dir.join(format!("{}-{}", scenario.name(), self.seed));
        let store = SledSampleStore::open(&path)?;
        store.clear_all().await?;
        debug!(path = %path.display(), "using sled store");
        self.execute(context, plan, store).await
    }

    async fn execute<St: SampleStore>(
        &self,
        context: &Arc<SimContext>,
        plan: ScenarioPlan,
        store: St,
    ) -> Result<Outcome, SimError> {
        let source = ScriptedPositionSource::shared(plan.permission, plan.script);
        let store = Arc::new(FaultyStore::new(store, plan.store_faults));
        let engine = TrackingEngine::new(
            Arc::clone(context),
            Arc::clone(&source),
            Arc::clone(&store),
            plan.config.clone(),
        )?;

        let recorder = EventRecorder::shared();
        engine.subscribe(recorder.clone());

        let started = engine.start().await;
        if started.is_ok() {
            let finished = tokio::time::timeout(self.deadline, async {
                tokio::select! {
                    _ = source.wait_exhausted() => {}
                    _ = recorder.wait_stopped() => {}
                }
            })
            .await;
            engine.stop();
            if finished.is_err() {
                return Err(SimError::Deadline(self.deadline));
            }
        }

        let stored = store.query_all().await?;
        let extent = engine.catalog().extent_all().await?;

        Ok(Outcome {
            plan_config: plan.config,
            poll_failures: plan.poll_failures,
            start_error: started.err().map(|e| e.reason()),
            events: recorder.events(),
            counts: recorder.counts(),
            accepted: recorder.accepted(),
            errors: recorder.errors(),
            stored,
            stats: engine.session_stats(),
            final_state: engine.state(),
            final_time: context.now(),
            injected_store_failures: store.injected_failures(),
            extent,
        })
    }

    fn judge(&self, scenario: ScenarioId, outcome: Outcome) -> ScenarioResult {
        let verdict = check_invariants(&outcome).and_then(|_| check_scenario(scenario, &outcome));

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: verdict.is_ok(),
            stats: outcome.stats,
            events: outcome.counts,
            stored: outcome.stored.len(),
            final_time_secs: outcome.final_time.as_secs_f64(),
            extent: outcome.extent,
            failure_reason: verdict.err(),
        }
    }
}

/// Guarantees every scenario must uphold.
fn check_invariants(outcome: &Outcome) -> Result<(), String> {
    if outcome.final_state != TrackingState::Stopped {
        return Err(format!("engine ended in {:?}", outcome.final_state));
    }

    let stored_ids: Vec<_> = outcome.stored.iter().map(|s| s.id).collect();
    let published_ids: Vec<_> = outcome.accepted.iter().map(|s| s.id).collect();
    if stored_ids != published_ids {
        return Err(format!(
            "{} samples stored but {} published",
            stored_ids.len(),
            published_ids.len()
        ));
    }
    if outcome.stats.accepted != outcome.stored.len() as u64 {
        return Err(format!(
            "stats count {} accepted, store holds {}",
            outcome.stats.accepted,
            outcome.stored.len()
        ));
    }

    // Re-run the filter over the stored track: every sample must pass against its predecessor
    let config = &outcome.plan_config;
    let mut previous: Option<&Sample> = None;
    for sample in &outcome.stored {
        let mut reading = Reading::new(sample.latitude, sample.longitude, sample.timestamp_ms);
        reading.accuracy_m = sample.accuracy_m;

        if let Decision::Reject(reason) = decide(&reading, previous, config) {
            return Err(format!("stored sample {} would be rejected: {:?}", sample.id, reason));
        }
        previous = Some(sample);
    }

    Ok(())
}

fn check_scenario(scenario: ScenarioId, outcome: &Outcome) -> Result<(), String> {
    let config = &outcome.plan_config;

    match scenario {
        ScenarioId::Commute => {
            expect(!outcome.stored.is_empty(), "no samples stored")?;
            expect(outcome.errors.is_empty(), "unexpected error events")?;
        }
        ScenarioId::Dwell => {
            expect(!outcome.stored.is_empty(), "no samples stored")?;
            expect(outcome.errors.is_empty(), "unexpected error events")?;
            let interval_gates =
                config.min_interval_secs > 2.0 * config.poll_interval.as_secs_f64();
            if interval_gates && config.min_distance_m >= 20.0 {
                expect(
                    outcome.stats.rejected > outcome.stats.accepted,
                    "stationary device was not thinned",
                )?;
            }
        }
        ScenarioId::NoisyFix => {
            expect(outcome.errors.is_empty(), "unexpected error events")?;
            if config.max_accuracy_m.is_some() {
                expect(outcome.stats.rejected > 0, "poor fixes were not rejected")?;
            }
        }
        ScenarioId::FlakyProvider => {
            expect(outcome.errors.is_empty(), "isolated failures raised an error")?;
            expect(
                outcome.counts.reading_failed == outcome.poll_failures,
                "reading failures not reported one by one",
            )?;
            expect(
                outcome.stats.failures == outcome.poll_failures as u64,
                "failure counter mismatch",
            )?;
        }
        ScenarioId::ProviderOutage => {
            expect(
                outcome.errors == vec![ErrorReason::ProviderUnavailable],
                "expected exactly one ProviderUnavailable error",
            )?;
            let tail: Vec<&TrackingEvent> = outcome.events.iter().rev().take(2).collect();
            expect(
                matches!(
                    tail.as_slice(),
                    [
                        TrackingEvent::StatusChanged { is_tracking: false },
                        TrackingEvent::ErrorOccurred { .. }
                    ]
                ),
                "fault did not end with ErrorOccurred then StatusChanged(false)",
            )?;
            expect(outcome.counts.status_changed == 2, "expected one start and one stop")?;
            expect(
                outcome.stored.len() <= FIXES_BEFORE_OUTAGE,
                "samples stored after the outage",
            )?;
        }
        ScenarioId::PermissionDenied => {
            expect(
                outcome.start_error == Some(ErrorReason::PermissionDenied),
                "start did not fail with PermissionDenied",
            )?;
            expect(
                outcome.errors == vec![ErrorReason::PermissionDenied],
                "expected exactly one PermissionDenied error",
            )?;
            expect(outcome.counts.status_changed == 0, "status changed without a session")?;
            expect(outcome.stored.is_empty(), "samples stored without permission")?;
        }
        ScenarioId::StoreOutage => {
            expect(
                outcome.errors == vec![ErrorReason::PersistenceFailure],
                "expected exactly one PersistenceFailure error",
            )?;
            expect(outcome.stats.persist_failures == 1, "persist failure counter mismatch")?;
            expect(outcome.injected_store_failures == 3, "store faults not all exercised")?;
        }
    }

    Ok(())
}

fn expect(condition: bool, message: &str) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message.to_string())
    }
}
