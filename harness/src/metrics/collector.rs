//! Thread-safe bookkeeping of named benchmark runs
//!
//! A [`Collector`] owns a table of runs and a pointer to the current one.
//! Storage calls happen outside the lock; only the record append and the
//! summary computation run under it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{CollectorError, CollectorResult};
use crate::metrics::{BenchmarkRun, OperationKind, OperationRecord, RunSpec, RunStatistics};

/// Identity of the current run. The generation distinguishes a run from a
/// later one registered under the same name after a reset.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveRun {
    name: String,
    generation: u64,
}

struct TrackedRun {
    generation: u64,
    started: Instant,
    run: BenchmarkRun,
}

#[derive(Default)]
struct CollectorState {
    runs: HashMap<String, TrackedRun>,
    current: Option<ActiveRun>,
    next_generation: u64,
}

/// Metrics collector for one benchmark session
#[derive(Default)]
pub struct Collector {
    state: Mutex<CollectorState>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new run and make it the measurement target.
    ///
    /// A previously current run stays in the table but receives no further
    /// measurements that begin after this call. Names must be unique until
    /// [`Collector::reset`].
    pub fn start_test(&self, spec: RunSpec) -> CollectorResult<()> {
        let mut state = self.lock();
        if state.runs.contains_key(&spec.name) {
            warn!(run = %spec.name, "rejected duplicate test name");
            return Err(CollectorError::DuplicateRun { name: spec.name });
        }

        if let Some(previous) = state.current.take() {
            debug!(run = %previous.name, superseded_by = %spec.name, "current test superseded");
        }

        let generation = state.next_generation;
        state.next_generation += 1;

        info!(run = %spec.name, backend = %spec.backend, "test started");
        let name = spec.name.clone();
        state.runs.insert(
            name.clone(),
            TrackedRun {
                generation,
                started: Instant::now(),
                run: BenchmarkRun::new(spec),
            },
        );
        state.current = Some(ActiveRun { name, generation });
        Ok(())
    }

    /// Run `work` and record its duration and outcome against the current run.
    ///
    /// The result of `work` is returned unchanged. With no current run the
    /// closure is never invoked and `E::from(CollectorError::NoActiveRun)` is
    /// returned instead. Measurements attach to the run that was current when
    /// they began; if that run has been ended in the meantime the record is
    /// dropped rather than moved to a newer run, so callers finish their work
    /// before calling [`Collector::end_test`].
    pub async fn measure<F, Fut, T, E>(
        &self,
        kind: OperationKind,
        item_count: u64,
        byte_count: u64,
        is_cold_start: bool,
        work: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CollectorError> + fmt::Display,
    {
        let target = match self.lock().current.clone() {
            Some(active) => active,
            None => {
                warn!(%kind, "measurement attempted with no active test");
                return Err(E::from(CollectorError::NoActiveRun));
            }
        };

        let start_time = Utc::now();
        let started = Instant::now();
        let result = work().await;
        let elapsed = started.elapsed();

        let record = OperationRecord::new(
            kind,
            start_time,
            elapsed,
            item_count,
            byte_count,
            is_cold_start,
            result.as_ref().err().map(|e| e.to_string()),
        );
        self.append(&target, record);

        result
    }

    fn append(&self, target: &ActiveRun, record: OperationRecord) {
        let mut state = self.lock();
        match state.runs.get_mut(&target.name) {
            Some(tracked) if tracked.generation == target.generation && !tracked.run.is_finalized() => {
                tracked.run.operations.push(record);
            }
            _ => debug!(run = %target.name, "dropping record for a finished test"),
        }
    }

    /// Merge a custom key into the current run's summary immediately.
    pub fn add_custom_metric(
        &self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> CollectorResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let active = state.current.as_ref().ok_or_else(|| {
            warn!("custom metric added with no active test");
            CollectorError::NoActiveRun
        })?;
        let tracked = state
            .runs
            .get_mut(&active.name)
            .ok_or(CollectorError::NoActiveRun)?;
        tracked.run.summary.insert(name.into(), value.into());
        Ok(())
    }

    /// Finalize the current run: stamp its end, compute the summary and
    /// clear the current pointer.
    ///
    /// Fails with [`CollectorError::NotCurrent`] if `name` was already ended
    /// or superseded, and [`CollectorError::UnknownRun`] if it was never
    /// started.
    pub fn end_test(&self, name: &str) -> CollectorResult<BenchmarkRun> {
        let mut guard = self.lock();
        let state = &mut *guard;

        if state.current.as_ref().map(|a| a.name.as_str()) != Some(name) {
            warn!(run = %name, "end requested for a test that is not current");
            return Err(if state.runs.contains_key(name) {
                CollectorError::NotCurrent {
                    name: name.to_string(),
                }
            } else {
                CollectorError::UnknownRun {
                    name: name.to_string(),
                }
            });
        }

        let tracked = state
            .runs
            .get_mut(name)
            .ok_or_else(|| CollectorError::UnknownRun {
                name: name.to_string(),
            })?;

        let elapsed = tracked.started.elapsed();
        let run = &mut tracked.run;
        run.end_time = Some(
            run.start_time + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero()),
        );
        run.duration = Some(elapsed);

        let stats = RunStatistics::compute(&run.operations, elapsed);
        stats.apply_to(&mut run.summary);

        info!(
            run = %name,
            operations = stats.operation_count,
            errors = stats.error_count,
            success_rate = stats.success_rate,
            "test finished"
        );

        let finished = run.clone();
        state.current = None;
        Ok(finished)
    }

    /// Snapshot of a stored run, finalized or still in progress.
    pub fn get_test_result(&self, name: &str) -> Option<BenchmarkRun> {
        self.lock().runs.get(name).map(|t| t.run.clone())
    }

    pub fn current_test(&self) -> Option<String> {
        self.lock().current.as_ref().map(|a| a.name.clone())
    }

    /// Names of every stored run, sorted.
    pub fn test_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().runs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every run and the current pointer.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.runs.clear();
        state.current = None;
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Collector")
            .field("runs", &state.runs.len())
            .field("current", &state.current.as_ref().map(|a| a.name.as_str()))
            .finish()
    }
}
