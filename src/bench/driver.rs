//! Benchmark driver
//!
//! Plans cases from the configured workloads, runs each case once per
//! library under identical parameters, and collects the results into a
//! [`BenchmarkReport`]. Libraries are processed one after another so a
//! fixture table is never shared by two libraries at the same time.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info};

use super::{invoke, Measurement, SequentialRunner, WorkerPool};
use crate::client::{ConnectionSet, DbHandle, Library};
use crate::config::BenchmarkConfig;
use crate::models::{BenchmarkReport, CaseMode, CaseReport, CaseStatus, RunResult};
use crate::workload::{Workload, WorkloadKind};
use crate::{BenchError, Result};

/// Lifecycle of a single case
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasePhase {
    Idle,
    Warming,
    Running,
    Draining,
    Reported,
}

impl CasePhase {
    /// Whether `next` may follow `self`. Any unfinished phase may jump to
    /// `Reported` when the case aborts.
    pub fn can_advance_to(&self, next: CasePhase) -> bool {
        use CasePhase::*;
        matches!(
            (self, next),
            (Idle, Warming)
                | (Idle, Running)
                | (Warming, Running)
                | (Running, Draining)
                | (Idle | Warming | Running | Draining, Reported)
        )
    }
}

/// Tracks and logs the phase transitions of one case
#[derive(Debug)]
pub struct PhaseTracker {
    case_id: String,
    phase: CasePhase,
}

impl PhaseTracker {
    pub fn new(case_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            phase: CasePhase::Idle,
        }
    }

    pub fn phase(&self) -> CasePhase {
        self.phase
    }

    pub fn advance(&mut self, next: CasePhase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(BenchError::WorkerError(format!(
                "case {}: illegal transition {:?} -> {:?}",
                self.case_id, self.phase, next
            )));
        }
        debug!(case = %self.case_id, from = ?self.phase, to = ?next, "phase");
        self.phase = next;
        Ok(())
    }
}

/// A workload together with the modes it is measured in
#[derive(Clone)]
pub struct WorkloadEntry {
    pub workload: Arc<dyn Workload>,
    pub modes: Vec<CaseMode>,
}

impl WorkloadEntry {
    pub fn new(workload: Arc<dyn Workload>, modes: Vec<CaseMode>) -> Self {
        Self { workload, modes }
    }
}

/// One (library, workload, mode) combination
#[derive(Clone)]
pub struct Case {
    pub library: Library,
    pub workload: Arc<dyn Workload>,
    pub mode: CaseMode,
}

impl Case {
    /// Case id in `<library>/<workload>/<mode>` form
    pub fn id(&self) -> String {
        format!("{}/{}/{}", self.library, self.workload.name(), self.mode)
    }
}

impl fmt::Debug for Case {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Orchestrates every case of a run
pub struct BenchmarkDriver {
    config: BenchmarkConfig,
    entries: Vec<WorkloadEntry>,
}

impl BenchmarkDriver {
    /// Create a driver for the built-in workloads
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        config.validate()?;

        let entries = WorkloadKind::all()
            .iter()
            .map(|kind| {
                Ok(WorkloadEntry::new(
                    kind.build(&config)?,
                    kind.modes(&config.concurrency_levels),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { config, entries })
    }

    /// Create a driver for a custom set of workloads
    pub fn with_workloads(config: BenchmarkConfig, entries: Vec<WorkloadEntry>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, entries })
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Selected cases for `library`, in run order
    pub fn plan(&self, library: Library) -> Vec<Case> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry.modes.iter().map(move |&mode| Case {
                    library,
                    workload: entry.workload.clone(),
                    mode,
                })
            })
            .filter(|case| self.config.selects_case(&case.id()))
            .collect()
    }

    /// Run every selected case for each handle, one library at a time.
    ///
    /// A failed case is recorded and the run moves on to the next case.
    pub async fn run(&self, handles: &[Arc<dyn DbHandle>]) -> BenchmarkReport {
        let mut report =
            BenchmarkReport::new(self.config.redacted_database_url(), self.config.iterations);

        for handle in handles {
            let cases = self.plan(handle.library());
            info!(library = %handle.library(), cases = cases.len(), "running library");

            for case in cases {
                report.push(self.run_case(handle.clone(), &case).await);
            }
        }

        report
    }

    /// Run one case, wrapping it in its fixture when the workload has one
    pub async fn run_case(&self, handle: Arc<dyn DbHandle>, case: &Case) -> CaseReport {
        let case_id = case.id();
        let mut tracker = PhaseTracker::new(case_id.clone());
        info!(case = %case_id, "starting case");

        let mut measured: Option<Measurement> = None;
        let fixture_result = match case.workload.fixture() {
            Some(fixture) => {
                let slot = &mut measured;
                let tracker = &mut tracker;
                let shared = handle.clone();
                fixture
                    .scoped(handle.as_ref(), move || async move {
                        *slot = Some(self.measure(shared, case, tracker).await);
                        Ok(())
                    })
                    .await
            }
            None => {
                measured = Some(self.measure(handle.clone(), case, &mut tracker).await);
                Ok(())
            }
        };

        let mut measurement = measured.unwrap_or_default();
        if measurement.error.is_none() {
            measurement.error = fixture_result.err();
        }

        let status = match &measurement.error {
            Some(err) => {
                error!(case = %case_id, error = %err, "case failed");
                // Failures outside the measured calls still count once
                if measurement.failures() == 0 {
                    measurement
                        .runs
                        .push(RunResult::failed(Duration::ZERO, err.to_string()));
                }
                CaseStatus::Failed {
                    error: err.to_string(),
                }
            }
            None => CaseStatus::Completed,
        };

        let report = CaseReport::from_runs(
            case.library,
            case.workload.name(),
            case.mode,
            &measurement.runs,
            measurement.wall_time,
            status,
        );

        if let Err(err) = tracker.advance(CasePhase::Reported) {
            error!(case = %case_id, error = %err, "phase tracking");
        }
        info!(
            case = %case_id,
            iterations = report.iterations,
            errors = report.errors,
            mean_us = report.latency.avg.as_micros() as u64,
            "case finished"
        );
        report
    }

    async fn measure(
        &self,
        handle: Arc<dyn DbHandle>,
        case: &Case,
        tracker: &mut PhaseTracker,
    ) -> Measurement {
        if self.config.warmup_iterations > 0 {
            if let Err(err) = tracker.advance(CasePhase::Warming) {
                return aborted(err);
            }
            if let Err(err) = self.warm_up(handle.as_ref(), case.workload.as_ref()).await {
                return aborted(err);
            }
        }

        if let Err(err) = tracker.advance(CasePhase::Running) {
            return aborted(err);
        }

        let progress = self.progress_bar(&case.id());
        let measurement = match case.mode {
            CaseMode::Sequential => {
                SequentialRunner::new(self.config.iterations, self.config.duration)
                    .run(handle.as_ref(), case.workload.as_ref(), &progress)
                    .await
            }
            CaseMode::Concurrent(level) => {
                WorkerPool::new(level, self.config.iterations, self.config.duration)
                    .run(handle, case.workload.clone(), progress.clone())
                    .await
            }
        };
        progress.finish_and_clear();

        if let Err(err) = tracker.advance(CasePhase::Draining) {
            return aborted(err);
        }
        measurement
    }

    /// Untimed invocations before measurement; the first error aborts
    async fn warm_up(&self, handle: &dyn DbHandle, workload: &dyn Workload) -> Result<()> {
        debug!(
            workload = workload.name(),
            iterations = self.config.warmup_iterations,
            "warming up"
        );
        for _ in 0..self.config.warmup_iterations {
            if let (_, Some(err)) = invoke(workload, handle).await {
                return Err(err);
            }
        }
        Ok(())
    }

    fn progress_bar(&self, case_id: &str) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(self.config.iterations);
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} {msg:<32} {pos}/{len} [{elapsed_precise}]")
        {
            pb.set_style(style);
        }
        pb.set_message(case_id.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }
}

fn aborted(err: BenchError) -> Measurement {
    Measurement {
        error: Some(err),
        ..Measurement::default()
    }
}

/// Open connections for `config`, run every selected case and close the
/// connections again, whatever happens in between.
pub async fn run_benchmarks(config: BenchmarkConfig) -> Result<BenchmarkReport> {
    let driver = BenchmarkDriver::new(config)?;
    let set = ConnectionSet::open(driver.config()).await?;
    set.scoped(|handles| async move { Ok(driver.run(&handles).await) })
        .await
}
