//! Concurrent worker pool
//!
//! Spawns one tokio task per logical worker. Workers claim iterations
//! from a shared atomic budget, keep their samples in local buffers and
//! hand them back on join, so the only shared state is the budget
//! counter and the abort flag.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{invoke, Measurement};
use crate::client::DbHandle;
use crate::models::RunResult;
use crate::workload::Workload;
use crate::BenchError;

/// Worker status for tracking individual worker states
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerStatus {
    /// Budget exhausted or deadline reached
    Completed,
    /// Stopped because another worker failed
    Aborted,
    /// This worker's invocation failed
    Failed(String),
}

/// What a worker hands back when it finishes
#[derive(Debug)]
struct WorkerOutcome {
    id: usize,
    status: WorkerStatus,
    runs: Vec<RunResult>,
    error: Option<(Instant, BenchError)>,
}

/// Fan-out executor for one concurrent case
#[derive(Debug, Clone)]
pub struct WorkerPool {
    concurrency: usize,
    iterations: u64,
    duration: Option<Duration>,
}

impl WorkerPool {
    pub fn new(concurrency: usize, iterations: u64, duration: Option<Duration>) -> Self {
        Self {
            concurrency: concurrency.max(1),
            iterations,
            duration,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run the case to completion and merge the worker buffers.
    ///
    /// All workers share `handle`. When one fails, the others stop
    /// claiming new iterations; calls already in flight finish and are
    /// recorded.
    pub async fn run(
        &self,
        handle: Arc<dyn DbHandle>,
        workload: Arc<dyn Workload>,
        progress: ProgressBar,
    ) -> Measurement {
        let claimed = Arc::new(AtomicU64::new(0));
        let abort = Arc::new(AtomicBool::new(false));
        let start = Instant::now();
        let deadline = self.duration.map(|d| start + d);

        let workers: Vec<JoinHandle<WorkerOutcome>> = (0..self.concurrency)
            .map(|id| {
                let handle = handle.clone();
                let workload = workload.clone();
                let progress = progress.clone();
                let claimed = claimed.clone();
                let abort = abort.clone();
                let budget = self.iterations;

                tokio::spawn(async move {
                    let mut outcome = WorkerOutcome {
                        id,
                        status: WorkerStatus::Completed,
                        runs: Vec::new(),
                        error: None,
                    };

                    loop {
                        if abort.load(Ordering::Acquire) {
                            outcome.status = WorkerStatus::Aborted;
                            break;
                        }
                        if deadline.is_some_and(|d| Instant::now() >= d) {
                            break;
                        }
                        if claimed.fetch_add(1, Ordering::AcqRel) >= budget {
                            break;
                        }

                        let (run, failure) = invoke(workload.as_ref(), handle.as_ref()).await;
                        outcome.runs.push(run);

                        if let Some(err) = failure {
                            abort.store(true, Ordering::Release);
                            outcome.status = WorkerStatus::Failed(err.to_string());
                            outcome.error = Some((Instant::now(), err));
                            break;
                        }
                        progress.inc(1);
                    }

                    outcome
                })
            })
            .collect();

        let mut measurement = Measurement::default();
        let mut first_error: Option<(Instant, BenchError)> = None;

        for joined in futures::future::join_all(workers).await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    let err = BenchError::WorkerError(format!("worker task lost: {}", join_err));
                    keep_earliest(&mut first_error, (Instant::now(), err));
                    continue;
                }
            };

            debug!(
                worker = outcome.id,
                status = ?outcome.status,
                runs = outcome.runs.len(),
                "worker drained"
            );
            measurement.runs.extend(outcome.runs);
            if let Some(failure) = outcome.error {
                keep_earliest(&mut first_error, failure);
            }
        }

        measurement.wall_time = start.elapsed();
        if let Some((_, err)) = first_error {
            error!(
                workload = workload.name(),
                library = %handle.library(),
                concurrency = self.concurrency,
                error = %err,
                "worker failed, case aborted"
            );
            measurement.error = Some(err);
        }
        measurement
    }
}

fn keep_earliest(slot: &mut Option<(Instant, BenchError)>, candidate: (Instant, BenchError)) {
    match slot {
        Some((at, _)) if *at <= candidate.0 => {}
        _ => *slot = Some(candidate),
    }
}
