//! Sequential benchmark runner
//!
//! Invokes a workload back to back on one handle until the iteration
//! budget is spent or the optional deadline passes. The first failed
//! invocation aborts the run.

use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use tracing::error;

use super::{invoke, Measurement};
use crate::client::DbHandle;
use crate::workload::Workload;

/// Upper bound on the sample buffer reserved before the first call
pub const INITIAL_CAPACITY: u64 = 4096;

/// Serial executor for one case
#[derive(Debug, Clone)]
pub struct SequentialRunner {
    iterations: u64,
    duration: Option<Duration>,
}

impl SequentialRunner {
    pub fn new(iterations: u64, duration: Option<Duration>) -> Self {
        Self {
            iterations,
            duration,
        }
    }

    pub async fn run(
        &self,
        handle: &dyn DbHandle,
        workload: &dyn Workload,
        progress: &ProgressBar,
    ) -> Measurement {
        let start = Instant::now();
        let deadline = self.duration.map(|d| start + d);
        let mut measurement = Measurement {
            runs: Vec::with_capacity(self.iterations.min(INITIAL_CAPACITY) as usize),
            ..Measurement::default()
        };

        for iteration in 0..self.iterations {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }

            let (run, failure) = invoke(workload, handle).await;
            measurement.runs.push(run);

            if let Some(err) = failure {
                error!(
                    workload = workload.name(),
                    library = %handle.library(),
                    iteration = iteration + 1,
                    error = %err,
                    "invocation failed, aborting case"
                );
                measurement.error = Some(err);
                break;
            }
            progress.inc(1);
        }

        measurement.wall_time = start.elapsed();
        measurement
    }
}
