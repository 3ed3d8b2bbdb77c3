//! Benchmark engine module
//!
//! Contains the case driver, the sequential runner and the concurrent
//! worker pool, plus the shared invocation helper they both time with.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;

use crate::client::DbHandle;
use crate::models::RunResult;
use crate::workload::Workload;
use crate::BenchError;

pub mod driver;
pub mod sequential;
pub mod worker;

// Re-export commonly used types
pub use driver::{run_benchmarks, BenchmarkDriver, Case, CasePhase, PhaseTracker, WorkloadEntry};
pub use sequential::SequentialRunner;
pub use worker::WorkerPool;

/// Raw output of the measured phase of one case
#[derive(Debug, Default)]
pub struct Measurement {
    /// Every measured invocation, successful or not
    pub runs: Vec<RunResult>,
    /// Wall-clock time from first claim to last worker drained
    pub wall_time: Duration,
    /// The error that aborted the case, if any
    pub error: Option<BenchError>,
}

impl Measurement {
    pub fn successes(&self) -> u64 {
        self.runs.iter().filter(|r| r.success).count() as u64
    }

    pub fn failures(&self) -> u64 {
        self.runs.iter().filter(|r| !r.success).count() as u64
    }
}

/// Run one invocation and time it.
///
/// A panic inside the workload or handle is turned into a `WorkerError`
/// so it aborts the case instead of tearing down the process.
pub(crate) async fn invoke(
    workload: &dyn Workload,
    handle: &dyn DbHandle,
) -> (RunResult, Option<BenchError>) {
    let start = Instant::now();
    let outcome = AssertUnwindSafe(workload.run(handle)).catch_unwind().await;
    let elapsed = start.elapsed();

    let error = match outcome {
        Ok(Ok(())) => return (RunResult::ok(elapsed), None),
        Ok(Err(err)) => err,
        Err(panic) => BenchError::WorkerError(format!(
            "workload {} panicked: {}",
            workload.name(),
            panic_message(panic.as_ref())
        )),
    };

    (RunResult::failed(elapsed, error.to_string()), Some(error))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
