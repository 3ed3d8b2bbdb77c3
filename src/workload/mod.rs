//! Workload definitions
//!
//! A workload is one unit of SQL work issued through the [`DbHandle`]
//! capability set. Workloads hold their statements and bind parameters
//! and are immutable once built, so one instance is shared by every
//! worker of a case.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::DbHandle;
use crate::config::BenchmarkConfig;
use crate::fixture::Fixture;
use crate::models::CaseMode;
use crate::Result;

pub mod mixed;
pub mod reads;

pub use mixed::MixedWrite;
pub use reads::{LatencyRead, PointRead};

/// A named, repeatable unit of database work
#[async_trait]
pub trait Workload: Send + Sync {
    /// Name used in case ids and reports
    fn name(&self) -> &str;

    /// Schema the workload needs around its case, if any
    fn fixture(&self) -> Option<&Fixture> {
        None
    }

    /// Perform one invocation
    async fn run(&self, handle: &dyn DbHandle) -> Result<()>;
}

/// Built-in workloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadKind {
    PointRead,
    LatencyRead,
    MixedWrite,
}

impl WorkloadKind {
    pub fn all() -> &'static [WorkloadKind] {
        &[
            WorkloadKind::PointRead,
            WorkloadKind::LatencyRead,
            WorkloadKind::MixedWrite,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkloadKind::PointRead => "point_read",
            WorkloadKind::LatencyRead => "latency_read",
            WorkloadKind::MixedWrite => "mixed_write",
        }
    }

    /// Get a human-readable description of the workload
    pub fn description(&self) -> &'static str {
        match self {
            WorkloadKind::PointRead => "SELECT 1 round trip",
            WorkloadKind::LatencyRead => "SELECT pg_sleep(t) under concurrency",
            WorkloadKind::MixedWrite => "INSERT one row, then COUNT(*)",
        }
    }

    /// Modes this workload is measured in.
    ///
    /// The point read is a pure latency probe and runs serially; the
    /// others run once per configured concurrency level.
    pub fn modes(&self, concurrency_levels: &[usize]) -> Vec<CaseMode> {
        match self {
            WorkloadKind::PointRead => vec![CaseMode::Sequential],
            WorkloadKind::LatencyRead | WorkloadKind::MixedWrite => concurrency_levels
                .iter()
                .map(|&level| CaseMode::Concurrent(level))
                .collect(),
        }
    }

    /// Instantiate the workload from the run configuration
    pub fn build(&self, config: &BenchmarkConfig) -> Result<Arc<dyn Workload>> {
        Ok(match self {
            WorkloadKind::PointRead => Arc::new(PointRead::new()),
            WorkloadKind::LatencyRead => Arc::new(LatencyRead::new(config.latency_delay)),
            WorkloadKind::MixedWrite => {
                Arc::new(MixedWrite::new(Fixture::new(config.fixture_table.clone())?))
            }
        })
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkloadKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        WorkloadKind::all()
            .iter()
            .copied()
            .find(|kind| kind.name() == s.trim())
            .ok_or_else(|| format!("Unknown workload: {}", s))
    }
}
