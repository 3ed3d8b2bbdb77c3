//! Benchmark result data models
//!
//! Per-invocation outcomes, per-case summaries, and the run-level report
//! with serde support for JSON output and result history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::client::Library;

/// Outcome of a single workload invocation
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub elapsed: Duration,
    pub success: bool,
    pub error: Option<String>,
}

impl RunResult {
    pub fn ok(elapsed: Duration) -> Self {
        Self {
            elapsed,
            success: true,
            error: None,
        }
    }

    pub fn failed(elapsed: Duration, error: impl Into<String>) -> Self {
        Self {
            elapsed,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// How a case drives its workload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseMode {
    /// One caller, invocations back to back
    Sequential,
    /// N workers sharing one global iteration budget
    Concurrent(usize),
}

impl CaseMode {
    /// Number of logical workers
    pub fn concurrency(&self) -> usize {
        match self {
            CaseMode::Sequential => 1,
            CaseMode::Concurrent(n) => *n,
        }
    }

    /// Short label used in case ids ("seq", "c10")
    pub fn label(&self) -> String {
        match self {
            CaseMode::Sequential => "seq".to_string(),
            CaseMode::Concurrent(n) => format!("c{}", n),
        }
    }
}

impl fmt::Display for CaseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Final state of a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseStatus {
    Completed,
    Failed { error: String },
}

/// Summary of one (library, workload, mode) case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub library: Library,
    pub workload: String,
    pub mode: CaseMode,
    /// Successful measured invocations
    pub iterations: u64,
    /// Failed invocations (at most one per worker, since the case aborts)
    pub errors: u64,
    /// Wall-clock time of the measured phase
    #[serde(with = "duration_serde")]
    pub wall_time: Duration,
    /// Successful invocations per second of wall time
    pub throughput_ops: f64,
    pub latency: LatencyStats,
    #[serde(flatten)]
    pub status: CaseStatus,
}

impl CaseReport {
    /// Build a case summary from the merged invocation results
    pub fn from_runs(
        library: Library,
        workload: impl Into<String>,
        mode: CaseMode,
        runs: &[RunResult],
        wall_time: Duration,
        status: CaseStatus,
    ) -> Self {
        let samples: Vec<Duration> = runs
            .iter()
            .filter(|r| r.success)
            .map(|r| r.elapsed)
            .collect();
        let iterations = samples.len() as u64;
        let errors = runs.iter().filter(|r| !r.success).count() as u64;

        Self {
            library,
            workload: workload.into(),
            mode,
            iterations,
            errors,
            wall_time,
            throughput_ops: crate::util::units::calculate_ops_per_sec(iterations, wall_time),
            latency: LatencyStats::from_samples(&samples),
            status,
        }
    }

    /// Case id in `<library>/<workload>/<mode>` form
    pub fn case_id(&self) -> String {
        format!("{}/{}/{}", self.library, self.workload, self.mode)
    }

    pub fn concurrency(&self) -> usize {
        self.mode.concurrency()
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, CaseStatus::Failed { .. })
    }

    /// Flat machine-readable record
    pub fn record(&self) -> ReportRecord {
        ReportRecord {
            library: self.library.to_string(),
            workload: self.workload.clone(),
            concurrency: self.concurrency(),
            iterations: self.iterations,
            mean_latency_ns: self.latency.avg.as_nanos() as u64,
            p95_latency_ns: self.latency.p95().as_nanos() as u64,
            errors: self.errors,
            status: self.status.clone(),
        }
    }
}

/// One line of the JSON-lines report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub library: String,
    pub workload: String,
    pub concurrency: usize,
    pub iterations: u64,
    pub mean_latency_ns: u64,
    pub p95_latency_ns: u64,
    pub errors: u64,
    #[serde(flatten)]
    pub status: CaseStatus,
}

/// Complete report of one benchmark run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// When the run started
    pub timestamp: DateTime<Utc>,
    /// Target database with credentials masked
    pub database: String,
    /// Configured iteration budget per case
    pub iterations: u64,
    pub system_info: SystemInfo,
    pub cases: Vec<CaseReport>,
}

impl BenchmarkReport {
    pub fn new(database: impl Into<String>, iterations: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            database: database.into(),
            iterations,
            system_info: SystemInfo::detect(),
            cases: Vec::new(),
        }
    }

    pub fn push(&mut self, case: CaseReport) {
        self.cases.push(case);
    }

    /// Find the case for a (library, workload, concurrency) key
    pub fn get(&self, library: Library, workload: &str, concurrency: usize) -> Option<&CaseReport> {
        self.cases.iter().find(|c| {
            c.library == library && c.workload == workload && c.concurrency() == concurrency
        })
    }

    pub fn has_failures(&self) -> bool {
        self.cases.iter().any(CaseReport::is_failed)
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseReport> {
        self.cases.iter().filter(|c| c.is_failed())
    }

    pub fn records(&self) -> Vec<ReportRecord> {
        self.cases.iter().map(CaseReport::record).collect()
    }

    /// Get a human-readable one-line summary of the run
    pub fn summary(&self) -> String {
        let failed = self.failed_cases().count();
        format!(
            "{} - {} - {} cases, {} failed",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.database,
            self.cases.len(),
            failed
        )
    }
}

/// Latency statistics with min/avg/max and percentiles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(with = "duration_serde")]
    pub min: Duration,
    #[serde(with = "duration_serde")]
    pub avg: Duration,
    #[serde(with = "duration_serde")]
    pub max: Duration,
    /// Latency percentiles (50th, 95th, 99th)
    #[serde(with = "percentiles_serde")]
    pub percentiles: HashMap<u8, Duration>,
}

impl LatencyStats {
    pub fn p50(&self) -> Duration {
        self.percentiles.get(&50).copied().unwrap_or(self.avg)
    }

    /// Get the 95th percentile latency
    pub fn p95(&self) -> Duration {
        self.percentiles.get(&95).copied().unwrap_or(self.max)
    }

    /// Get the 99th percentile latency
    pub fn p99(&self) -> Duration {
        self.percentiles.get(&99).copied().unwrap_or(self.max)
    }

    /// Create latency statistics from a list of samples.
    ///
    /// Percentiles use the nearest-rank method.
    pub fn from_samples(samples: &[Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        let mut sorted = samples.to_vec();
        sorted.sort();
        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let avg_nanos: u128 =
            sorted.iter().map(|d| d.as_nanos()).sum::<u128>() / sorted.len() as u128;
        let avg = Duration::from_nanos(avg_nanos as u64);

        let mut percentiles = HashMap::new();
        for p in [50u8, 95, 99] {
            percentiles.insert(p, nearest_rank(&sorted, p));
        }

        Self {
            min,
            avg,
            max,
            percentiles,
        }
    }
}

fn nearest_rank(sorted: &[Duration], percentile: u8) -> Duration {
    let n = sorted.len();
    let rank = (percentile as usize * n).div_ceil(100).max(1);
    sorted[rank.min(n) - 1]
}

/// Host information captured at benchmark time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system and architecture
    pub os: String,
    /// Logical CPUs available to the process
    pub logical_cpus: usize,
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self {
            os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            logical_cpus: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

// Custom serde modules for Duration serialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

mod percentiles_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;
    use std::time::Duration;

    pub fn serialize<S>(
        percentiles: &HashMap<u8, Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let nanos_map: HashMap<u8, u64> = percentiles
            .iter()
            .map(|(&k, &v)| (k, v.as_nanos() as u64))
            .collect();
        nanos_map.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<HashMap<u8, Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos_map = HashMap::<u8, u64>::deserialize(deserializer)?;
        Ok(nanos_map
            .into_iter()
            .map(|(k, v)| (k, Duration::from_nanos(v)))
            .collect())
    }
}
