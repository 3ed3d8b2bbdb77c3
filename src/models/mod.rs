//! Data models module
//!
//! Contains per-invocation results, case summaries and the run report.

pub mod result;

// Re-export commonly used types
pub use result::{
    BenchmarkReport,
    CaseMode,
    CaseReport,
    CaseStatus,
    LatencyStats,
    ReportRecord,
    RunResult,
    SystemInfo,
};
