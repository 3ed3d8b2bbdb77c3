//! pg-client-bench - PostgreSQL client benchmark harness
//!
//! Compares a struct-mapping SQL driver (sqlx) against a pooled
//! native-protocol client (deadpool-postgres) on the same database,
//! measuring point-read latency, concurrent throughput under a fixed
//! server-side delay, and a mixed insert/count workload.

use std::fmt;

pub mod bench;
pub mod client;
pub mod config;
pub mod fixture;
pub mod models;
pub mod report;
pub mod util;
pub mod workload;

// Common error types
#[derive(Debug)]
pub enum BenchError {
    /// A client handle could not be established
    ConnectionError(String),
    /// Fixture DDL (setup or teardown) failed
    SchemaError(String),
    /// A workload invocation failed
    QueryError(String),
    /// Configuration validation or parsing error
    ConfigError(String),
    /// Results persistence error
    PersistenceError(String),
    /// A benchmark worker task panicked or was lost
    WorkerError(String),
    /// I/O operation failed
    IoError(std::io::Error),
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            BenchError::SchemaError(msg) => write!(f, "Schema error: {}", msg),
            BenchError::QueryError(msg) => write!(f, "Query error: {}", msg),
            BenchError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            BenchError::PersistenceError(msg) => write!(f, "Results persistence error: {}", msg),
            BenchError::WorkerError(msg) => write!(f, "Worker error: {}", msg),
            BenchError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for BenchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BenchError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BenchError {
    fn from(err: std::io::Error) -> Self {
        BenchError::IoError(err)
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::PersistenceError(format!("JSON serialization error: {}", err))
    }
}

impl From<toml::de::Error> for BenchError {
    fn from(err: toml::de::Error) -> Self {
        BenchError::ConfigError(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for BenchError {
    fn from(err: toml::ser::Error) -> Self {
        BenchError::ConfigError(format!("TOML serialization error: {}", err))
    }
}

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;

/// Error handling utilities
pub mod error {
    use super::BenchError;

    /// Process exit code when every case completed
    pub const EXIT_OK: i32 = 0;
    /// Process exit code when at least one case aborted
    pub const EXIT_CASE_FAILED: i32 = 1;
    /// Process exit code when the run could not start
    pub const EXIT_FATAL: i32 = 2;

    /// Whether the error stops the whole run rather than a single case
    pub fn is_fatal_for_run(error: &BenchError) -> bool {
        matches!(
            error,
            BenchError::ConnectionError(_) | BenchError::ConfigError(_) | BenchError::IoError(_)
        )
    }

    /// Exit code for an error that escaped the run
    pub fn exit_code(error: &BenchError) -> i32 {
        if is_fatal_for_run(error) {
            EXIT_FATAL
        } else {
            EXIT_CASE_FAILED
        }
    }

    /// Convert error to user-friendly message with suggestions
    pub fn user_friendly_message(error: &BenchError) -> String {
        match error {
            BenchError::ConnectionError(msg) => format!(
                "Could not connect to PostgreSQL ({}). Check DATABASE_URL and that the server is reachable.",
                msg
            ),
            BenchError::ConfigError(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            BenchError::SchemaError(msg) => format!(
                "Fixture setup or teardown failed ({}). The database user needs CREATE/DROP TABLE rights.",
                msg
            ),
            BenchError::PersistenceError(_) => {
                "Failed to save results. Check disk space and permissions.".to_string()
            }
            _ => error.to_string(),
        }
    }
}

// Common types and constants
pub const APP_NAME: &str = "pg-client-bench";
pub const CONFIG_FILE: &str = "pg-client-bench.toml";
pub const RESULTS_FILE: &str = "results.json";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const MAX_RESULTS_HISTORY: usize = 100;
