//! Report history
//!
//! Keeps past [`BenchmarkReport`]s in a versioned JSON file under the user
//! data directory, rotated to the most recent runs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::BenchmarkReport;
use crate::{BenchError, Result, APP_NAME, MAX_RESULTS_HISTORY, RESULTS_FILE};

const FILE_VERSION: u32 = 1;

/// On-disk history of benchmark runs
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    results: Vec<BenchmarkReport>,
}

impl ResultsStorage {
    /// Storage at the default location
    pub fn new() -> Result<Self> {
        Ok(Self {
            results_path: Self::results_file_path()?,
        })
    }

    /// Storage at an explicit path
    pub fn with_path(results_path: impl Into<PathBuf>) -> Self {
        Self {
            results_path: results_path.into(),
        }
    }

    /// `$DATA_HOME/pg-client-bench/results.json`
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            BenchError::PersistenceError("Unable to determine data directory".to_string())
        })?;
        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// All stored reports, oldest first. A missing file is an empty history.
    pub fn load_results(&self) -> Result<Vec<BenchmarkReport>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path).map_err(|e| {
            persistence_error("read results file", &self.results_path, e)
        })?;
        let file: ResultsFile = serde_json::from_str(&content).map_err(|e| {
            persistence_error("parse results file", &self.results_path, e)
        })?;

        if file.version != FILE_VERSION {
            return Err(BenchError::PersistenceError(format!(
                "Unsupported results file version {} in {}",
                file.version,
                self.results_path.display()
            )));
        }
        Ok(file.results)
    }

    /// Append a report, dropping the oldest ones beyond the history limit
    pub fn append_result(&self, report: BenchmarkReport) -> Result<()> {
        let mut results = self.load_results()?;
        results.push(report);

        if results.len() > MAX_RESULTS_HISTORY {
            let excess = results.len() - MAX_RESULTS_HISTORY;
            results.drain(..excess);
        }

        self.save_results(results)
    }

    fn save_results(&self, results: Vec<BenchmarkReport>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| persistence_error("create results directory", parent, e))?;
        }

        let file = ResultsFile {
            version: FILE_VERSION,
            results,
        };
        let content = serde_json::to_string_pretty(&file)
            .map_err(|e| BenchError::PersistenceError(format!("Failed to serialize results: {}", e)))?;

        fs::write(&self.results_path, content)
            .map_err(|e| persistence_error("write results file", &self.results_path, e))?;

        debug!(path = %self.results_path.display(), runs = file.results.len(), "history saved");
        Ok(())
    }

    pub fn count_results(&self) -> Result<usize> {
        Ok(self.load_results()?.len())
    }

    pub fn clear_results(&self) -> Result<()> {
        if self.results_path.exists() {
            fs::remove_file(&self.results_path)
                .map_err(|e| persistence_error("remove results file", &self.results_path, e))?;
        }
        Ok(())
    }

    /// The most recent `count` reports, oldest first
    pub fn get_recent_results(&self, count: usize) -> Result<Vec<BenchmarkReport>> {
        let mut results = self.load_results()?;
        let skip = results.len().saturating_sub(count);
        results.drain(..skip);
        Ok(results)
    }

    pub fn get_results_path(&self) -> &Path {
        &self.results_path
    }
}

fn persistence_error(action: &str, path: &Path, err: impl std::fmt::Display) -> BenchError {
    BenchError::PersistenceError(format!("Failed to {} {}: {}", action, path.display(), err))
}
