//! Configuration management module
//!
//! Handles loading, saving, and validation of the benchmark configuration.
//! Values are layered: defaults, then the TOML config file, then the
//! `DATABASE_URL` environment variable, then command-line flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::Library;
use crate::{BenchError, Result, APP_NAME, CONFIG_FILE, DATABASE_URL_ENV};

pub mod persistence;

pub const MAX_ITERATIONS: u64 = 10_000_000;
const MAX_CONCURRENCY: usize = 1024;
const MAX_POOL_SIZE: u32 = 1000;
const MAX_DURATION: Duration = Duration::from_secs(3600);
const MAX_LATENCY_DELAY: Duration = Duration::from_secs(10);
const MAX_IDENTIFIER_LEN: usize = 63;

/// Benchmark configuration containing all run parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// PostgreSQL connection URL shared by both libraries
    pub database_url: String,
    /// Libraries to benchmark, in run order
    pub libraries: Vec<Library>,
    /// Case id substrings to select; empty selects every case
    pub filter: Vec<String>,
    /// Measured iterations per case (the global budget in concurrent mode)
    pub iterations: u64,
    /// Optional wall-clock bound per case
    #[serde(
        with = "humantime_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub duration: Option<Duration>,
    /// Concurrency levels for concurrent workloads
    pub concurrency_levels: Vec<usize>,
    /// Untimed invocations before measurement starts
    pub warmup_iterations: u64,
    /// Maximum connections per library pool
    pub pool_size: u32,
    /// Server-side delay used by the latency workload
    #[serde(with = "humantime_duration")]
    pub latency_delay: Duration,
    /// Table created for the mixed write workload
    pub fixture_table: String,
    /// Show a progress bar per case
    pub show_progress: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            libraries: Library::all().to_vec(),
            filter: Vec::new(),
            iterations: 1000,
            duration: None,
            concurrency_levels: vec![1, 10, 50, 100],
            warmup_iterations: 0,
            pool_size: 10,
            latency_delay: Duration::from_millis(10),
            fixture_table: "benchmark_users".to_string(),
            show_progress: true,
        }
    }
}

impl BenchmarkConfig {
    /// Create a new benchmark configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        validate_database_url(&self.database_url)?;

        if self.libraries.is_empty() {
            return Err(BenchError::ConfigError(
                "At least one library must be selected".to_string(),
            ));
        }

        for (i, library) in self.libraries.iter().enumerate() {
            if self.libraries[..i].contains(library) {
                return Err(BenchError::ConfigError(format!(
                    "Library {} is selected more than once",
                    library
                )));
            }
        }

        if self.iterations == 0 {
            return Err(BenchError::ConfigError(
                "Iterations must be greater than 0".to_string(),
            ));
        }

        if self.iterations > MAX_ITERATIONS {
            return Err(BenchError::ConfigError(format!(
                "Too many iterations: {} (max: {})",
                self.iterations, MAX_ITERATIONS
            )));
        }

        if let Some(duration) = self.duration {
            if duration.is_zero() {
                return Err(BenchError::ConfigError(
                    "Duration must be greater than 0".to_string(),
                ));
            }
            if duration > MAX_DURATION {
                return Err(BenchError::ConfigError(format!(
                    "Duration too long: {}s (max: {}s)",
                    duration.as_secs(),
                    MAX_DURATION.as_secs()
                )));
            }
        }

        if self.concurrency_levels.is_empty() {
            return Err(BenchError::ConfigError(
                "At least one concurrency level is required".to_string(),
            ));
        }

        for (i, &level) in self.concurrency_levels.iter().enumerate() {
            if level == 0 || level > MAX_CONCURRENCY {
                return Err(BenchError::ConfigError(format!(
                    "Concurrency level must be between 1 and {}, got {}",
                    MAX_CONCURRENCY, level
                )));
            }
            if self.concurrency_levels[..i].contains(&level) {
                return Err(BenchError::ConfigError(format!(
                    "Concurrency level {} is listed more than once",
                    level
                )));
            }
        }

        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(BenchError::ConfigError(format!(
                "Pool size must be between 1 and {}, got {}",
                MAX_POOL_SIZE, self.pool_size
            )));
        }

        if self.latency_delay > MAX_LATENCY_DELAY {
            return Err(BenchError::ConfigError(format!(
                "Latency delay too long: {:?} (max: {:?})",
                self.latency_delay, MAX_LATENCY_DELAY
            )));
        }

        validate_identifier(&self.fixture_table)?;

        Ok(())
    }

    /// Set the database URL
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Set the libraries to benchmark
    pub fn with_libraries(mut self, libraries: Vec<Library>) -> Self {
        self.libraries = libraries;
        self
    }

    /// Set the case filter
    pub fn with_filter(mut self, filter: Vec<String>) -> Self {
        self.filter = filter;
        self
    }

    /// Set the iteration budget
    pub fn with_iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the per-case duration bound
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Set the concurrency levels
    pub fn with_concurrency_levels(mut self, levels: Vec<usize>) -> Self {
        self.concurrency_levels = levels;
        self
    }

    /// Set the warm-up iteration count
    pub fn with_warmup_iterations(mut self, warmup: u64) -> Self {
        self.warmup_iterations = warmup;
        self
    }

    /// Set the per-library pool size
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the latency workload delay
    pub fn with_latency_delay(mut self, delay: Duration) -> Self {
        self.latency_delay = delay;
        self
    }

    /// Set the fixture table name
    pub fn with_fixture_table(mut self, table: impl Into<String>) -> Self {
        self.fixture_table = table.into();
        self
    }

    /// Enable or disable progress bars
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Whether a case id is selected by the filter
    pub fn selects_case(&self, case_id: &str) -> bool {
        self.filter.is_empty() || self.filter.iter().any(|f| case_id.contains(f.as_str()))
    }

    /// Database URL with credentials masked, safe for logs and reports
    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }

    /// Fill the database URL from `DATABASE_URL` when it is set
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.database_url = url;
            }
        }
        self
    }

    /// Load configuration from the standard config file location.
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self> {
        Ok(ConfigFile::read_default()?
            .map(|file| file.config)
            .unwrap_or_default())
    }

    /// Load configuration from a specific TOML file.
    ///
    /// The result is not validated: the URL may still arrive from the
    /// environment or the command line.
    pub fn load_from(path: &Path) -> Result<Self> {
        ConfigFile::read(path).map(|file| file.config)
    }

    /// Save configuration to a TOML file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BenchError::ConfigError(format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(path, content).map_err(|e| {
            BenchError::ConfigError(format!(
                "Failed to write config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Get the standard configuration file path
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            BenchError::ConfigError("Unable to determine config directory".to_string())
        })?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}

fn validate_database_url(url: &str) -> Result<()> {
    if url.trim().is_empty() {
        return Err(BenchError::ConfigError(format!(
            "Database URL is not set (use --database-url or {})",
            DATABASE_URL_ENV
        )));
    }

    if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
        return Err(BenchError::ConfigError(format!(
            "Database URL must use the postgres:// scheme: {}",
            redact_database_url(url)
        )));
    }

    Ok(())
}

/// A parsed config file together with the top-level keys it sets
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: BenchmarkConfig,
    keys: Vec<String>,
}

impl ConfigFile {
    /// Read and parse a TOML config file
    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BenchError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content).map_err(|e| {
            BenchError::ConfigError(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// Read the file at the standard location, if there is one
    pub fn read_default() -> Result<Option<Self>> {
        let path = BenchmarkConfig::config_file_path()?;
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path).map(Some)
    }

    fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(content)?;
        let config: BenchmarkConfig = toml::from_str(content)?;
        Ok(Self {
            config,
            keys: table.keys().cloned().collect(),
        })
    }

    /// Whether the file sets `key` explicitly rather than leaving the default
    pub fn sets(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

/// Check that a table name is a plain, unquoted SQL identifier
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !starts_ok
        || name.len() > MAX_IDENTIFIER_LEN
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(BenchError::ConfigError(format!(
            "Invalid table name: {:?}",
            name
        )));
    }

    Ok(())
}

/// Mask the password in a connection URL.
///
/// Handles both the userinfo form (`user:secret@host`) and a
/// `password=` query parameter.
pub fn redact_database_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let (scheme, rest) = url.split_at(scheme_end + 3);

    let authority_end = rest.find('/').unwrap_or(rest.len());
    let mut redacted = match rest[..authority_end].rfind('@') {
        Some(at) => {
            let userinfo = &rest[..at];
            let user = match userinfo.find(':') {
                Some(colon) => format!("{}:***", &userinfo[..colon]),
                None => userinfo.to_string(),
            };
            format!("{}{}{}", scheme, user, &rest[at..])
        }
        None => url.to_string(),
    };

    if let Some(query_start) = redacted.find('?') {
        let (base, query) = redacted.split_at(query_start + 1);
        let params: Vec<String> = query
            .split('&')
            .map(|pair| {
                if pair.starts_with("password=") {
                    "password=***".to_string()
                } else {
                    pair.to_string()
                }
            })
            .collect();
        redacted = format!("{}{}", base, params.join("&"));
    }

    redacted
}

// Durations are stored as humantime strings ("10ms", "30s") in TOML
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

mod humantime_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
