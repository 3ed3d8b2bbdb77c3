//! Client handles for the libraries under test
//!
//! Both libraries are reduced to the same small capability set
//! ([`DbHandle`]) so workloads never need to know which one they drive.
//! [`ConnectionSet`] owns one handle per library for the length of a run.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::BenchmarkConfig;
use crate::Result;

pub mod deadpool_handle;
pub mod sqlx_handle;

pub use deadpool_handle::DeadpoolHandle;
pub use sqlx_handle::SqlxHandle;

/// Identifier of a library under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    /// sqlx `PgPool` with row-to-struct mapping
    Sqlx,
    /// deadpool-postgres pool over tokio-postgres
    Deadpool,
}

impl Library {
    pub fn all() -> &'static [Library] {
        &[Library::Sqlx, Library::Deadpool]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Library::Sqlx => "sqlx",
            Library::Deadpool => "deadpool",
        }
    }

    /// Get a human-readable description of the library
    pub fn description(&self) -> &'static str {
        match self {
            Library::Sqlx => "sqlx (generic SQL toolkit, struct mapping)",
            Library::Deadpool => "deadpool-postgres (pooled tokio-postgres client)",
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Library {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlx" => Ok(Library::Sqlx),
            "deadpool" | "deadpool-postgres" | "tokio-postgres" => Ok(Library::Deadpool),
            other => Err(format!("Unknown library: {} (expected sqlx or deadpool)", other)),
        }
    }
}

/// Bind parameter passed through to the underlying driver
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(value.to_string())
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(value)
    }
}

/// Capability set every library adapter provides.
///
/// Implementations must be safe to share across worker tasks; the
/// library's own pool decides how physical connections are reused.
#[async_trait]
pub trait DbHandle: Send + Sync {
    /// Which library this handle drives
    fn library(&self) -> Library;

    /// Run a statement and return the number of affected rows
    async fn execute(&self, statement: &str, params: &[SqlParam]) -> Result<u64>;

    /// Run a query returning one row and read its first column as an integer
    async fn query_scalar(&self, statement: &str, params: &[SqlParam]) -> Result<i64>;

    /// Release the handle's connections
    async fn close(&self);
}

/// One open handle per library under test
pub struct ConnectionSet {
    handles: Vec<Arc<dyn DbHandle>>,
    closed: bool,
}

impl ConnectionSet {
    /// Open a handle for every configured library.
    ///
    /// If any handle fails, the ones already opened are closed before the
    /// `ConnectionError` is returned.
    pub async fn open(config: &BenchmarkConfig) -> Result<Self> {
        let url = config.database_url.as_str();
        let pool_size = config.pool_size;
        Self::open_with(config, move |library| connect(library, url, pool_size)).await
    }

    /// Open handles through `opener`, one per configured library in order.
    ///
    /// Same close-on-failure behavior as [`ConnectionSet::open`].
    pub async fn open_with<F, Fut>(config: &BenchmarkConfig, mut opener: F) -> Result<Self>
    where
        F: FnMut(Library) -> Fut,
        Fut: Future<Output = Result<Arc<dyn DbHandle>>>,
    {
        info!(
            database = %config.redacted_database_url(),
            libraries = ?config.libraries,
            "opening connections"
        );

        let mut set = Self::from_handles(Vec::new());
        for &library in &config.libraries {
            match opener(library).await {
                Ok(handle) => {
                    debug!(%library, "handle ready");
                    set.handles.push(handle);
                }
                Err(err) => {
                    warn!(%library, error = %err, "failed to open handle");
                    set.close().await;
                    return Err(err);
                }
            }
        }

        Ok(set)
    }

    /// Wrap handles that are already open
    pub fn from_handles(handles: Vec<Arc<dyn DbHandle>>) -> Self {
        Self {
            handles,
            closed: false,
        }
    }

    pub fn handles(&self) -> &[Arc<dyn DbHandle>] {
        &self.handles
    }

    pub fn get(&self, library: Library) -> Option<&Arc<dyn DbHandle>> {
        self.handles.iter().find(|h| h.library() == library)
    }

    pub fn libraries(&self) -> Vec<Library> {
        self.handles.iter().map(|h| h.library()).collect()
    }

    /// Close every handle. Consumes the set, so it runs once.
    pub async fn close(mut self) {
        self.close_handles().await;
    }

    async fn close_handles(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        for handle in &self.handles {
            debug!(library = %handle.library(), "closing handle");
            handle.close().await;
        }
    }

    /// Run `body` with the open handles, then close them.
    ///
    /// The handles are closed whether `body` returns `Ok`, returns `Err`
    /// or panics; a panic is resumed after closing.
    pub async fn scoped<F, Fut, T>(mut self, body: F) -> Result<T>
    where
        F: FnOnce(Vec<Arc<dyn DbHandle>>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = AssertUnwindSafe(body(self.handles.clone()))
            .catch_unwind()
            .await;
        self.close_handles().await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

/// Connect the real driver for `library`
async fn connect(
    library: Library,
    database_url: &str,
    pool_size: u32,
) -> Result<Arc<dyn DbHandle>> {
    let handle: Arc<dyn DbHandle> = match library {
        Library::Sqlx => Arc::new(SqlxHandle::connect(database_url, pool_size).await?),
        Library::Deadpool => Arc::new(DeadpoolHandle::connect(database_url, pool_size).await?),
    };
    Ok(handle)
}

impl Drop for ConnectionSet {
    fn drop(&mut self) {
        if !self.closed && !self.handles.is_empty() {
            warn!(
                handles = self.handles.len(),
                "connection set dropped without close"
            );
        }
    }
}
