//! Fixture lifecycle
//!
//! Creates the table the mixed write workload needs before a case and
//! drops it afterwards, on every exit path.

use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, warn};

use crate::client::DbHandle;
use crate::config::validate_identifier;
use crate::{BenchError, Result};

/// Benchmark table owned by a workload
#[derive(Debug, Clone, PartialEq)]
pub struct Fixture {
    table: String,
}

impl Fixture {
    /// Create a fixture for `table`, which must be a plain identifier
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn create_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\
             id SERIAL PRIMARY KEY, \
             name TEXT, \
             created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
            self.table
        )
    }

    pub fn drop_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.table)
    }

    /// Create the table. Safe to call when it already exists.
    pub async fn setup(&self, handle: &dyn DbHandle) -> Result<()> {
        debug!(table = %self.table, library = %handle.library(), "fixture setup");
        handle
            .execute(&self.create_sql(), &[])
            .await
            .map(|_| ())
            .map_err(|e| BenchError::SchemaError(format!("create {}: {}", self.table, e)))
    }

    /// Drop the table if it exists
    pub async fn teardown(&self, handle: &dyn DbHandle) -> Result<()> {
        debug!(table = %self.table, library = %handle.library(), "fixture teardown");
        handle
            .execute(&self.drop_sql(), &[])
            .await
            .map(|_| ())
            .map_err(|e| BenchError::SchemaError(format!("drop {}: {}", self.table, e)))
    }

    /// Run `body` between setup and teardown.
    ///
    /// Teardown runs whenever setup succeeded, including when `body`
    /// fails or panics. A body error takes precedence over a teardown
    /// error; a panic is resumed after teardown.
    pub async fn scoped<F, Fut, T>(&self, handle: &dyn DbHandle, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.setup(handle).await?;

        let outcome = AssertUnwindSafe(body()).catch_unwind().await;
        let teardown = self.teardown(handle).await;

        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                if let Err(err) = &teardown {
                    warn!(error = %err, "teardown failed after panic");
                }
                std::panic::resume_unwind(panic)
            }
        };

        match (result, teardown) {
            (Err(err), Err(teardown_err)) => {
                warn!(error = %teardown_err, "teardown failed after workload error");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(_), Err(teardown_err)) => Err(teardown_err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}
