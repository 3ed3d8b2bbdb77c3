//! Read-only workloads

use std::time::Duration;

use async_trait::async_trait;

use super::Workload;
use crate::client::DbHandle;
use crate::{BenchError, Result};

/// `SELECT 1`: raw round-trip cost with no server work
#[derive(Debug, Clone, Default)]
pub struct PointRead;

impl PointRead {
    pub const STATEMENT: &'static str = "SELECT 1";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Workload for PointRead {
    fn name(&self) -> &str {
        "point_read"
    }

    async fn run(&self, handle: &dyn DbHandle) -> Result<()> {
        let value = handle.query_scalar(Self::STATEMENT, &[]).await?;
        if value != 1 {
            return Err(BenchError::QueryError(format!(
                "{} returned {}",
                Self::STATEMENT,
                value
            )));
        }
        Ok(())
    }
}

/// `SELECT pg_sleep(t)`: a fixed server-side delay per call.
///
/// With the delay dominating each call, throughput across concurrency
/// levels shows how well a client overlaps in-flight queries.
#[derive(Debug, Clone)]
pub struct LatencyRead {
    delay: Duration,
    statement: String,
}

impl LatencyRead {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            statement: format!("SELECT pg_sleep({})", delay.as_secs_f64()),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }
}

#[async_trait]
impl Workload for LatencyRead {
    fn name(&self) -> &str {
        "latency_read"
    }

    async fn run(&self, handle: &dyn DbHandle) -> Result<()> {
        handle.execute(&self.statement, &[]).await.map(|_| ())
    }
}
