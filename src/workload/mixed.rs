//! Insert-then-count workload against the fixture table

use async_trait::async_trait;

use super::Workload;
use crate::client::{DbHandle, SqlParam};
use crate::fixture::Fixture;
use crate::{BenchError, Result};

const ROW_NAME: &str = "John Doe";

/// Inserts one row, then reads `COUNT(*)` from the same table
#[derive(Debug, Clone)]
pub struct MixedWrite {
    fixture: Fixture,
    insert_sql: String,
    count_sql: String,
    params: Vec<SqlParam>,
}

impl MixedWrite {
    pub fn new(fixture: Fixture) -> Self {
        let insert_sql = format!("INSERT INTO {} (name) VALUES ($1)", fixture.table());
        let count_sql = format!("SELECT COUNT(*) FROM {}", fixture.table());
        Self {
            fixture,
            insert_sql,
            count_sql,
            params: vec![SqlParam::from(ROW_NAME)],
        }
    }

    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    pub fn count_sql(&self) -> &str {
        &self.count_sql
    }
}

#[async_trait]
impl Workload for MixedWrite {
    fn name(&self) -> &str {
        "mixed_write"
    }

    fn fixture(&self) -> Option<&Fixture> {
        Some(&self.fixture)
    }

    async fn run(&self, handle: &dyn DbHandle) -> Result<()> {
        let inserted = handle.execute(&self.insert_sql, &self.params).await?;
        if inserted != 1 {
            return Err(BenchError::QueryError(format!(
                "insert into {} affected {} rows",
                self.fixture.table(),
                inserted
            )));
        }

        // The row just written must be visible to the count.
        let count = handle.query_scalar(&self.count_sql, &[]).await?;
        if count < 1 {
            return Err(BenchError::QueryError(format!(
                "{} returned {} after insert",
                self.count_sql, count
            )));
        }
        Ok(())
    }
}
