//! deadpool-postgres adapter
//!
//! Checks a tokio-postgres client out of the pool per call and runs
//! statements through the client's prepared-statement cache.

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use super::{DbHandle, Library, SqlParam};
use crate::{BenchError, Result};

/// Handle backed by a deadpool-postgres pool
pub struct DeadpoolHandle {
    pool: Pool,
}

impl DeadpoolHandle {
    /// Build the pool and check out one connection to verify the target.
    ///
    /// deadpool creates connections lazily, so without the checkout a bad
    /// URL would only surface on the first measured query.
    pub async fn connect(database_url: &str, max_size: u32) -> Result<Self> {
        let mut cfg = Config::new();
        cfg.url = Some(database_url.to_string());
        cfg.pool = Some(PoolConfig::new(max_size as usize));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| BenchError::ConnectionError(format!("deadpool: {}", e)))?;

        match pool.get().await {
            Ok(client) => drop(client),
            Err(e) => {
                pool.close();
                return Err(BenchError::ConnectionError(format!("deadpool: {}", e)));
            }
        }

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn client(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| BenchError::QueryError(format!("deadpool checkout: {}", e)))
    }
}

fn to_sql(param: &SqlParam) -> &(dyn ToSql + Sync) {
    match param {
        SqlParam::Text(s) => s,
        SqlParam::Int(i) => i,
        SqlParam::Float(f) => f,
        SqlParam::Bool(b) => b,
    }
}

fn first_column_i64(row: &Row) -> Result<i64> {
    match row.try_get::<_, i64>(0) {
        Ok(value) => Ok(value),
        Err(_) => row
            .try_get::<_, i32>(0)
            .map(i64::from)
            .map_err(|e| BenchError::QueryError(format!("tokio-postgres: {}", e))),
    }
}

fn query_error(e: tokio_postgres::Error) -> BenchError {
    BenchError::QueryError(format!("tokio-postgres: {}", e))
}

#[async_trait]
impl DbHandle for DeadpoolHandle {
    fn library(&self) -> Library {
        Library::Deadpool
    }

    async fn execute(&self, statement: &str, params: &[SqlParam]) -> Result<u64> {
        let client = self.client().await?;
        let stmt = client.prepare_cached(statement).await.map_err(query_error)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(to_sql).collect();
        client.execute(&stmt, &refs).await.map_err(query_error)
    }

    async fn query_scalar(&self, statement: &str, params: &[SqlParam]) -> Result<i64> {
        let client = self.client().await?;
        let stmt = client.prepare_cached(statement).await.map_err(query_error)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(to_sql).collect();
        let row = client.query_one(&stmt, &refs).await.map_err(query_error)?;
        first_column_i64(&row)
    }

    async fn close(&self) {
        self.pool.close();
    }
}
