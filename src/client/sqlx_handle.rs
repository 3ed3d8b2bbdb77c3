//! sqlx adapter
//!
//! Drives a `PgPool` through sqlx's generic query API, reading single-row
//! results through a `FromRow` mapping.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::{Arguments, FromRow, Row};

use super::{DbHandle, Library, SqlParam};
use crate::{BenchError, Result};

/// Handle backed by a sqlx connection pool
pub struct SqlxHandle {
    pool: PgPool,
}

/// First column of a row, widened to `i64`
struct Scalar(i64);

impl<'r> FromRow<'r, PgRow> for Scalar {
    fn from_row(row: &'r PgRow) -> std::result::Result<Self, sqlx::Error> {
        match row.try_get::<i64, _>(0) {
            Ok(value) => Ok(Scalar(value)),
            Err(_) => row.try_get::<i32, _>(0).map(|v| Scalar(i64::from(v))),
        }
    }
}

impl SqlxHandle {
    /// Connect eagerly so an unreachable server fails here, not mid-case
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| BenchError::ConnectionError(format!("sqlx: {}", e)))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn arguments(params: &[SqlParam]) -> Result<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        let added = match param {
            SqlParam::Text(s) => args.add(s.clone()),
            SqlParam::Int(i) => args.add(*i),
            SqlParam::Float(f) => args.add(*f),
            SqlParam::Bool(b) => args.add(*b),
        };
        added.map_err(|e| BenchError::QueryError(format!("sqlx bind: {}", e)))?;
    }
    Ok(args)
}

#[async_trait]
impl DbHandle for SqlxHandle {
    fn library(&self) -> Library {
        Library::Sqlx
    }

    async fn execute(&self, statement: &str, params: &[SqlParam]) -> Result<u64> {
        let args = arguments(params)?;
        let done = sqlx::query_with(statement, args)
            .execute(&self.pool)
            .await
            .map_err(|e| BenchError::QueryError(format!("sqlx: {}", e)))?;
        Ok(done.rows_affected())
    }

    async fn query_scalar(&self, statement: &str, params: &[SqlParam]) -> Result<i64> {
        let args = arguments(params)?;
        let Scalar(value) = sqlx::query_as_with::<_, Scalar, _>(statement, args)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BenchError::QueryError(format!("sqlx: {}", e)))?;
        Ok(value)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
