pub mod cipher;
pub mod connections;
pub mod db_pool;
pub mod duckdb_source;
pub mod mysql;
pub mod postgres;
pub mod schema_manager;
pub mod sqlserver;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::schema::SchemaSnapshot;
use crate::sql::DialectTag;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("Database driver error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),
    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("Arrow conversion error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("Row serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database configuration {0} not found")]
    NotFound(i64),
    #[error("Invalid database configuration: {0}")]
    InvalidConfig(String),
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection secret error: {0}")]
    Secret(String),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Rows of an executed query. Column order is preserved in every row map.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

/// A registered target database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub id: i64,
    pub name: String,
    pub dialect: DialectTag,
    pub connection_string: String,
    pub created_at: DateTime<Utc>,
}

/// A live database the service can introspect and query.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn introspect(&self) -> Result<SchemaSnapshot, DbError>;

    /// Runs one already-validated statement. The backend stops the statement
    /// once `timeout` has elapsed.
    async fn execute(&self, sql: &str, timeout: Duration) -> Result<QueryResult, DbError>;
}

/// Resolves `work` or fails with [`DbError::Timeout`] once `timeout` elapses.
pub(crate) async fn within<T>(
    timeout: Duration,
    work: impl Future<Output = Result<T, DbError>>,
) -> Result<T, DbError> {
    tokio::time::timeout(timeout, work)
        .await
        .map_err(|_| DbError::Timeout(timeout))?
}

/// Opens the backend matching the connection's dialect.
pub fn open_source(config: &ConnectionConfig) -> Result<Box<dyn DataSource>, DbError> {
    let target = config.connection_string.clone();
    Ok(match config.dialect {
        DialectTag::DuckDb => Box::new(duckdb_source::DuckDbSource::new(target)),
        DialectTag::PostgreSql => Box::new(postgres::PostgresSource::new(target)),
        DialectTag::MySql => Box::new(mysql::MySqlSource::new(target)),
        DialectTag::SqlServer => Box::new(sqlserver::SqlServerSource::new(&target)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dialect: DialectTag, target: &str) -> ConnectionConfig {
        ConnectionConfig {
            id: 1,
            name: "target".into(),
            dialect,
            connection_string: target.into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn every_dialect_has_a_live_backend() {
        for dialect in [DialectTag::DuckDb, DialectTag::PostgreSql, DialectTag::MySql] {
            assert!(open_source(&config(dialect, ":memory:")).is_ok());
        }
        let sqlserver = config(
            DialectTag::SqlServer,
            "Server=tcp:localhost,1433;Database=sales;User Id=reader;Password=secret;TrustServerCertificate=true",
        );
        assert!(open_source(&sqlserver).is_ok());
    }

    #[tokio::test]
    async fn within_reports_the_elapsed_budget() {
        let budget = Duration::from_millis(20);
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DbError>(())
        };
        assert!(matches!(within(budget, slow).await, Err(DbError::Timeout(d)) if d == budget));
        assert_eq!(within(budget, async { Ok::<_, DbError>(7) }).await.unwrap(), 7);
    }
}
