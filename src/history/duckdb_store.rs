use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::types::Type;
use duckdb::{Row, params};
use r2d2::Pool;
use tracing::{debug, info};

use super::{ExecutionRecord, HistoryStore, NewExecution};
use crate::db::DbError;
use crate::db::db_pool::DuckDBConnectionManager;
use crate::llm::models::ChartType;

const CREATE_TABLE: &str = "
    CREATE SEQUENCE IF NOT EXISTS query_history_id_seq START 1;
    CREATE TABLE IF NOT EXISTS query_history (
        id BIGINT PRIMARY KEY DEFAULT nextval('query_history_id_seq'),
        question VARCHAR,
        sql_query VARCHAR NOT NULL,
        explanation VARCHAR NOT NULL,
        chart_type VARCHAR NOT NULL,
        connection_id BIGINT NOT NULL,
        executed_at VARCHAR NOT NULL,
        is_successful BOOLEAN NOT NULL,
        error_message VARCHAR
    );
";

const SELECT_COLUMNS: &str = "id, question, sql_query, explanation, chart_type, connection_id, \
                              executed_at, is_successful, error_message";

/// History persisted in the application's own DuckDB file.
pub struct DuckDbHistoryStore {
    pool: Pool<DuckDBConnectionManager>,
}

impl DuckDbHistoryStore {
    /// Creates the history table if it does not exist yet.
    pub fn new(pool: Pool<DuckDBConnectionManager>) -> Result<Self, DbError> {
        let conn = pool.get()?;
        conn.execute_batch(CREATE_TABLE)?;
        info!("Query history table ready");
        Ok(Self { pool })
    }
}

// Fixed-width UTC text sorts in chronological order.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn record_from_row(row: &Row<'_>) -> duckdb::Result<ExecutionRecord> {
    let executed_at: String = row.get(6)?;
    let executed_at = DateTime::parse_from_rfc3339(&executed_at)
        .map_err(|e| duckdb::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?
        .with_timezone(&Utc);
    let chart_type: String = row.get(4)?;

    Ok(ExecutionRecord {
        id: row.get(0)?,
        question: row.get(1)?,
        sql_query: row.get(2)?,
        explanation: row.get(3)?,
        chart_type: ChartType::parse_lenient(&chart_type),
        connection_id: row.get(5)?,
        executed_at,
        is_successful: row.get(7)?,
        error_message: row.get(8)?,
    })
}

#[async_trait]
impl HistoryStore for DuckDbHistoryStore {
    async fn append(&self, entry: NewExecution) -> Result<ExecutionRecord, DbError> {
        let pool = self.pool.clone();
        let record = tokio::task::spawn_blocking(move || -> Result<ExecutionRecord, DbError> {
            let conn = pool.get()?;
            let id: i64 = conn.query_row("SELECT nextval('query_history_id_seq')", [], |row| row.get(0))?;
            let executed_at = Utc::now();

            conn.execute(
                "INSERT INTO query_history (id, question, sql_query, explanation, chart_type, \
                 connection_id, executed_at, is_successful, error_message) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    id,
                    entry.question,
                    entry.sql_query,
                    entry.explanation,
                    entry.chart_type.to_string(),
                    entry.connection_id,
                    format_timestamp(&executed_at),
                    entry.is_successful,
                    entry.error_message,
                ],
            )?;

            Ok(ExecutionRecord {
                id,
                question: entry.question,
                sql_query: entry.sql_query,
                explanation: entry.explanation,
                chart_type: entry.chart_type,
                connection_id: entry.connection_id,
                executed_at,
                is_successful: entry.is_successful,
                error_message: entry.error_message,
            })
        })
        .await??;

        debug!("Recorded history entry {}", record.id);
        Ok(record)
    }

    async fn list(&self, limit: usize) -> Result<Vec<ExecutionRecord>, DbError> {
        let pool = self.pool.clone();
        let records = tokio::task::spawn_blocking(move || -> Result<Vec<ExecutionRecord>, DbError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM query_history ORDER BY executed_at DESC, id DESC LIMIT ?",
                SELECT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![limit as i64], record_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await??;
        Ok(records)
    }

    async fn clear_all(&self) -> Result<usize, DbError> {
        let pool = self.pool.clone();
        let removed = tokio::task::spawn_blocking(move || -> Result<usize, DbError> {
            let conn = pool.get()?;
            Ok(conn.execute("DELETE FROM query_history", [])?)
        })
        .await??;
        info!("Cleared {} history entries", removed);
        Ok(removed)
    }
}
