pub mod duckdb_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::DbError;
use crate::llm::models::ChartType;

/// Default number of entries returned by a history listing.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Fields supplied by the caller when recording an attempt.
#[derive(Debug, Clone)]
pub struct NewExecution {
    /// `None` for statements submitted directly rather than generated.
    pub question: Option<String>,
    pub sql_query: String,
    pub explanation: String,
    pub chart_type: ChartType,
    pub connection_id: i64,
    pub is_successful: bool,
    pub error_message: Option<String>,
}

/// One stored generation or execution attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: i64,
    pub question: Option<String>,
    pub sql_query: String,
    pub explanation: String,
    pub chart_type: ChartType,
    pub connection_id: i64,
    pub executed_at: DateTime<Utc>,
    pub is_successful: bool,
    pub error_message: Option<String>,
}

/// Append-only log of attempts. Entries are never edited; the only
/// removal is a bulk clear.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: NewExecution) -> Result<ExecutionRecord, DbError>;

    /// Most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<ExecutionRecord>, DbError>;

    /// Returns the number of removed entries.
    async fn clear_all(&self) -> Result<usize, DbError>;
}
