use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::connections::{ConnectionDraft, ConnectionRegistry};
use crate::db::schema_manager::SchemaManager;
use crate::db::{ConnectionConfig, DbError, QueryResult, open_source};
use crate::error::AppError;
use crate::history::{ExecutionRecord, HistoryStore, NewExecution};
use crate::llm::models::{ChartType, ERROR_SENTINEL, GenerationRequest, GenerationResult};
use crate::llm::orchestrator::Orchestrator;
use crate::schema::SchemaSnapshot;
use crate::sql::DialectTag;
use crate::sql::validator::{SqlValidator, ValidationOutcome};

/// Entry point for every query operation exposed over HTTP.
pub struct QueryService {
    registry: Arc<ConnectionRegistry>,
    schemas: Arc<SchemaManager>,
    orchestrator: Arc<Orchestrator>,
    validator: Arc<SqlValidator>,
    history: Arc<dyn HistoryStore>,
    query_timeout: Duration,
}

/// A generated query plus the id of its history entry.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOutcome {
    #[serde(flatten)]
    pub result: GenerationResult,
    pub is_successful: bool,
    pub history_id: Option<i64>,
}

fn schema_error(err: DbError) -> AppError {
    match err {
        DbError::NotFound(_) => AppError::from(err),
        other => AppError::SchemaUnavailable(other.to_string()),
    }
}

impl QueryService {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        schemas: Arc<SchemaManager>,
        orchestrator: Arc<Orchestrator>,
        validator: Arc<SqlValidator>,
        history: Arc<dyn HistoryStore>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            schemas,
            orchestrator,
            validator,
            history,
            query_timeout,
        }
    }

    // History is best effort: a failed write never fails the request.
    async fn record(&self, entry: NewExecution) -> Option<i64> {
        match self.history.append(entry).await {
            Ok(record) => Some(record.id),
            Err(e) => {
                error!("Failed to record query history: {}", e);
                None
            }
        }
    }

    async fn record_failure(&self, question: Option<&str>, sql: &str, connection_id: i64, message: String) {
        self.record(NewExecution {
            question: question.map(str::to_string),
            sql_query: sql.to_string(),
            explanation: String::new(),
            chart_type: ChartType::Table,
            connection_id,
            is_successful: false,
            error_message: Some(message),
        })
        .await;
    }

    pub async fn generate(&self, question: &str, config_id: i64) -> Result<GenerateOutcome, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::BadRequest("naturalLanguageQuery cannot be empty".into()));
        }

        let config = self.registry.get(config_id).await?;
        let schema = match self.schemas.get_schema(&config).await {
            Ok(schema) => schema,
            Err(e) => {
                let err = schema_error(e);
                self.record_failure(Some(question), ERROR_SENTINEL, config_id, err.to_string())
                    .await;
                return Err(err);
            }
        };

        let request = GenerationRequest {
            question: question.to_string(),
            schema,
            dialect: config.dialect,
        };

        let report = match self.orchestrator.generate(&request).await {
            Ok(report) => report,
            Err(e) => {
                error!("Generation failed for connection {}: {}", config_id, e);
                self.record_failure(Some(question), ERROR_SENTINEL, config_id, e.to_string())
                    .await;
                return Err(e.into());
            }
        };

        let is_successful = report.is_successful();
        let error_message = report.validation_error.clone().or_else(|| {
            report
                .result
                .is_failure()
                .then(|| report.result.explanation.clone())
        });

        let history_id = self
            .record(NewExecution {
                question: Some(question.to_string()),
                sql_query: report.result.sql_query.clone(),
                explanation: report.result.explanation.clone(),
                chart_type: report.result.visualization.chart_type,
                connection_id: config_id,
                is_successful,
                error_message,
            })
            .await;

        Ok(GenerateOutcome {
            result: report.result,
            is_successful,
            history_id,
        })
    }

    pub fn validate(&self, sql: &str, dialect: DialectTag) -> ValidationOutcome {
        self.validator.validate(sql, dialect)
    }

    /// Re-validates `sql` against the connection's dialect before running it.
    pub async fn execute(&self, sql: &str, config_id: i64) -> Result<QueryResult, AppError> {
        let config = self.registry.get(config_id).await?;

        let outcome = self.validator.validate(sql, config.dialect);
        if !outcome.is_valid {
            let reason = outcome.reason.unwrap_or_default();
            self.record_failure(None, sql, config_id, format!("Validation failed: {}", reason))
                .await;
            return Err(AppError::ValidationRejected(reason));
        }

        let outcome = self.run(&config, sql).await;
        let error_message = outcome.as_ref().err().map(|e| e.to_string());
        self.record(NewExecution {
            question: None,
            sql_query: sql.to_string(),
            explanation: String::new(),
            chart_type: ChartType::Table,
            connection_id: config_id,
            is_successful: outcome.is_ok(),
            error_message,
        })
        .await;

        let result = outcome?;
        info!(
            "Executed query on connection {}: {} rows in {} ms",
            config_id, result.row_count, result.execution_time_ms
        );
        Ok(result)
    }

    async fn run(&self, config: &ConnectionConfig, sql: &str) -> Result<QueryResult, DbError> {
        let source = open_source(config)?;
        let result = source.execute(sql, self.query_timeout).await;
        if let Err(DbError::Timeout(limit)) = &result {
            warn!("Query on connection {} stopped after {:?}", config.id, limit);
        }
        result
    }

    pub async fn suggest(&self, config_id: i64) -> Result<Vec<String>, AppError> {
        let config = self.registry.get(config_id).await?;
        let schema = self.schemas.get_schema(&config).await.map_err(schema_error)?;
        Ok(self
            .orchestrator
            .suggest_questions(&schema, config.dialect)
            .await?)
    }

    pub async fn schema(&self, config_id: i64) -> Result<Arc<SchemaSnapshot>, AppError> {
        let config = self.registry.get(config_id).await?;
        self.schemas.get_schema(&config).await.map_err(schema_error)
    }

    pub async fn refresh_schema(&self, config_id: i64) -> Result<Arc<SchemaSnapshot>, AppError> {
        let config = self.registry.get(config_id).await?;
        self.schemas.refresh(&config).await.map_err(schema_error)
    }

    pub async fn history(&self, limit: usize) -> Result<Vec<ExecutionRecord>, AppError> {
        Ok(self.history.list(limit).await?)
    }

    pub async fn clear_history(&self) -> Result<usize, AppError> {
        Ok(self.history.clear_all().await?)
    }

    pub async fn connections(&self) -> Result<Vec<ConnectionConfig>, AppError> {
        Ok(self.registry.list().await?)
    }

    pub async fn connection(&self, id: i64) -> Result<ConnectionConfig, AppError> {
        Ok(self.registry.get(id).await?)
    }

    pub async fn create_connection(&self, draft: ConnectionDraft) -> Result<ConnectionConfig, AppError> {
        Ok(self.registry.create(draft).await?)
    }

    pub async fn update_connection(
        &self,
        id: i64,
        draft: ConnectionDraft,
    ) -> Result<ConnectionConfig, AppError> {
        let updated = self.registry.update(id, draft).await?;
        self.schemas.invalidate(id).await;
        Ok(updated)
    }

    pub async fn delete_connection(&self, id: i64) -> Result<(), AppError> {
        self.registry.delete(id).await?;
        self.schemas.invalidate(id).await;
        Ok(())
    }
}
