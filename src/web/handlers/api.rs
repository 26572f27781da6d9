use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::db::QueryResult;
use crate::error::AppError;
use crate::history::{DEFAULT_HISTORY_LIMIT, ExecutionRecord};
use crate::schema::SchemaSnapshot;
use crate::service::GenerateOutcome;
use crate::sql::DialectTag;
use crate::sql::validator::ValidationOutcome;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub natural_language_query: String,
    pub database_config_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    pub sql_query: String,
    pub database_config_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    pub sql_query: String,
    /// Defaults to SQL Server when omitted.
    pub dialect: Option<DialectTag>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedHistory {
    pub removed: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub llm_backend: String,
    pub connection_count: usize,
}

pub async fn generate_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<GenerateOutcome>, AppError> {
    info!(
        "Generating SQL for connection {}: {}",
        payload.database_config_id, payload.natural_language_query
    );
    let outcome = state
        .service
        .generate(&payload.natural_language_query, payload.database_config_id)
        .await?;
    Ok(Json(outcome))
}

pub async fn execute_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<QueryResult>, AppError> {
    let result = state
        .service
        .execute(&payload.sql_query, payload.database_config_id)
        .await?;
    Ok(Json(result))
}

pub async fn validate_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ValidateRequest>,
) -> Json<ValidationOutcome> {
    let dialect = payload.dialect.unwrap_or(DialectTag::SqlServer);
    Json(state.service.validate(&payload.sql_query, dialect))
}

// The body is the bare connection id
pub async fn suggest_questions(
    State(state): State<Arc<AppState>>,
    Json(config_id): Json<i64>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(state.service.suggest(config_id).await?))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<ExecutionRecord>>, AppError> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(state.service.history(limit).await?))
}

pub async fn clear_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearedHistory>, AppError> {
    let removed = state.service.clear_history().await?;
    Ok(Json(ClearedHistory { removed }))
}

pub async fn get_schema(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<i64>,
) -> Result<Json<SchemaSnapshot>, AppError> {
    let schema = state.service.schema(config_id).await?;
    Ok(Json(schema.as_ref().clone()))
}

pub async fn refresh_schema(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<i64>,
) -> Result<Json<SchemaSnapshot>, AppError> {
    let schema = state.service.refresh_schema(config_id).await?;
    Ok(Json(schema.as_ref().clone()))
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Result<Json<SystemStatus>, AppError> {
    let uptime = chrono::Utc::now() - state.startup_time;
    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime.num_seconds(),
        llm_backend: state.llm_backend.clone(),
        connection_count: state.service.connections().await?.len(),
    }))
}
