use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use crate::db::ConnectionConfig;
use crate::db::connections::{ConnectionDraft, redact_connection_string};
use crate::error::AppError;
use crate::web::state::AppState;

// Passwords never leave the server
fn redacted(mut config: ConnectionConfig) -> ConnectionConfig {
    config.connection_string = redact_connection_string(&config.connection_string);
    config
}

pub async fn list_connections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ConnectionConfig>>, AppError> {
    let configs = state.service.connections().await?;
    Ok(Json(configs.into_iter().map(redacted).collect()))
}

pub async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ConnectionConfig>, AppError> {
    Ok(Json(redacted(state.service.connection(id).await?)))
}

pub async fn create_connection(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<ConnectionDraft>,
) -> Result<(StatusCode, Json<ConnectionConfig>), AppError> {
    let created = state.service.create_connection(draft).await?;
    Ok((StatusCode::CREATED, Json(redacted(created))))
}

pub async fn update_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(draft): Json<ConnectionDraft>,
) -> Result<Json<ConnectionConfig>, AppError> {
    Ok(Json(redacted(state.service.update_connection(id, draft).await?)))
}

pub async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.service.delete_connection(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
