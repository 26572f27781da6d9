use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

use crate::db::DbError;
use crate::llm::LlmError;

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum AppError {
    /// Carries the validator's reason verbatim.
    #[error("Validation failed: {0}")]
    ValidationRejected(String),

    #[error("Generation service responded with status {status}: {body}")]
    UpstreamGeneration { status: u16, body: String },

    #[error("Schema unavailable: {0}")]
    SchemaUnavailable(String),

    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationRejected(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamGeneration { .. } => StatusCode::BAD_GATEWAY,
            AppError::SchemaUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Execution(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LlmError> for AppError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Upstream { status, body } => AppError::UpstreamGeneration { status, body },
            LlmError::ConnectionError(msg) | LlmError::ResponseError(msg) => {
                AppError::UpstreamGeneration {
                    status: StatusCode::BAD_GATEWAY.as_u16(),
                    body: msg,
                }
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => AppError::NotFound(format!("Database configuration {} not found", id)),
            DbError::Timeout(limit) => AppError::Timeout(limit),
            DbError::InvalidConfig(msg) => AppError::BadRequest(msg),
            other => AppError::Execution(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let mut body = json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });
        if let AppError::UpstreamGeneration { status: upstream, body: detail } = &self {
            body["upstreamStatus"] = json!(upstream);
            body["upstreamBody"] = json!(detail);
        }

        (status, Json(body)).into_response()
    }
}
