use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use super::handlers::{api, connections};
use super::state::AppState;

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Query pipeline
            .route("/query/generate", post(api::generate_query))
            .route("/query/execute", post(api::execute_query))
            .route("/query/validate", post(api::validate_query))
            .route("/query/suggest", post(api::suggest_questions))
            .route("/query/history", get(api::get_history).delete(api::clear_history))
            // Schema
            .route("/schema/{config_id}", get(api::get_schema))
            .route("/schema/{config_id}/refresh", post(api::refresh_schema))
            // Target databases
            .route(
                "/connections",
                get(connections::list_connections).post(connections::create_connection),
            )
            .route(
                "/connections/{id}",
                get(connections::get_connection)
                    .put(connections::update_connection)
                    .delete(connections::delete_connection),
            )
            // System status
            .route("/status", get(api::system_status)),
    )
}
