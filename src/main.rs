use clap::Parser;
use r2d2::Pool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;
mod db;
mod error;
mod history;
mod llm;
mod schema;
mod service;
mod sql;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::db::cipher::{ConnectionCipher, DEVELOPMENT_KEY};
use crate::db::connections::ConnectionRegistry;
use crate::db::db_pool::DuckDBConnectionManager;
use crate::db::schema_manager::SchemaManager;
use crate::history::duckdb_store::DuckDbHistoryStore;
use crate::llm::LlmManager;
use crate::llm::orchestrator::Orchestrator;
use crate::schema::cache::MemorySchemaCache;
use crate::service::QueryService;
use crate::sql::validator::SqlValidator;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = CliArgs::parse();

    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!("Opening application database {}", config.database.connection_string);
    let db_manager = DuckDBConnectionManager::open(&config.database.connection_string)?;
    let pool = Pool::builder()
        .max_size(config.database.pool_size as u32)
        .build(db_manager)?;
    let history = Arc::new(DuckDbHistoryStore::new(pool.clone())?);

    let secret = match &config.security.encryption_key {
        Some(key) => key.clone(),
        None => {
            warn!("security.encryption_key is not set; stored connection strings use the development key");
            DEVELOPMENT_KEY.to_string()
        }
    };
    let registry = Arc::new(ConnectionRegistry::new(pool, Arc::new(ConnectionCipher::new(&secret)))?);
    registry.seed(&config.connections)?;

    info!("Initializing LLM provider with backend: {}", config.llm.backend);
    let provider = LlmManager::from_config(&config.llm)?;

    let validator = Arc::new(SqlValidator::from_config(config.validation.strict));
    info!("SQL validator running {} rules", validator.rules().len());
    let orchestrator = Arc::new(Orchestrator::new(provider, Arc::clone(&validator))?);

    let cache = Arc::new(MemorySchemaCache::new(Duration::from_secs(config.schema_cache.ttl_secs)));
    let schemas = Arc::new(SchemaManager::new(cache));

    let service = QueryService::new(
        registry,
        schemas,
        orchestrator,
        validator,
        history,
        Duration::from_secs(config.database.query_timeout_secs),
    );
    let app_state = Arc::new(AppState::new(service, config.llm.backend.clone()));

    info!("Starting nl2sql-gate on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
