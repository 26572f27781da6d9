use crate::service::QueryService;

/// Shared application state for the web server
pub struct AppState {
    pub service: QueryService,
    /// Name of the configured LLM backend, reported by `/api/status`.
    pub llm_backend: String,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(service: QueryService, llm_backend: impl Into<String>) -> Self {
        Self {
            service,
            llm_backend: llm_backend.into(),
            startup_time: chrono::Utc::now(),
        }
    }
}
