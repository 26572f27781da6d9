pub mod anthropic;
pub mod ollama;
pub mod remote;

use crate::llm::LlmError;

/// Converts a non-success HTTP response into [`LlmError::Upstream`].
pub(crate) async fn upstream_error(provider: &str, response: reqwest::Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::error!("{} API responded with status code: {} - {}", provider, status, body);
    LlmError::Upstream {
        status: status.as_u16(),
        body,
    }
}
