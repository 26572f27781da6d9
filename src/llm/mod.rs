pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    /// The upstream API answered with a non-success status.
    #[error("LLM API responded with status {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
    #[error("Prompt template error: {0}")]
    Prompt(#[from] minijinja::Error),
}

/// A language model endpoint: one system prompt plus one user turn in,
/// raw completion text out. Implementations own their timeout.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn send(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError>;

    fn name(&self) -> &str;
}

pub struct LlmManager;

impl LlmManager {
    pub fn from_config(config: &LlmConfig) -> Result<Arc<dyn CompletionProvider>, LlmError> {
        let provider: Arc<dyn CompletionProvider> = match config.backend.as_str() {
            "anthropic" => Arc::new(providers::anthropic::AnthropicProvider::new(config)?),
            "remote" => Arc::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Arc::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )));
            }
        };

        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn config(backend: &str) -> LlmConfig {
        LlmConfig {
            backend: backend.to_string(),
            ..AppConfig::default().llm
        }
    }

    #[test]
    fn rejects_unknown_backend() {
        let err = LlmManager::from_config(&config("local")).err().unwrap();
        assert!(matches!(err, LlmError::ConfigError(msg) if msg.contains("local")));
    }

    #[test]
    fn remote_backend_needs_url_and_key() {
        assert!(matches!(
            LlmManager::from_config(&config("remote")).err(),
            Some(LlmError::ConfigError(_))
        ));

        let mut remote = config("remote");
        remote.api_url = Some("http://localhost:8000/v1/chat/completions".into());
        remote.api_key = Some("secret".into());
        assert_eq!(LlmManager::from_config(&remote).unwrap().name(), "remote");
    }

    #[test]
    fn ollama_backend_needs_no_key() {
        let provider = LlmManager::from_config(&config("ollama")).unwrap();
        assert_eq!(provider.name(), "ollama");
    }
}
