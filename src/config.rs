use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::sql::DialectTag;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// DuckDB file holding the application's own tables: history and connections.
    pub connection_string: String,
    pub pool_size: usize,
    pub query_timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "anthropic", "remote", or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SchemaCacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationConfig {
    /// Also reject stacked statements and SQL comments.
    pub strict: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SecurityConfig {
    /// Secret that seals stored connection strings. Changing it makes
    /// previously stored connections unreadable.
    pub encryption_key: Option<String>,
}

/// A target database declared in the configuration file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub id: i64,
    pub name: String,
    pub dialect: DialectTag,
    pub connection_string: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub schema_cache: SchemaCacheConfig,
    pub validation: ValidationConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub connections: Vec<ConnectionSettings>,
}

#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// DuckDB file for application state
    #[arg(long)]
    pub database: Option<String>,

    /// LLM backend: anthropic, remote or ollama
    #[arg(long)]
    pub llm_backend: Option<String>,

    /// Model name passed to the LLM backend
    #[arg(long)]
    pub llm_model: Option<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Built-in defaults are the lowest layer
        let mut config_builder =
            Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = [
                "config.toml",
                "config/config.toml",
                "/etc/nl2sql-gate/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // NL2SQL__LLM__API_KEY=... style overrides
        config_builder = config_builder.add_source(
            Environment::with_prefix("NL2SQL")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;
        config.apply_cli(args);
        Ok(config)
    }

    fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(host) = &args.host {
            self.web.host = host.clone();
        }
        if let Some(port) = args.port {
            self.web.port = port;
        }
        if let Some(database) = &args.database {
            self.database.connection_string = database.clone();
        }
        if let Some(backend) = &args.llm_backend {
            self.llm.backend = backend.clone();
        }
        if let Some(model) = &args.llm_model {
            self.llm.model = model.clone();
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                connection_string: "nl2sql-gate.db".to_string(),
                pool_size: 5,
                query_timeout_secs: 30,
            },
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            llm: LlmConfig {
                backend: "anthropic".to_string(),
                model: "claude-3-5-sonnet-latest".to_string(),
                api_key: None,
                api_url: None,
                max_tokens: 2000,
                temperature: 0.0,
                timeout_secs: 60,
            },
            schema_cache: SchemaCacheConfig { ttl_secs: 3600 },
            validation: ValidationConfig { strict: true },
            security: SecurityConfig::default(),
            connections: Vec::new(),
        }
    }
}
