//! Configuration management for HireLens services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Queue configuration (SQS)
    pub queue: QueueConfig,

    /// LLM backend configuration
    pub llm: LlmConfig,

    /// Retrieval index configuration
    pub retrieval: RetrievalConfig,

    /// Worker pool configuration
    pub worker: WorkerConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-operation statement timeout in seconds
    #[serde(default = "default_statement_timeout")]
    pub statement_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// SQS evaluation queue URL (unset = in-memory queue)
    pub evaluation_queue_url: Option<String>,

    /// Long polling timeout in seconds
    #[serde(default = "default_queue_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Visibility timeout in seconds
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// API key for the LLM backend
    pub api_key: Option<String>,

    /// Provider override: auto, openai, openrouter
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API base URL (for custom endpoints)
    pub base_url: Option<String>,

    /// Default chat model (unset = provider default)
    pub default_model: Option<String>,

    /// Model used for evaluation stages (unset = default_model)
    pub evaluation_model: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token limit
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Chat request timeout in seconds
    #[serde(default = "default_chat_timeout")]
    pub chat_timeout_secs: u64,

    /// Embeddings request timeout in seconds
    #[serde(default = "default_embed_timeout")]
    pub embed_timeout_secs: u64,

    /// Maximum attempts per outbound call
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// Base retry delay in milliseconds (doubles per attempt)
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// HTTP-Referer header (OpenRouter only)
    pub referer: Option<String>,

    /// X-Title application name header (OpenRouter only)
    pub app_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Target chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Chunks shorter than this are discarded
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// Per-query timeout in seconds
    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,

    /// Default maximum results per search
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Default similarity threshold
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Number of concurrent evaluation workers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Consecutive failures before the polling loop pauses
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Pause duration when the failure threshold is hit, in seconds
    #[serde(default = "default_circuit_break_secs")]
    pub circuit_break_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_statement_timeout() -> u64 {
    5
}
fn default_queue_poll_timeout() -> u64 {
    20
}
fn default_visibility_timeout() -> u64 {
    300
}
fn default_llm_provider() -> String {
    "auto".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_chat_timeout() -> u64 {
    60
}
fn default_embed_timeout() -> u64 {
    30
}
fn default_llm_retries() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    1000
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_min_chunk_size() -> usize {
    50
}
fn default_retrieval_timeout() -> u64 {
    10
}
fn default_max_results() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    0.3
}
fn default_pool_size() -> usize {
    4
}
fn default_max_consecutive_failures() -> u32 {
    5
}
fn default_circuit_break_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_service_name() -> String {
    "hirelens".to_string()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl LlmConfig {
    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs)
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/hirelens".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                statement_timeout_secs: default_statement_timeout(),
            },
            queue: QueueConfig {
                evaluation_queue_url: None,
                poll_timeout_secs: default_queue_poll_timeout(),
                visibility_timeout_secs: default_visibility_timeout(),
            },
            llm: LlmConfig {
                api_key: None,
                provider: default_llm_provider(),
                base_url: None,
                default_model: None,
                evaluation_model: None,
                temperature: default_temperature(),
                max_tokens: default_max_tokens(),
                chat_timeout_secs: default_chat_timeout(),
                embed_timeout_secs: default_embed_timeout(),
                max_retries: default_llm_retries(),
                retry_base_ms: default_retry_base_ms(),
                referer: None,
                app_name: None,
            },
            retrieval: RetrievalConfig {
                chunk_size: default_chunk_size(),
                chunk_overlap: default_chunk_overlap(),
                min_chunk_size: default_min_chunk_size(),
                timeout_secs: default_retrieval_timeout(),
                max_results: default_max_results(),
                similarity_threshold: default_similarity_threshold(),
            },
            worker: WorkerConfig {
                pool_size: default_pool_size(),
                max_consecutive_failures: default_max_consecutive_failures(),
                circuit_break_secs: default_circuit_break_secs(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                service_name: default_service_name(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.llm.temperature, 0.3);
        assert_eq!(config.llm.max_tokens, 2000);
        assert_eq!(config.llm.chat_timeout_secs, 60);
        assert_eq!(config.llm.embed_timeout_secs, 30);
        assert_eq!(config.retrieval.timeout_secs, 10);
        assert_eq!(config.database.statement_timeout_secs, 5);
    }

    #[test]
    fn test_chunking_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.retrieval.chunk_size, 1000);
        assert_eq!(config.retrieval.chunk_overlap, 200);
        assert_eq!(config.retrieval.min_chunk_size, 50);
    }

    #[test]
    fn test_worker_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.worker.pool_size, 4);
        assert_eq!(config.llm.max_retries, 3);
    }
}
