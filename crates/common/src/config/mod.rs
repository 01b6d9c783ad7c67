//! Configuration management for ClauseTrace services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml)
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

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Answer generator configuration
    pub generator: GeneratorConfig,

    /// Chunking configuration
    pub chunking: ChunkingConfig,

    /// Retrieval configuration
    pub retrieval: RetrievalConfig,

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

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// API key for the embedding provider
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    /// API key for the generation provider
    pub api_key: Option<String>,

    /// Chat completions endpoint
    #[serde(default = "default_generator_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_generator_model")]
    pub model: String,

    /// Maximum output tokens
    #[serde(default = "default_generator_max_tokens")]
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(default = "default_generator_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

/// Legal chunker configuration (token counts are whitespace words)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens
    #[serde(default = "default_chunk_tokens")]
    pub target_tokens: usize,

    /// Trailing tokens of the previous chunk repeated as overlap
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_chunk_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

/// Score fusion weights between retrieval signals
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct FusionWeights {
    /// Weight of the semantic (vector) signal
    #[serde(default = "default_fusion_weight")]
    pub semantic: f32,

    /// Weight of the keyword signal
    #[serde(default = "default_fusion_weight")]
    pub keyword: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: default_fusion_weight(),
            keyword: default_fusion_weight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Top-K fetched from each signal in Round 1
    #[serde(default = "default_signal_top_k")]
    pub signal_top_k: usize,

    /// Working set size after fusion
    #[serde(default = "default_working_set")]
    pub working_set_size: usize,

    /// Fusion weights between semantic and keyword scores
    #[serde(default)]
    pub fusion: FusionWeights,

    /// Per-signal timeout in Round 1, seconds
    #[serde(default = "default_signal_timeout")]
    pub signal_timeout_secs: u64,

    /// Total retrieval deadline, seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Total token budget for the assembled bundle
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            signal_top_k: default_signal_top_k(),
            working_set_size: default_working_set(),
            fusion: FusionWeights::default(),
            signal_timeout_secs: default_signal_timeout(),
            query_timeout_secs: default_query_timeout(),
            token_budget: default_token_budget(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

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
fn default_request_timeout() -> u64 {
    30
}
fn default_shutdown_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    50
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    300
}
fn default_embedding_model() -> String {
    crate::DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_embedding_dimension() -> usize {
    crate::DEFAULT_EMBEDDING_DIMENSION
}
fn default_embedding_timeout() -> u64 {
    30
}
fn default_embedding_retries() -> u32 {
    3
}
fn default_embedding_batch_size() -> usize {
    32
}
fn default_generator_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_generator_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_generator_max_tokens() -> usize {
    1000
}
fn default_generator_temperature() -> f32 {
    0.1
}
fn default_generator_timeout() -> u64 {
    30
}
fn default_chunk_tokens() -> usize {
    400
}
fn default_overlap_tokens() -> usize {
    60
}
fn default_fusion_weight() -> f32 {
    0.5
}
fn default_signal_top_k() -> usize {
    20
}
fn default_working_set() -> usize {
    12
}
fn default_signal_timeout() -> u64 {
    3
}
fn default_query_timeout() -> u64 {
    15
}
fn default_token_budget() -> usize {
    6000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_json_logging() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_service_name() -> String {
    "clausetrace".to_string()
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
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

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database
            .read_url
            .as_deref()
            .unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/clausetrace".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig {
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
                batch_size: default_embedding_batch_size(),
            },
            generator: GeneratorConfig {
                api_key: None,
                endpoint: default_generator_endpoint(),
                model: default_generator_model(),
                max_tokens: default_generator_max_tokens(),
                temperature: default_generator_temperature(),
                timeout_secs: default_generator_timeout(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
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
        assert_eq!(config.chunking.target_tokens, 400);
        assert_eq!(config.retrieval.fusion.semantic, 0.5);
        assert_eq!(config.retrieval.fusion.keyword, 0.5);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/clausetrace");
    }
}
