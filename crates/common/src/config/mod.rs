//! Configuration management for RecForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values
//!
//! Every pipeline tunable (weights, caps, timeouts, eligible statuses)
//! lives in [`PipelineConfig`] and is validated before use.

use crate::errors::{AppError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Redis configuration (cache and session store)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Rerank judge (chat completion) configuration
    #[serde(default)]
    pub judge: JudgeConfig,

    /// Tag resolution configuration
    #[serde(default)]
    pub tags: TagConfig,

    /// Recommendation pipeline tunables
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Session store configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL
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
pub struct RedisConfig {
    /// Redis URL; caching and Redis sessions are disabled when unset
    pub url: Option<String>,

    /// Default TTL in seconds
    #[serde(default = "default_redis_ttl")]
    pub default_ttl_secs: u64,

    /// Key prefix for namespacing
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// HTTP request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on transient failures
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Cache query embeddings in Redis
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeConfig {
    /// Use the LLM judge; the deterministic fusion scorer is used otherwise
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Chat completions endpoint
    #[serde(default = "default_judge_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_judge_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_judge_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TagConfig {
    /// Tags returned per kind (interest, skill)
    #[serde(default = "default_tags_per_kind")]
    pub per_kind_limit: usize,

    /// Minimum cosine similarity for a tag to match the query
    #[serde(default = "default_tag_min_similarity")]
    pub min_similarity: f32,
}

/// Fusion weights for the deterministic scorer
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct FusionWeights {
    #[serde(default = "default_weight_tag")]
    pub tag: f32,

    #[serde(default = "default_weight_semantic")]
    pub semantic: f32,

    #[serde(default = "default_weight_keyword")]
    pub keyword: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Number of ranked items returned
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Maximum candidates kept after merging
    #[serde(default = "default_pool_cap")]
    pub pool_cap: usize,

    /// Candidates sent to the judge after fusion pre-filtering
    #[serde(default = "default_judge_pool_limit")]
    pub judge_pool_limit: usize,

    /// Per-track result cap
    #[serde(default = "default_track_limit")]
    pub track_limit: usize,

    /// Per-attempt track timeout in milliseconds
    #[serde(default = "default_track_timeout")]
    pub track_timeout_ms: u64,

    /// Retries per track on transient failure
    #[serde(default = "default_track_retries")]
    pub track_retries: u32,

    /// Pause before a track retry in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Overall deadline for retrieval, measured from request start
    #[serde(default = "default_pipeline_deadline")]
    pub pipeline_deadline_ms: u64,

    /// Timeout for the query embedding call
    #[serde(default = "default_stage_timeout")]
    pub embedding_timeout_ms: u64,

    /// Timeout for tag resolution
    #[serde(default = "default_stage_timeout")]
    pub tag_timeout_ms: u64,

    /// Timeout for the catalog fetch during merge
    #[serde(default = "default_stage_timeout")]
    pub catalog_timeout_ms: u64,

    /// Timeout for the judge call
    #[serde(default = "default_judge_timeout")]
    pub judge_timeout_ms: u64,

    /// Similarity floor for the semantic track
    #[serde(default = "default_semantic_min_similarity")]
    pub semantic_min_similarity: f32,

    /// Keywords kept from the query
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,

    /// Query text is truncated to this many characters
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Project statuses allowed into the candidate pool
    #[serde(default = "default_eligible_statuses")]
    pub eligible_statuses: Vec<String>,

    /// Deterministic fusion weights
    #[serde(default)]
    pub weights: FusionWeights,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Session time-to-live in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_true")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_redis_ttl() -> u64 { 3600 }
fn default_key_prefix() -> String { "recforge".to_string() }
/// Providers `create_embedder` can build
pub const EMBEDDING_PROVIDERS: &[&str] = &["openai", "mock"];

fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 10 }
fn default_embedding_retries() -> u32 { 2 }
fn default_judge_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_judge_model() -> String { "gpt-4o-mini".to_string() }
fn default_judge_temperature() -> f32 { 0.0 }
fn default_judge_max_tokens() -> usize { 2000 }
fn default_tags_per_kind() -> usize { 6 }
fn default_tag_min_similarity() -> f32 { 0.45 }
fn default_weight_tag() -> f32 { 0.4 }
fn default_weight_semantic() -> f32 { 0.4 }
fn default_weight_keyword() -> f32 { 0.2 }
fn default_top_n() -> usize { 5 }
fn default_pool_cap() -> usize { 25 }
fn default_judge_pool_limit() -> usize { 15 }
fn default_track_limit() -> usize { 20 }
fn default_track_timeout() -> u64 { 3000 }
fn default_track_retries() -> u32 { 1 }
fn default_retry_backoff() -> u64 { 100 }
fn default_pipeline_deadline() -> u64 { 8000 }
fn default_stage_timeout() -> u64 { 3000 }
fn default_judge_timeout() -> u64 { 20000 }
fn default_semantic_min_similarity() -> f32 { 0.3 }
fn default_max_keywords() -> usize { 8 }
fn default_max_query_chars() -> usize { 2000 }
fn default_eligible_statuses() -> Vec<String> { vec!["active".to_string(), "in_progress".to_string()] }
fn default_session_ttl() -> u64 { 86400 }
fn default_log_level() -> String { "info".to_string() }
fn default_service_name() -> String { "recforge".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__PIPELINE__TOP_N=10
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific configuration file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;

        if !EMBEDDING_PROVIDERS.contains(&self.embedding.provider.as_str()) {
            return Err(AppError::Configuration {
                message: format!(
                    "embedding.provider must be one of {:?}, got '{}'",
                    EMBEDDING_PROVIDERS, self.embedding.provider
                ),
            });
        }

        if self.embedding.provider == "openai" && self.embedding.api_key.is_none() {
            return Err(AppError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            });
        }

        Ok(())
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }

    /// Whether the LLM judge should be constructed
    pub fn judge_enabled(&self) -> bool {
        self.judge.enabled && self.judge.api_key.is_some()
    }
}

impl FusionWeights {
    /// Sum of the three weights
    pub fn total(&self) -> f32 {
        self.tag + self.semantic + self.keyword
    }
}

impl PipelineConfig {
    pub fn track_timeout(&self) -> Duration {
        Duration::from_millis(self.track_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn pipeline_deadline(&self) -> Duration {
        Duration::from_millis(self.pipeline_deadline_ms)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn tag_timeout(&self) -> Duration {
        Duration::from_millis(self.tag_timeout_ms)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_millis(self.catalog_timeout_ms)
    }

    pub fn judge_timeout(&self) -> Duration {
        Duration::from_millis(self.judge_timeout_ms)
    }

    /// Reject settings the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| {
            Err(AppError::Configuration {
                message: message.to_string(),
            })
        };

        let w = self.weights;
        if [w.tag, w.semantic, w.keyword]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return invalid("pipeline.weights must be finite and non-negative");
        }
        if w.total() <= 0.0 {
            return invalid("pipeline.weights must not all be zero");
        }
        if self.top_n == 0 {
            return invalid("pipeline.top_n must be at least 1");
        }
        if self.pool_cap < self.top_n {
            return invalid("pipeline.pool_cap must be >= pipeline.top_n");
        }
        if self.judge_pool_limit < self.top_n {
            return invalid("pipeline.judge_pool_limit must be >= pipeline.top_n");
        }
        if self.track_retries > 1 {
            return invalid("pipeline.track_retries must be 0 or 1");
        }
        if self.track_limit == 0 {
            return invalid("pipeline.track_limit must be at least 1");
        }
        if [
            self.track_timeout_ms,
            self.pipeline_deadline_ms,
            self.embedding_timeout_ms,
            self.tag_timeout_ms,
            self.catalog_timeout_ms,
            self.judge_timeout_ms,
        ]
        .contains(&0)
        {
            return invalid("pipeline timeouts must be greater than zero");
        }
        if !(0.0..=1.0).contains(&self.semantic_min_similarity) {
            return invalid("pipeline.semantic_min_similarity must be within [0, 1]");
        }
        if self.eligible_statuses.is_empty() {
            return invalid("pipeline.eligible_statuses must not be empty");
        }

        Ok(())
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            default_ttl_secs: default_redis_ttl(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_secs: default_embedding_timeout(),
            max_retries: default_embedding_retries(),
            cache_enabled: true,
        }
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_judge_endpoint(),
            api_key: None,
            model: default_judge_model(),
            temperature: default_judge_temperature(),
            max_tokens: default_judge_max_tokens(),
        }
    }
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            per_kind_limit: default_tags_per_kind(),
            min_similarity: default_tag_min_similarity(),
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            tag: default_weight_tag(),
            semantic: default_weight_semantic(),
            keyword: default_weight_keyword(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            pool_cap: default_pool_cap(),
            judge_pool_limit: default_judge_pool_limit(),
            track_limit: default_track_limit(),
            track_timeout_ms: default_track_timeout(),
            track_retries: default_track_retries(),
            retry_backoff_ms: default_retry_backoff(),
            pipeline_deadline_ms: default_pipeline_deadline(),
            embedding_timeout_ms: default_stage_timeout(),
            tag_timeout_ms: default_stage_timeout(),
            catalog_timeout_ms: default_stage_timeout(),
            judge_timeout_ms: default_judge_timeout(),
            semantic_min_similarity: default_semantic_min_similarity(),
            max_keywords: default_max_keywords(),
            max_query_chars: default_max_query_chars(),
            eligible_statuses: default_eligible_statuses(),
            weights: FusionWeights::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/recforge".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            redis: RedisConfig::default(),
            embedding: EmbeddingConfig::default(),
            judge: JudgeConfig::default(),
            tags: TagConfig::default(),
            pipeline: PipelineConfig::default(),
            session: SessionConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.pipeline.top_n, 5);
        assert_eq!(config.pipeline.track_timeout(), Duration::from_secs(3));
        assert_eq!(config.pipeline.track_retries, 1);
        assert_eq!(config.pipeline.weights, FusionWeights { tag: 0.4, semantic: 0.4, keyword: 0.2 });
        assert_eq!(config.pipeline.eligible_statuses, vec!["active", "in_progress"]);
        assert_ok!(config.pipeline.validate());
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/recforge");
    }

    #[test]
    fn test_pipeline_validation() {
        let mut pipeline = PipelineConfig::default();
        pipeline.weights = FusionWeights { tag: 0.0, semantic: 0.0, keyword: 0.0 };
        assert_err!(pipeline.validate());

        let mut pipeline = PipelineConfig::default();
        pipeline.weights.keyword = -0.1;
        assert_err!(pipeline.validate());

        let mut pipeline = PipelineConfig::default();
        pipeline.pool_cap = 3;
        assert_err!(pipeline.validate());

        let mut pipeline = PipelineConfig::default();
        pipeline.track_timeout_ms = 0;
        assert_err!(pipeline.validate());

        let mut pipeline = PipelineConfig::default();
        pipeline.eligible_statuses.clear();
        assert_err!(pipeline.validate());
    }

    #[test]
    fn test_at_most_one_track_retry() {
        let mut pipeline = PipelineConfig::default();
        pipeline.track_retries = 0;
        assert_ok!(pipeline.validate());

        pipeline.track_retries = 2;
        assert_err!(pipeline.validate());
    }

    #[test]
    fn test_unknown_embedding_provider_rejected() {
        let mut config = AppConfig::default();
        config.embedding.provider = "opneai".to_string();
        config.embedding.api_key = Some("sk-test".to_string());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("opneai"));
    }

    #[test]
    fn test_openai_requires_key() {
        let config = AppConfig::default();
        assert_err!(config.validate());

        let mut config = AppConfig::default();
        config.embedding.provider = "mock".to_string();
        assert_ok!(config.validate());
        assert!(!config.judge_enabled());
    }

    #[test]
    fn test_partial_sections_deserialize() {
        let raw = serde_json::json!({
            "database": { "url": "postgres://db/recforge" },
            "pipeline": { "top_n": 3, "weights": { "keyword": 0.5 } }
        });

        let config: AppConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(config.pipeline.top_n, 3);
        assert_eq!(config.pipeline.pool_cap, 25);
        assert_eq!(config.pipeline.weights.tag, 0.4);
        assert_eq!(config.pipeline.weights.keyword, 0.5);
        assert!(config.redis.url.is_none());
    }
}
