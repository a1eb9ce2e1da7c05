//! Embedding service abstraction
//!
//! Provides a unified interface for embedding providers:
//! - OpenAI-compatible HTTP endpoints (text-embedding-3-small, ada-002, ...)
//! - A deterministic mock for development and tests
//! - A Redis-backed cache wrapper for repeated query texts

use crate::cache::{keys, Cache};
use crate::config::EmbeddingConfig;
use crate::errors::{AppError, Result};
use crate::metrics::{record_cache, record_embedding};
use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            max_retries: config.max_retries,
        })
    }

    /// Make request with exponential backoff on transient failures
    async fn request_with_retry(&self, text: &str) -> Result<Vec<f32>> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_secs(2))
            .with_max_elapsed_time(Some(Duration::from_secs(10)))
            .build();

        let attempts = AtomicU32::new(0);

        backoff::future::retry(policy, || async {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;

            self.make_request(text).await.map_err(|e| {
                if e.is_transient() && attempt <= self.max_retries {
                    warn!(
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Embedding request failed, retrying"
                    );
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        })
        .await
    }

    async fn make_request(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: vec![text],
            model: &self.model,
        };

        let response = self.client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UpstreamError {
                service: "embedding".to_string(),
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let result: OpenAIResponse = response.json().await.map_err(|e| {
            AppError::EmbeddingError {
                message: format!("Failed to parse response: {}", e),
            }
        })?;

        result.data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| AppError::EmbeddingError {
                message: "Empty response".to_string(),
            })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let result = self.request_with_retry(text).await;
        record_embedding(start.elapsed().as_secs_f64(), &self.model, result.is_ok());
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for development and testing.
///
/// Vectors are pseudo-random but seeded from the text, so the same text
/// always embeds to the same unit vector.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let digest = Sha256::digest(text.as_bytes());
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        let mut rng = StdRng::from_seed(seed);

        let raw: Vec<f32> = (0..self.dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt().max(f32::EPSILON);
        Ok(raw.into_iter().map(|v| v / norm).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder wrapper that caches vectors in Redis.
///
/// Cache failures never fail the embed call; they are logged and the
/// inner embedder is used directly.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Arc<Cache>,
    ttl_secs: u64,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, cache: Arc<Cache>, ttl_secs: u64) -> Self {
        Self { inner, cache, ttl_secs }
    }

    /// Cache key for a text under the wrapped model
    pub fn cache_key(model: &str, text: &str) -> String {
        keys::embedding(&text_hash(text), model)
    }
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::cache_key(self.inner.model_name(), text);

        match self.cache.get::<Vec<f32>>(&key).await {
            Ok(Some(vector)) => {
                record_cache(true, "embedding");
                return Ok(vector);
            }
            Ok(None) => record_cache(false, "embedding"),
            Err(e) => warn!(error = %e, "Embedding cache read failed"),
        }

        let vector = self.inner.embed(text).await?;

        if let Err(e) = self.cache.set_with_ttl(&key, &vector, self.ttl_secs).await {
            warn!(error = %e, "Failed to cache embedding, continuing without cache");
        }

        Ok(vector)
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

/// SHA-256 hex digest of a text, used for cache keys
pub fn text_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(OpenAIEmbedder::new(key, config)?))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => Err(AppError::Configuration {
            message: format!("unknown embedding provider '{}'", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "mok".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(create_embedder(&config), Err(AppError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new(64);
        let embedding = embedder.embed("test text").await.unwrap();
        assert_eq!(embedding.len(), 64);

        let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let embedder = MockEmbedder::new(32);
        let a = embedder.embed("graph neural networks").await.unwrap();
        let b = embedder.embed("graph neural networks").await.unwrap();
        let c = embedder.embed("robotics").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_cache_key() {
        let key = CachedEmbedder::cache_key("text-embedding-3-small", "hello");
        assert!(key.starts_with("embedding:text-embedding-3-small:"));
        assert_eq!(key.len(), "embedding:text-embedding-3-small:".len() + 64);
    }

    #[test]
    fn test_create_embedder() {
        let mut config = EmbeddingConfig::default();
        assert!(create_embedder(&config).is_err());

        config.provider = "mock".to_string();
        config.dimension = 16;
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 16);
        assert_eq!(embedder.model_name(), "mock-embedding");
    }
}
