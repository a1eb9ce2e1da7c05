//! Redis cache integration
//!
//! Provides:
//! - Multiplexed connection management
//! - Generic JSON get/set operations with TTL
//! - Embedding and session key builders

use crate::config::RedisConfig;
use crate::errors::{AppError, Result};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

/// Redis cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis URL (redis://host:port)
    pub url: String,
    /// Default TTL in seconds
    pub default_ttl_secs: u64,
    /// Key prefix for namespacing
    pub key_prefix: String,
}

impl CacheConfig {
    /// Build from application config; `None` when Redis is not configured
    pub fn from_redis(config: &RedisConfig) -> Option<Self> {
        config.url.as_ref().map(|url| Self {
            url: url.clone(),
            default_ttl_secs: config.default_ttl_secs,
            key_prefix: config.key_prefix.clone(),
        })
    }
}

/// Redis cache client
pub struct Cache {
    connection: RwLock<MultiplexedConnection>,
    config: CacheConfig,
}

impl Cache {
    /// Create a new cache client
    pub async fn new(config: CacheConfig) -> Result<Self> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to create Redis client: {}", e),
            })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection: RwLock::new(connection),
            config,
        })
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.key(key);
        let mut conn = self.connection.write().await;

        let value: Option<String> = conn.get(&full_key).await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to get key '{}': {}", full_key, e),
            })?;

        match value {
            Some(json) => {
                let parsed = serde_json::from_str(&json)
                    .map_err(|e| AppError::CacheError {
                        message: format!("Failed to parse cached value: {}", e),
                    })?;
                debug!(key = %full_key, "Cache hit");
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                Ok(None)
            }
        }
    }

    /// Set a value in cache with default TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.config.default_ttl_secs).await
    }

    /// Set a value in cache with custom TTL
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let full_key = self.key(key);
        let json = serde_json::to_string(value)
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to serialize value: {}", e),
            })?;

        let mut conn = self.connection.write().await;
        conn.set_ex::<_, _, ()>(&full_key, &json, ttl_secs)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", full_key, e),
            })?;

        debug!(key = %full_key, ttl_secs, "Cache set");
        Ok(())
    }

    /// Delete a key from cache
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let full_key = self.key(key);
        let mut conn = self.connection.write().await;

        let deleted: i32 = conn.del(&full_key).await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to delete key '{}': {}", full_key, e),
            })?;

        debug!(key = %full_key, deleted = deleted > 0, "Cache delete");
        Ok(deleted > 0)
    }
}

/// Cache key builder helpers
pub mod keys {
    use uuid::Uuid;

    /// Build a session cache key
    pub fn session(session_id: Uuid) -> String {
        format!("session:{}", session_id)
    }

    /// Build an embedding cache key
    pub fn embedding(text_hash: &str, model: &str) -> String {
        format!("embedding:{}:{}", model, text_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        let session_id = uuid::Uuid::new_v4();

        assert_eq!(keys::session(session_id), format!("session:{}", session_id));
        assert_eq!(keys::embedding("hash", "ada-002"), "embedding:ada-002:hash");
    }

    #[test]
    fn test_config_from_redis() {
        let mut redis = RedisConfig::default();
        assert!(CacheConfig::from_redis(&redis).is_none());

        redis.url = Some("redis://localhost:6379".to_string());
        let config = CacheConfig::from_redis(&redis).unwrap();
        assert_eq!(config.key_prefix, "recforge");
        assert_eq!(config.default_ttl_secs, 3600);
    }
}
