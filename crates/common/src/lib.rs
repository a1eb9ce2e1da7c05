//! RecForge Common Library
//!
//! Shared code for the RecForge recommendation pipeline including:
//! - Configuration management
//! - Error types and transient-failure classification
//! - Catalog, vector and tag-index access over PostgreSQL/pgvector
//! - Embedding client abstraction
//! - Chat-completion client used by the rerank judge
//! - Redis cache
//! - Metrics helpers

pub mod cache;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{CatalogStore, Repository, TagIndex, VectorStore};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::ChatCompletion;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
