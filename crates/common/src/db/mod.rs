//! Database layer for RecForge
//!
//! Provides:
//! - SeaORM entity models
//! - Store contracts the recommendation pipeline recalls through
//!   ([`CatalogStore`], [`VectorStore`], [`TagIndex`])
//! - A PostgreSQL/pgvector [`Repository`] implementing all three
//! - Connection pool management

pub mod models;
mod repository;

pub use repository::{Repository, UserTagSet};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use models::TagKind;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

/// Catalog project as the pipeline sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status: String,
}

/// Tag-overlap row for one project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagMatch {
    pub project_id: i64,

    /// Number of the requested tags attached to the project
    pub matched: i64,

    /// Number of tags attached to the project overall
    pub total: i64,
}

/// Project text returned by a keyword query
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub project_id: i64,
    pub title: String,
    pub description: String,
}

/// Nearest-neighbour hit with cosine similarity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    pub id: i64,
    pub similarity: f32,
}

/// Relational/catalog access used by the tag and keyword tracks and the merger
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Projects whose tag associations intersect `tag_ids`, most overlap first
    async fn query_by_tags(&self, tag_ids: &BTreeSet<i64>, limit: usize) -> Result<Vec<TagMatch>>;

    /// Projects whose title or description contains any of `keywords`
    async fn query_by_keywords(&self, keywords: &[String], limit: usize) -> Result<Vec<KeywordMatch>>;

    /// Full records for the given ids; unknown ids are silently absent
    async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<ProjectRecord>>;
}

/// Project embedding index used by the semantic track
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn top_k(&self, embedding: &[f32], k: usize, min_similarity: f32) -> Result<Vec<VectorHit>>;
}

/// Tag vocabulary embedding index used for tag resolution
#[async_trait]
pub trait TagIndex: Send + Sync {
    async fn nearest_tags(
        &self,
        embedding: &[f32],
        kind: TagKind,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<VectorHit>>;
}

/// Format an embedding as a pgvector literal, e.g. "[0.1,0.2]"
pub(crate) fn vector_literal(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding.iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Format ids as a Postgres array literal, e.g. "{1,2,3}"
pub(crate) fn bigint_array_literal<'a>(ids: impl IntoIterator<Item = &'a i64>) -> String {
    format!(
        "{{{}}}",
        ids.into_iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Format strings as a quoted Postgres text[] literal
pub(crate) fn text_array_literal<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    format!(
        "{{{}}}",
        values.into_iter()
            .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let primary = Database::connect(Self::options(&config.url, config))
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to primary: {}", e),
            })?;

        // Connect to replica if configured
        let replica = if let Some(ref read_url) = config.read_url {
            info!("Connecting to read replica...");

            let replica_conn = Database::connect(Self::options(read_url, config))
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Failed to connect to replica: {}", e),
                })?;

            Some(replica_conn)
        } else {
            None
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    fn options(url: &str, config: &DatabaseConfig) -> ConnectOptions {
        let mut opts = ConnectOptions::new(url);
        opts
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);
        opts
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.read()
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}
