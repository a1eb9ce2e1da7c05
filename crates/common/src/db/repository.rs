//! Repository pattern for catalog access
//!
//! Implements the store contracts over PostgreSQL:
//! - tag overlap via `project_tags`
//! - keyword search via full-text search with an ILIKE fallback
//! - nearest neighbours via pgvector on `project_embeddings` and `tags`
//! - user profile tags via the `user_tags` entity

use crate::db::models::*;
use crate::db::{
    bigint_array_literal, text_array_literal, vector_literal, CatalogStore, DbPool, KeywordMatch,
    ProjectRecord, TagIndex, TagMatch, VectorHit, VectorStore,
};
use crate::errors::Result;
use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    QueryResult, Statement,
};
use std::collections::BTreeSet;
use tracing::debug;

/// Interest and skill tag ids stored for a user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserTagSet {
    pub interest: BTreeSet<i64>,
    pub skill: BTreeSet<i64>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Profile Operations
    // ========================================================================

    /// Load a user's interest and skill tags
    pub async fn load_user_profile(&self, user_id: i64) -> Result<UserTagSet> {
        let rows = UserTagEntity::find()
            .filter(UserTagColumn::UserId.eq(user_id))
            .all(self.read_conn())
            .await?;

        let mut tags = UserTagSet::default();
        for row in rows {
            match row.kind.as_str() {
                "skill" => tags.skill.insert(row.tag_id),
                _ => tags.interest.insert(row.tag_id),
            };
        }

        Ok(tags)
    }

    // ========================================================================
    // Keyword Search
    // ========================================================================

    async fn full_text_search(&self, keywords: &[String], limit: usize) -> Result<Vec<KeywordMatch>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT p.id, p.title, p.description
            FROM projects p
            WHERE to_tsvector('english', p.title || ' ' || p.description)
                  @@ websearch_to_tsquery('english', $1)
            ORDER BY ts_rank_cd(
                         to_tsvector('english', p.title || ' ' || p.description),
                         websearch_to_tsquery('english', $1)
                     ) DESC,
                     p.id ASC
            LIMIT $2
            "#,
            vec![keywords.join(" or ").into(), (limit as i32).into()],
        );

        Ok(self.read_conn()
            .query_all(stmt)
            .await?
            .iter()
            .filter_map(keyword_row)
            .collect())
    }

    async fn substring_search(&self, keywords: &[String], limit: usize) -> Result<Vec<KeywordMatch>> {
        let patterns: Vec<String> = keywords
            .iter()
            .map(|k| format!("%{}%", escape_like(k)))
            .collect();

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT p.id, p.title, p.description
            FROM projects p
            WHERE p.title ILIKE ANY($1::text[])
               OR p.description ILIKE ANY($1::text[])
            ORDER BY p.id ASC
            LIMIT $2
            "#,
            vec![
                text_array_literal(patterns.iter().map(String::as_str)).into(),
                (limit as i32).into(),
            ],
        );

        Ok(self.read_conn()
            .query_all(stmt)
            .await?
            .iter()
            .filter_map(keyword_row)
            .collect())
    }
}

#[async_trait]
impl CatalogStore for Repository {
    async fn query_by_tags(&self, tag_ids: &BTreeSet<i64>, limit: usize) -> Result<Vec<TagMatch>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT pt.project_id,
                   COUNT(*) FILTER (WHERE pt.tag_id = ANY($1::bigint[])) AS matched,
                   COUNT(*) AS total
            FROM project_tags pt
            GROUP BY pt.project_id
            HAVING COUNT(*) FILTER (WHERE pt.tag_id = ANY($1::bigint[])) > 0
            ORDER BY matched DESC, pt.project_id ASC
            LIMIT $2
            "#,
            vec![bigint_array_literal(tag_ids).into(), (limit as i32).into()],
        );

        let rows = self.read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(TagMatch {
                    project_id: row.try_get_by_index::<i64>(0).ok()?,
                    matched: row.try_get_by_index::<i64>(1).ok()?,
                    total: row.try_get_by_index::<i64>(2).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }

    async fn query_by_keywords(&self, keywords: &[String], limit: usize) -> Result<Vec<KeywordMatch>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self.full_text_search(keywords, limit).await?;
        if !rows.is_empty() {
            return Ok(rows);
        }

        // The english configuration does not segment CJK text
        debug!(keywords = keywords.len(), "Full-text search empty, falling back to ILIKE");
        self.substring_search(keywords, limit).await
    }

    async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<ProjectRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            FETCH_BY_IDS_SQL,
            vec![bigint_array_literal(ids).into()],
        );

        let rows = self.read_conn()
            .query_all(stmt)
            .await?
            .into_iter()
            .filter_map(|row| {
                Some(ProjectRecord {
                    id: row.try_get_by_index::<i64>(0).ok()?,
                    title: row.try_get_by_index::<String>(1).ok()?,
                    description: row.try_get_by_index::<String>(2).ok()?,
                    status: row.try_get_by_index::<String>(3).ok()?,
                    tags: row.try_get_by_index::<Vec<String>>(4).ok()?,
                })
            })
            .collect();

        Ok(rows)
    }
}

#[async_trait]
impl VectorStore for Repository {
    async fn top_k(&self, embedding: &[f32], k: usize, min_similarity: f32) -> Result<Vec<VectorHit>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT pe.project_id,
                   1 - (pe.embedding <=> $1::vector) AS similarity
            FROM project_embeddings pe
            WHERE 1 - (pe.embedding <=> $1::vector) >= $3
            ORDER BY pe.embedding <=> $1::vector, pe.project_id
            LIMIT $2
            "#,
            vec![
                vector_literal(embedding).into(),
                (k as i32).into(),
                (min_similarity as f64).into(),
            ],
        );

        Ok(self.read_conn()
            .query_all(stmt)
            .await?
            .iter()
            .filter_map(vector_row)
            .collect())
    }
}

#[async_trait]
impl TagIndex for Repository {
    async fn nearest_tags(
        &self,
        embedding: &[f32],
        kind: TagKind,
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<VectorHit>> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            SELECT t.id,
                   1 - (t.embedding <=> $1::vector) AS similarity
            FROM tags t
            WHERE t.kind = $2
              AND t.embedding IS NOT NULL
              AND 1 - (t.embedding <=> $1::vector) >= $4
            ORDER BY t.embedding <=> $1::vector, t.id
            LIMIT $3
            "#,
            vec![
                vector_literal(embedding).into(),
                kind.as_str().into(),
                (limit as i32).into(),
                (min_similarity as f64).into(),
            ],
        );

        Ok(self.read_conn()
            .query_all(stmt)
            .await?
            .iter()
            .filter_map(vector_row)
            .collect())
    }
}

/// Projects with their tag names as a text array, so names containing
/// separators survive intact
const FETCH_BY_IDS_SQL: &str = r#"
    SELECT p.id, p.title, p.description, p.status,
           COALESCE(
               array_agg(t.name ORDER BY t.name) FILTER (WHERE t.name IS NOT NULL),
               ARRAY[]::text[]
           ) AS tags
    FROM projects p
    LEFT JOIN project_tags pt ON pt.project_id = p.id
    LEFT JOIN tags t ON t.id = pt.tag_id
    WHERE p.id = ANY($1::bigint[])
    GROUP BY p.id
    ORDER BY p.id ASC
"#;

fn keyword_row(row: &QueryResult) -> Option<KeywordMatch> {
    Some(KeywordMatch {
        project_id: row.try_get_by_index::<i64>(0).ok()?,
        title: row.try_get_by_index::<String>(1).ok()?,
        description: row.try_get_by_index::<String>(2).ok()?,
    })
}

fn vector_row(row: &QueryResult) -> Option<VectorHit> {
    Some(VectorHit {
        id: row.try_get_by_index::<i64>(0).ok()?,
        similarity: row.try_get_by_index::<f64>(1).ok()? as f32,
    })
}

/// Escape LIKE wildcards so keywords match literally
fn escape_like(keyword: &str) -> String {
    keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("rust"), "rust");
        assert_eq!(escape_like("100%_done"), "100\\%\\_done");
    }

    #[test]
    fn test_fetch_by_ids_aggregates_tags_as_array() {
        assert!(FETCH_BY_IDS_SQL.contains("array_agg(t.name ORDER BY t.name)"));
        assert!(FETCH_BY_IDS_SQL.contains("ARRAY[]::text[]"));
        assert!(!FETCH_BY_IDS_SQL.contains("string_agg"));
    }
}
