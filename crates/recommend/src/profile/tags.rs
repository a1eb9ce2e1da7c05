//! Tag resolution: free text to tag ids

use async_trait::async_trait;
use futures::future::try_join_all;
use recforge_common::db::models::TagKind;
use recforge_common::errors::{AppError, Result};
use recforge_common::TagIndex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Maps free text plus known profile tags to a candidate tag set.
///
/// `embedding` is the query embedding the analyzer already computed,
/// `None` when it could not be produced.
#[async_trait]
pub trait TagMatcher: Send + Sync {
    async fn match_tags(
        &self,
        text: &str,
        embedding: Option<&[f32]>,
        known_tag_ids: &BTreeSet<i64>,
    ) -> Result<BTreeSet<i64>>;
}

/// Resolves tags by searching the tag vocabulary of each kind with the
/// query embedding, then unions the hits with the known profile tags.
pub struct VectorTagMatcher {
    index: Arc<dyn TagIndex>,
    per_kind_limit: usize,
    min_similarity: f32,
}

impl VectorTagMatcher {
    pub fn new(index: Arc<dyn TagIndex>, per_kind_limit: usize, min_similarity: f32) -> Self {
        Self {
            index,
            per_kind_limit,
            min_similarity,
        }
    }
}

#[async_trait]
impl TagMatcher for VectorTagMatcher {
    async fn match_tags(
        &self,
        text: &str,
        embedding: Option<&[f32]>,
        known_tag_ids: &BTreeSet<i64>,
    ) -> Result<BTreeSet<i64>> {
        let mut resolved = known_tag_ids.clone();

        if text.trim().is_empty() {
            return Ok(resolved);
        }

        let embedding = embedding.ok_or_else(|| AppError::ServiceUnavailable {
            message: "query embedding unavailable for tag matching".to_string(),
        })?;

        let hits = try_join_all(TagKind::ALL.iter().map(|kind| {
            self.index.nearest_tags(embedding, *kind, self.per_kind_limit, self.min_similarity)
        }))
        .await?;

        resolved.extend(hits.into_iter().flatten().map(|hit| hit.id));

        debug!(
            known = known_tag_ids.len(),
            resolved = resolved.len(),
            "Tags resolved"
        );

        Ok(resolved)
    }
}
