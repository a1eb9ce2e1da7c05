//! Semantic (embedding) retrieval

use super::{rank_and_cap, Track};
use crate::model::{RetrievalInput, ScoredItem, TrackId};
use async_trait::async_trait;
use recforge_common::errors::Result;
use recforge_common::VectorStore;
use std::sync::Arc;

/// Recalls the K nearest projects above a similarity floor.
/// Cosine similarity is clamped into [0, 1].
pub struct SemanticTrack {
    vectors: Arc<dyn VectorStore>,
    k: usize,
    min_similarity: f32,
}

impl SemanticTrack {
    pub fn new(vectors: Arc<dyn VectorStore>, k: usize, min_similarity: f32) -> Self {
        Self {
            vectors,
            k,
            min_similarity,
        }
    }
}

#[async_trait]
impl Track for SemanticTrack {
    fn id(&self) -> TrackId {
        TrackId::Semantic
    }

    fn is_applicable(&self, input: &RetrievalInput) -> bool {
        input.embedding.is_some()
    }

    async fn recall(&self, input: &RetrievalInput) -> Result<Vec<ScoredItem>> {
        let Some(embedding) = input.embedding.as_deref() else {
            return Ok(Vec::new());
        };

        let hits = self.vectors.top_k(embedding, self.k, self.min_similarity).await?;

        let items = hits
            .into_iter()
            .filter(|hit| hit.similarity >= self.min_similarity)
            .map(|hit| ScoredItem::new(hit.id, hit.similarity));

        Ok(rank_and_cap(items, self.k))
    }
}
