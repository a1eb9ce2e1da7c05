//! Multi-track retrieval
//!
//! Provides three independent recall strategies:
//! - Tag track (tag overlap in the relational store)
//! - Semantic track (nearest neighbours in the vector store)
//! - Keyword track (full-text / substring match on title and description)
//!
//! and the [`RetrievalCoordinator`] that runs them concurrently.

mod coordinator;
mod keyword;
mod semantic;
mod tag;

pub use coordinator::{CoordinatorOutput, RetrievalCoordinator, RetryPolicy};
pub use keyword::KeywordTrack;
pub use semantic::SemanticTrack;
pub use tag::TagTrack;

use crate::model::{RetrievalInput, ScoredItem, TrackId};
use async_trait::async_trait;
use recforge_common::errors::Result;
use std::collections::BTreeMap;

/// Common trait for all retrieval tracks
#[async_trait]
pub trait Track: Send + Sync {
    /// Which track this is
    fn id(&self) -> TrackId;

    /// Whether the input carries anything for this track to search with.
    /// Inapplicable tracks are skipped, not failed.
    fn is_applicable(&self, input: &RetrievalInput) -> bool;

    /// Recall scored items; scores must already be normalized to [0, 1]
    async fn recall(&self, input: &RetrievalInput) -> Result<Vec<ScoredItem>>;
}

/// Clamp scores into [0, 1], keep the best score per id, order by score
/// descending then id ascending, and cap the list.
pub(crate) fn rank_and_cap(items: impl IntoIterator<Item = ScoredItem>, limit: usize) -> Vec<ScoredItem> {
    let mut best: BTreeMap<i64, f32> = BTreeMap::new();

    for item in items {
        if !item.score.is_finite() {
            continue;
        }
        let score = item.score.clamp(0.0, 1.0);
        best.entry(item.id)
            .and_modify(|s| *s = s.max(score))
            .or_insert(score);
    }

    let mut ranked: Vec<ScoredItem> = best
        .into_iter()
        .map(|(id, score)| ScoredItem::new(id, score))
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_and_cap() {
        let items = vec![
            ScoredItem::new(3, 0.5),
            ScoredItem::new(1, 1.7),
            ScoredItem::new(2, 0.5),
            ScoredItem::new(3, 0.9),
            ScoredItem::new(4, f32::NAN),
            ScoredItem::new(5, -0.2),
        ];

        let ranked = rank_and_cap(items, 3);

        assert_eq!(
            ranked,
            vec![
                ScoredItem::new(1, 1.0),
                ScoredItem::new(3, 0.9),
                ScoredItem::new(2, 0.5),
            ]
        );
    }
}
