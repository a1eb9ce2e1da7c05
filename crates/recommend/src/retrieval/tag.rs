//! Tag-overlap retrieval

use super::{rank_and_cap, Track};
use crate::model::{RetrievalInput, ScoredItem, TrackId};
use async_trait::async_trait;
use recforge_common::errors::Result;
use recforge_common::CatalogStore;
use std::sync::Arc;

/// Recalls projects sharing tags with the resolved tag set.
///
/// Score is the matched tag count over the smaller of the query tag set
/// and the project's own tag set, so a project fully covered by the
/// query scores 1.0 regardless of how many tags the user holds.
pub struct TagTrack {
    catalog: Arc<dyn CatalogStore>,
    limit: usize,
}

impl TagTrack {
    pub fn new(catalog: Arc<dyn CatalogStore>, limit: usize) -> Self {
        Self { catalog, limit }
    }
}

#[async_trait]
impl Track for TagTrack {
    fn id(&self) -> TrackId {
        TrackId::Tag
    }

    fn is_applicable(&self, input: &RetrievalInput) -> bool {
        !input.tag_ids.is_empty()
    }

    async fn recall(&self, input: &RetrievalInput) -> Result<Vec<ScoredItem>> {
        let rows = self.catalog.query_by_tags(&input.tag_ids, self.limit).await?;
        let query_tags = input.tag_ids.len() as i64;

        let items = rows.into_iter().map(|row| {
            let denominator = query_tags.min(row.total).max(1);
            ScoredItem::new(row.project_id, row.matched as f32 / denominator as f32)
        });

        Ok(rank_and_cap(items, self.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCatalog;
    use recforge_common::db::TagMatch;

    #[tokio::test]
    async fn test_normalized_overlap() {
        let catalog = FakeCatalog::new().with_tag_matches(vec![
            TagMatch { project_id: 1, matched: 2, total: 2 },
            TagMatch { project_id: 2, matched: 1, total: 5 },
            TagMatch { project_id: 3, matched: 3, total: 10 },
        ]);
        let track = TagTrack::new(Arc::new(catalog), 20);

        let input = RetrievalInput {
            tag_ids: [10, 11, 12, 13].into_iter().collect(),
            ..Default::default()
        };
        let items = track.recall(&input).await.unwrap();

        assert_eq!(
            items,
            vec![
                ScoredItem::new(1, 1.0),
                ScoredItem::new(3, 0.75),
                ScoredItem::new(2, 0.25),
            ]
        );
    }

    #[test]
    fn test_not_applicable_without_tags() {
        let track = TagTrack::new(Arc::new(FakeCatalog::new()), 20);
        assert!(!track.is_applicable(&RetrievalInput::default()));
    }
}
