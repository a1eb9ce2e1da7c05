//! Keyword retrieval

use super::{rank_and_cap, Track};
use crate::model::{RetrievalInput, ScoredItem, TrackId};
use async_trait::async_trait;
use recforge_common::db::KeywordMatch;
use recforge_common::errors::Result;
use recforge_common::CatalogStore;
use std::sync::Arc;

/// Weight of a keyword found in the title
const TITLE_HIT: f32 = 1.0;

/// Weight of a keyword found only in the description
const DESCRIPTION_HIT: f32 = 0.6;

/// Floor for rows the store matched on a stemmed form
const STEMMED_MATCH_FLOOR: f32 = 0.1;

/// Recalls projects whose title or description contains the keywords.
///
/// Score is the mean per-keyword hit weight (match density).
pub struct KeywordTrack {
    catalog: Arc<dyn CatalogStore>,
    limit: usize,
}

impl KeywordTrack {
    pub fn new(catalog: Arc<dyn CatalogStore>, limit: usize) -> Self {
        Self { catalog, limit }
    }
}

/// Mean hit weight of `keywords` over the project text
pub fn match_density(row: &KeywordMatch, keywords: &[String]) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }

    let title = row.title.to_lowercase();
    let description = row.description.to_lowercase();

    let total: f32 = keywords
        .iter()
        .map(|keyword| {
            let keyword = keyword.to_lowercase();
            if title.contains(&keyword) {
                TITLE_HIT
            } else if description.contains(&keyword) {
                DESCRIPTION_HIT
            } else {
                0.0
            }
        })
        .sum();

    total / keywords.len() as f32
}

#[async_trait]
impl Track for KeywordTrack {
    fn id(&self) -> TrackId {
        TrackId::Keyword
    }

    fn is_applicable(&self, input: &RetrievalInput) -> bool {
        !input.keywords.is_empty()
    }

    async fn recall(&self, input: &RetrievalInput) -> Result<Vec<ScoredItem>> {
        let rows = self.catalog.query_by_keywords(&input.keywords, self.limit).await?;

        let items = rows.iter().map(|row| {
            let density = match_density(row, &input.keywords);
            ScoredItem::new(row.project_id, density.max(STEMMED_MATCH_FLOOR))
        });

        Ok(rank_and_cap(items, self.limit))
    }
}
