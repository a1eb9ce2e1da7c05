//! Request-scoped data model for the recommendation pipeline
//!
//! Every value here is created fresh per request and dropped once the
//! response is assembled. The only mutation after construction is the
//! append-only provenance union on [`CandidateProject`] during merge.

use recforge_common::db::ProjectRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Catalog item identifier
pub type ItemId = i64;

/// A user's free-text request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub raw_text: String,
    pub user_id: i64,
}

impl Query {
    pub fn new(raw_text: impl Into<String>, user_id: i64) -> Self {
        Self {
            raw_text: raw_text.into(),
            user_id,
        }
    }
}

/// Known profile tags, owned and persisted outside the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub interest_tag_ids: BTreeSet<i64>,

    #[serde(default)]
    pub skill_tag_ids: BTreeSet<i64>,
}

impl UserProfile {
    /// Union of interest and skill tags
    pub fn known_tag_ids(&self) -> BTreeSet<i64> {
        self.interest_tag_ids
            .union(&self.skill_tag_ids)
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.interest_tag_ids.is_empty() && self.skill_tag_ids.is_empty()
    }
}

/// Structured retrieval inputs derived from the query and profile
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalInput {
    pub tag_ids: BTreeSet<i64>,

    /// Ordered, deduplicated, stopword-free
    pub keywords: Vec<String>,

    /// Absent when the embedding service failed or timed out
    pub embedding: Option<Vec<f32>>,
}

/// Retrieval track identifier.
///
/// Declaration order is the canonical merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackId {
    Tag,
    Semantic,
    Keyword,
}

impl TrackId {
    pub const ALL: [TrackId; 3] = [TrackId::Tag, TrackId::Semantic, TrackId::Keyword];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackId::Tag => "tag",
            TrackId::Semantic => "semantic",
            TrackId::Keyword => "keyword",
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recalled item with its normalized track score in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    pub id: ItemId,
    pub score: f32,
}

impl ScoredItem {
    pub fn new(id: ItemId, score: f32) -> Self {
        Self { id, score }
    }
}

/// How a track's execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOutcome {
    /// Ran and returned (possibly zero) items
    Completed,
    /// Nothing to search with, e.g. no embedding for the semantic track
    Skipped,
    /// Every attempt exceeded the per-track timeout
    TimedOut,
    /// The store returned an error on the final attempt
    Failed,
    /// Still running when the pipeline deadline expired
    Cancelled,
}

impl TrackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackOutcome::Completed => "completed",
            TrackOutcome::Skipped => "skipped",
            TrackOutcome::TimedOut => "timed_out",
            TrackOutcome::Failed => "failed",
            TrackOutcome::Cancelled => "cancelled",
        }
    }
}

/// Result of one track for one request
#[derive(Debug, Clone, PartialEq)]
pub struct TrackResult {
    pub track: TrackId,
    pub items: Vec<ScoredItem>,
    pub outcome: TrackOutcome,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl TrackResult {
    pub fn completed(track: TrackId, items: Vec<ScoredItem>, attempts: u32, elapsed_ms: u64) -> Self {
        Self {
            track,
            items,
            outcome: TrackOutcome::Completed,
            attempts,
            elapsed_ms,
            error: None,
        }
    }

    pub fn skipped(track: TrackId) -> Self {
        Self {
            track,
            items: Vec::new(),
            outcome: TrackOutcome::Skipped,
            attempts: 0,
            elapsed_ms: 0,
            error: None,
        }
    }

    /// A failed, timed-out or cancelled track; never carries items
    pub fn failed(
        track: TrackId,
        outcome: TrackOutcome,
        attempts: u32,
        elapsed_ms: u64,
        error: impl Into<String>,
    ) -> Self {
        Self {
            track,
            items: Vec::new(),
            outcome,
            attempts,
            elapsed_ms,
            error: Some(error.into()),
        }
    }

    /// Completed and skipped tracks succeeded; a skip is a no-op
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, TrackOutcome::Completed | TrackOutcome::Skipped)
    }
}

/// Catalog project augmented with merge-time provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateProject {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status: String,

    /// Tracks that recalled this project
    pub sources: BTreeSet<TrackId>,

    /// Best score seen per track
    pub track_scores: BTreeMap<TrackId, f32>,
}

impl CandidateProject {
    pub fn from_record(record: ProjectRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            tags: record.tags,
            status: record.status,
            sources: BTreeSet::new(),
            track_scores: BTreeMap::new(),
        }
    }

    /// Score from one track, 0 when the track did not recall this project
    pub fn track_score(&self, track: TrackId) -> f32 {
        self.track_scores.get(&track).copied().unwrap_or(0.0)
    }

    /// Highest score across tracks
    pub fn best_track_score(&self) -> f32 {
        self.track_scores.values().copied().fold(0.0, f32::max)
    }
}

/// Deduplicated candidates keyed by id
pub type CandidatePool = BTreeMap<ItemId, CandidateProject>;

/// Final output unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub id: ItemId,

    /// In [0, 100]
    pub fused_score: f32,

    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_track_order() {
        let mut ids = vec![TrackId::Keyword, TrackId::Tag, TrackId::Semantic];
        ids.sort();
        assert_eq!(ids, TrackId::ALL.to_vec());
    }

    #[test]
    fn test_track_result_success() {
        assert!(TrackResult::skipped(TrackId::Semantic).succeeded());
        assert!(TrackResult::completed(TrackId::Tag, vec![], 1, 5).succeeded());
        assert!(!TrackResult::failed(TrackId::Keyword, TrackOutcome::TimedOut, 2, 6000, "timeout").succeeded());
    }

    #[test]
    fn test_profile_known_tags() {
        let profile = UserProfile {
            interest_tag_ids: [1, 2].into_iter().collect(),
            skill_tag_ids: [2, 3].into_iter().collect(),
        };
        assert_eq!(profile.known_tag_ids(), [1, 2, 3].into_iter().collect());
        assert!(UserProfile::default().is_empty());
    }

    #[test]
    fn test_best_track_score() {
        let mut candidate = CandidateProject::from_record(ProjectRecord {
            id: 1,
            title: "t".into(),
            description: "d".into(),
            tags: vec![],
            status: "active".into(),
        });
        assert_eq!(candidate.best_track_score(), 0.0);

        candidate.track_scores.insert(TrackId::Tag, 0.3);
        candidate.track_scores.insert(TrackId::Keyword, 0.7);
        assert_eq!(candidate.best_track_score(), 0.7);
        assert_eq!(candidate.track_score(TrackId::Semantic), 0.0);
    }
}
