//! Response assembly
//!
//! Pure transform of the pipeline's intermediate results into the
//! ranked list and the diagnostics block. No external calls; always
//! succeeds, including for an empty list.

use crate::merge::MergeOutput;
use crate::model::{RankedItem, TrackId, TrackOutcome, TrackResult};
use crate::profile::{EmbeddingStatus, TagResolution};
use crate::rerank::{FallbackReason, RerankOutcome, RerankPath};
use crate::retrieval::CoordinatorOutput;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-track diagnostic line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDiagnostic {
    pub track: TrackId,
    pub status: TrackOutcome,
    pub items: usize,
    pub attempts: u32,
    pub elapsed_ms: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&TrackResult> for TrackDiagnostic {
    fn from(result: &TrackResult) -> Self {
        Self {
            track: result.track,
            status: result.outcome,
            items: result.items.len(),
            attempts: result.attempts,
            elapsed_ms: result.elapsed_ms,
            error: result.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankDiagnostic {
    pub path: RerankPath,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

/// What happened while producing a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub request_id: Uuid,
    pub tracks: Vec<TrackDiagnostic>,
    pub embedding: EmbeddingStatus,
    pub tag_resolution: TagResolution,

    /// No track completed
    pub no_signal: bool,

    /// The pipeline deadline cancelled at least one track
    pub deadline_exceeded: bool,

    /// The catalog fetch failed during merge
    pub catalog_unavailable: bool,

    pub pool_size: usize,
    pub rerank: RerankDiagnostic,

    /// Any signal source was unavailable
    pub degraded: bool,

    pub elapsed_ms: u64,
}

impl Diagnostics {
    /// Tracks that completed
    pub fn succeeded_tracks(&self) -> Vec<TrackId> {
        self.tracks
            .iter()
            .filter(|t| t.status == TrackOutcome::Completed)
            .map(|t| t.track)
            .collect()
    }
}

/// Pipeline output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub ranked_items: Vec<RankedItem>,
    pub diagnostics: Diagnostics,
}

/// Everything the assembler reads, borrowed from the pipeline stages
pub struct AssemblyInput<'a> {
    pub request_id: Uuid,
    pub embedding: EmbeddingStatus,
    pub tag_resolution: TagResolution,
    pub retrieval: &'a CoordinatorOutput,
    pub merge: &'a MergeOutput,
    pub rerank: RerankOutcome,
    pub elapsed_ms: u64,
}

/// Builds the final response
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(&self, input: AssemblyInput<'_>) -> RecommendationResponse {
        let tracks: Vec<TrackDiagnostic> = input.retrieval.results.iter().map(TrackDiagnostic::from).collect();

        let rerank = RerankDiagnostic {
            path: input.rerank.path,
            fallback_reason: input.rerank.fallback_reason,
        };

        let degraded = is_degraded(
            &tracks,
            input.embedding,
            input.tag_resolution,
            input.merge.catalog_unavailable,
            &rerank,
        );

        RecommendationResponse {
            ranked_items: input.rerank.items,
            diagnostics: Diagnostics {
                request_id: input.request_id,
                tracks,
                embedding: input.embedding,
                tag_resolution: input.tag_resolution,
                no_signal: input.retrieval.no_signal,
                deadline_exceeded: input.retrieval.deadline_exceeded,
                catalog_unavailable: input.merge.catalog_unavailable,
                pool_size: input.merge.pool.len(),
                rerank,
                degraded,
                elapsed_ms: input.elapsed_ms,
            },
        }
    }
}

/// A skip caused by a missing embedding already shows up as
/// `EmbeddingStatus::Unavailable`; other skips are not degradation.
/// An empty pool or a disabled judge is not degradation either.
fn is_degraded(
    tracks: &[TrackDiagnostic],
    embedding: EmbeddingStatus,
    tag_resolution: TagResolution,
    catalog_unavailable: bool,
    rerank: &RerankDiagnostic,
) -> bool {
    let track_failed = tracks
        .iter()
        .any(|t| !matches!(t.status, TrackOutcome::Completed | TrackOutcome::Skipped));

    let judge_failed = matches!(
        rerank.fallback_reason,
        Some(FallbackReason::JudgeUnavailable | FallbackReason::JudgeTimeout | FallbackReason::InvalidJudgeOutput)
    );

    track_failed
        || judge_failed
        || catalog_unavailable
        || embedding == EmbeddingStatus::Unavailable
        || tag_resolution == TagResolution::Degraded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScoredItem;

    fn retrieval(results: Vec<TrackResult>) -> CoordinatorOutput {
        let no_signal = !results.iter().any(|r| r.outcome == TrackOutcome::Completed);
        CoordinatorOutput {
            results,
            no_signal,
            deadline_exceeded: false,
        }
    }

    fn rerank(items: Vec<RankedItem>, reason: Option<FallbackReason>) -> RerankOutcome {
        RerankOutcome {
            items,
            path: if reason.is_some() { RerankPath::Fallback } else { RerankPath::Judge },
            fallback_reason: reason,
        }
    }

    fn assemble(
        retrieval: &CoordinatorOutput,
        embedding: EmbeddingStatus,
        outcome: RerankOutcome,
    ) -> RecommendationResponse {
        ResultAssembler.assemble(AssemblyInput {
            request_id: Uuid::nil(),
            embedding,
            tag_resolution: TagResolution::Resolved,
            retrieval,
            merge: &MergeOutput::default(),
            rerank: outcome,
            elapsed_ms: 12,
        })
    }

    #[test]
    fn test_all_failed_is_empty_and_flagged() {
        let retrieval = retrieval(
            TrackId::ALL
                .iter()
                .map(|t| TrackResult::failed(*t, TrackOutcome::Failed, 2, 30, "store down"))
                .collect(),
        );

        let response = assemble(
            &retrieval,
            EmbeddingStatus::Available,
            rerank(vec![], Some(FallbackReason::EmptyPool)),
        );

        assert!(response.ranked_items.is_empty());
        assert!(response.diagnostics.no_signal);
        assert!(response.diagnostics.degraded);
        assert!(response.diagnostics.succeeded_tracks().is_empty());
        assert!(response.diagnostics.tracks.iter().all(|t| t.status == TrackOutcome::Failed));
    }

    #[test]
    fn test_absent_and_empty_semantic_are_distinct() {
        let skipped = retrieval(vec![
            TrackResult::completed(TrackId::Tag, vec![ScoredItem::new(1, 0.5)], 1, 4),
            TrackResult::skipped(TrackId::Semantic),
        ]);
        let empty = retrieval(vec![
            TrackResult::completed(TrackId::Tag, vec![ScoredItem::new(1, 0.5)], 1, 4),
            TrackResult::completed(TrackId::Semantic, vec![], 1, 9),
        ]);

        let absent = assemble(&skipped, EmbeddingStatus::Unavailable, rerank(vec![], None));
        let zero = assemble(&empty, EmbeddingStatus::Available, rerank(vec![], None));

        assert_eq!(absent.diagnostics.tracks[1].status, TrackOutcome::Skipped);
        assert!(absent.diagnostics.degraded);
        assert_eq!(zero.diagnostics.tracks[1].status, TrackOutcome::Completed);
        assert_eq!(zero.diagnostics.tracks[1].items, 0);
        assert!(!zero.diagnostics.degraded);
    }

    #[test]
    fn test_disabled_judge_is_not_degraded() {
        let retrieval = retrieval(vec![TrackResult::completed(TrackId::Tag, vec![], 1, 1)]);
        let response = assemble(
            &retrieval,
            EmbeddingStatus::Available,
            rerank(vec![], Some(FallbackReason::JudgeDisabled)),
        );

        assert!(!response.diagnostics.degraded);
        assert_eq!(response.diagnostics.rerank.path, RerankPath::Fallback);
    }

    #[test]
    fn test_diagnostics_json_shape() {
        let retrieval = retrieval(vec![TrackResult::failed(
            TrackId::Keyword,
            TrackOutcome::TimedOut,
            2,
            6100,
            "timed out after 3000ms",
        )]);
        let response = assemble(
            &retrieval,
            EmbeddingStatus::Available,
            rerank(vec![], Some(FallbackReason::JudgeTimeout)),
        );

        let json = serde_json::to_value(&response).unwrap();
        let diagnostics = &json["diagnostics"];

        assert_eq!(diagnostics["tracks"][0]["track"], "keyword");
        assert_eq!(diagnostics["tracks"][0]["status"], "timed_out");
        assert_eq!(diagnostics["embedding"], "available");
        assert_eq!(diagnostics["tag_resolution"], "resolved");
        assert_eq!(diagnostics["rerank"]["path"], "fallback");
        assert_eq!(diagnostics["rerank"]["fallback_reason"], "judge_timeout");
        assert_eq!(json["ranked_items"], serde_json::json!([]));
    }
}
