//! Deterministic weighted fusion
//!
//! `fused = 100 × (w_tag·tag + w_semantic·semantic + w_keyword·keyword)`,
//! a missing track contributing 0. Always available; also used to
//! pre-filter the pool before the judge sees it.

use super::{Judgement, ScoreRequest, Scorer};
use crate::model::{CandidateProject, TrackId};
use async_trait::async_trait;
use recforge_common::config::FusionWeights;
use recforge_common::errors::Result;

/// Weighted-sum scorer over per-track scores
#[derive(Debug, Clone, Copy)]
pub struct FusionScorer {
    weights: FusionWeights,
}

impl FusionScorer {
    pub fn new(weights: FusionWeights) -> Self {
        Self { weights }
    }

    fn weight(&self, track: TrackId) -> f32 {
        match track {
            TrackId::Tag => self.weights.tag,
            TrackId::Semantic => self.weights.semantic,
            TrackId::Keyword => self.weights.keyword,
        }
    }

    /// Fused score in [0, 100]
    pub fn score_of(&self, candidate: &CandidateProject) -> f32 {
        let weighted: f32 = TrackId::ALL
            .iter()
            .map(|track| self.weight(*track) * candidate.track_score(*track))
            .sum();

        (100.0 * weighted).clamp(0.0, 100.0)
    }

    /// Fused score and provenance reason, e.g. "matched via: tag, keyword"
    pub fn fuse(&self, candidate: &CandidateProject) -> (f32, String) {
        (self.score_of(candidate), provenance_reason(candidate))
    }
}

/// Sources listed in canonical track order
pub fn provenance_reason(candidate: &CandidateProject) -> String {
    let sources: Vec<&str> = candidate.sources.iter().map(TrackId::as_str).collect();
    format!("matched via: {}", sources.join(", "))
}

#[async_trait]
impl Scorer for FusionScorer {
    fn name(&self) -> &str {
        "fusion"
    }

    async fn score(&self, request: &ScoreRequest) -> Result<Vec<Judgement>> {
        Ok(request
            .candidates
            .iter()
            .map(|c| {
                let (score, reason) = self.fuse(&c.project);
                Judgement {
                    id: c.project.id,
                    score,
                    reason,
                }
            })
            .collect())
    }
}
