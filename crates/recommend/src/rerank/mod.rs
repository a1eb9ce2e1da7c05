//! Candidate reranking
//!
//! Two [`Scorer`] implementations behind one seam:
//! - [`LlmJudge`]: qualitative judge, primary path
//! - [`FusionScorer`]: deterministic weighted fusion, always available
//!
//! The engine pre-filters the pool by fusion score, asks the judge, and
//! validates the whole batch. Any failure, timeout or invalid reply
//! hands the full pool to the fallback scorer, fusion unless replaced.

mod fusion;
mod judge;

pub use fusion::{provenance_reason, FusionScorer};
pub use judge::{extract_json, parse_judgements, LlmJudge};

use crate::model::{CandidatePool, CandidateProject, ItemId, RankedItem, RetrievalInput};
use async_trait::async_trait;
use recforge_common::config::PipelineConfig;
use recforge_common::errors::{AppError, Result};
use recforge_common::metrics::record_rerank;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// One candidate sent to a scorer, with its fusion score as a hint
#[derive(Debug, Clone)]
pub struct ScoreCandidate {
    pub project: CandidateProject,
    pub hint: f32,
}

/// Batched scoring request
#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub query: String,
    pub tag_ids: BTreeSet<i64>,
    pub keywords: Vec<String>,
    pub candidates: Vec<ScoreCandidate>,
}

/// A scorer's verdict on one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    pub id: ItemId,
    pub score: f32,
    pub reason: String,
}

/// Scores a batch of candidates in one call
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Scorer name, for logs
    fn name(&self) -> &str;

    /// One judgement per submitted candidate
    async fn score(&self, request: &ScoreRequest) -> Result<Vec<Judgement>>;
}

/// Which path produced the ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankPath {
    Judge,
    Fallback,
}

impl RerankPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankPath::Judge => "judge",
            RerankPath::Fallback => "fallback",
        }
    }
}

/// Why fusion ranking was used instead of the judge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    JudgeDisabled,
    JudgeUnavailable,
    JudgeTimeout,
    InvalidJudgeOutput,
    EmptyPool,
}

impl FallbackReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackReason::JudgeDisabled => "judge_disabled",
            FallbackReason::JudgeUnavailable => "judge_unavailable",
            FallbackReason::JudgeTimeout => "judge_timeout",
            FallbackReason::InvalidJudgeOutput => "invalid_judge_output",
            FallbackReason::EmptyPool => "empty_pool",
        }
    }
}

/// Rerank result
#[derive(Debug, Clone)]
pub struct RerankOutcome {
    /// At most `top_n`, fused score desc, fallback score desc, id asc
    pub items: Vec<RankedItem>,
    pub path: RerankPath,
    pub fallback_reason: Option<FallbackReason>,
}

/// Rerank settings
#[derive(Debug, Clone, Copy)]
pub struct RerankSettings {
    pub top_n: usize,
    pub judge_pool_limit: usize,
    pub judge_timeout: Duration,
}

impl From<&PipelineConfig> for RerankSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            top_n: config.top_n,
            judge_pool_limit: config.judge_pool_limit,
            judge_timeout: config.judge_timeout(),
        }
    }
}

/// Assigns every pooled candidate a comparable fused score
pub struct RerankEngine {
    judge: Option<Arc<dyn Scorer>>,
    fallback: Arc<dyn Scorer>,
    fusion: FusionScorer,
    settings: RerankSettings,
}

/// Scored row before truncation
struct Scored {
    id: ItemId,
    fused: f32,
    fallback: f32,
    reason: String,
}

impl RerankEngine {
    /// Judge when available, fusion otherwise
    pub fn new(judge: Option<Arc<dyn Scorer>>, fusion: FusionScorer, settings: RerankSettings) -> Self {
        Self {
            judge,
            fallback: Arc::new(fusion),
            fusion,
            settings,
        }
    }

    /// Replace the scorer used when the judge is skipped or rejected
    pub fn with_fallback(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.fallback = scorer;
        self
    }

    /// Rank the pool; never fails
    #[instrument(skip_all, fields(pool_size = pool.len()))]
    pub async fn rerank(&self, query: &str, input: &RetrievalInput, pool: &CandidatePool) -> RerankOutcome {
        if pool.is_empty() {
            return self.finish(Vec::new(), RerankPath::Fallback, Some(FallbackReason::EmptyPool));
        }

        let mut candidates: Vec<ScoreCandidate> = pool
            .values()
            .map(|project| ScoreCandidate {
                hint: self.fusion.score_of(project),
                project: project.clone(),
            })
            .collect();
        candidates.sort_by(|a, b| b.hint.total_cmp(&a.hint).then(a.project.id.cmp(&b.project.id)));

        let full = ScoreRequest {
            query: query.to_string(),
            tag_ids: input.tag_ids.clone(),
            keywords: input.keywords.clone(),
            candidates,
        };

        let Some(judge) = &self.judge else {
            return self.fallback(&full, FallbackReason::JudgeDisabled).await;
        };

        let request = ScoreRequest {
            candidates: full.candidates.iter().take(self.settings.judge_pool_limit).cloned().collect(),
            ..full.clone()
        };

        let reply = timeout(self.settings.judge_timeout, judge.score(&request))
            .await
            .unwrap_or_else(|_| {
                Err(AppError::UpstreamTimeout {
                    service: judge.name().to_string(),
                    timeout_ms: self.settings.judge_timeout.as_millis() as u64,
                })
            });

        let judgements = match reply {
            Ok(judgements) => judgements,
            Err(e @ AppError::InvalidJudgeOutput { .. }) => {
                warn!(judge = judge.name(), error = %e, "Judge reply unparseable, using fusion");
                return self.fallback(&full, FallbackReason::InvalidJudgeOutput).await;
            }
            Err(e @ AppError::UpstreamTimeout { .. }) => {
                warn!(judge = judge.name(), error = %e, "Judge timed out, using fusion");
                return self.fallback(&full, FallbackReason::JudgeTimeout).await;
            }
            Err(e) => {
                warn!(judge = judge.name(), code = e.code().as_code(), error = %e, "Judge failed, using fusion");
                return self.fallback(&full, FallbackReason::JudgeUnavailable).await;
            }
        };

        let submitted = hints(&request);
        let verdicts = match validate_judgements(judgements, &submitted) {
            Ok(verdicts) => verdicts,
            Err(e) => {
                warn!(judge = judge.name(), error = %e, "Judge batch rejected, using fusion");
                return self.fallback(&full, FallbackReason::InvalidJudgeOutput).await;
            }
        };

        self.finish(scored(verdicts, &submitted), RerankPath::Judge, None)
    }

    /// Rank the whole pool with the fallback scorer. A fallback scorer
    /// that errors or breaks the batch contract is replaced by the
    /// fusion hints themselves.
    async fn fallback(&self, request: &ScoreRequest, reason: FallbackReason) -> RerankOutcome {
        let submitted = hints(request);

        let verdicts = self
            .fallback
            .score(request)
            .await
            .and_then(|judgements| validate_judgements(judgements, &submitted));

        let verdicts = verdicts.unwrap_or_else(|e| {
            warn!(scorer = self.fallback.name(), error = %e, "Fallback scorer failed, using fusion hints");
            request
                .candidates
                .iter()
                .map(|c| Judgement {
                    id: c.project.id,
                    score: c.hint,
                    reason: provenance_reason(&c.project),
                })
                .collect()
        });

        self.finish(scored(verdicts, &submitted), RerankPath::Fallback, Some(reason))
    }

    fn finish(&self, mut scored: Vec<Scored>, path: RerankPath, reason: Option<FallbackReason>) -> RerankOutcome {
        scored.sort_by(|a, b| {
            b.fused
                .total_cmp(&a.fused)
                .then(b.fallback.total_cmp(&a.fallback))
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(self.settings.top_n);

        record_rerank(path.as_str(), reason.map(|r| r.as_str()));
        info!(
            rerank_path = path.as_str(),
            fallback_reason = reason.map(|r| r.as_str()),
            ranked = scored.len(),
            "Rerank finished"
        );

        RerankOutcome {
            items: scored
                .into_iter()
                .map(|s| RankedItem {
                    id: s.id,
                    fused_score: s.fused,
                    reason: s.reason,
                })
                .collect(),
            path,
            fallback_reason: reason,
        }
    }
}

/// Fusion hint per submitted id
fn hints(request: &ScoreRequest) -> BTreeMap<ItemId, f32> {
    request
        .candidates
        .iter()
        .map(|c| (c.project.id, c.hint))
        .collect()
}

fn scored(verdicts: Vec<Judgement>, hints: &BTreeMap<ItemId, f32>) -> Vec<Scored> {
    verdicts
        .into_iter()
        .map(|j| Scored {
            id: j.id,
            fused: j.score,
            fallback: hints.get(&j.id).copied().unwrap_or_default(),
            reason: j.reason,
        })
        .collect()
}

/// Accept a judge batch only if it scores every submitted id exactly
/// once, adds no other ids, and keeps every score finite in [0, 100].
pub fn validate_judgements(
    judgements: Vec<Judgement>,
    submitted: &BTreeMap<ItemId, f32>,
) -> Result<Vec<Judgement>> {
    let invalid = |message: String| AppError::InvalidJudgeOutput { message };

    let mut seen = BTreeSet::new();
    for j in &judgements {
        if !submitted.contains_key(&j.id) {
            return Err(invalid(format!("unknown id {}", j.id)));
        }
        if !seen.insert(j.id) {
            return Err(invalid(format!("id {} scored twice", j.id)));
        }
        if !j.score.is_finite() || !(0.0..=100.0).contains(&j.score) {
            return Err(invalid(format!("score {} for id {} out of range", j.score, j.id)));
        }
    }

    if seen.len() != submitted.len() {
        return Err(invalid(format!(
            "{} of {} candidates scored",
            seen.len(),
            submitted.len()
        )));
    }

    Ok(judgements)
}
