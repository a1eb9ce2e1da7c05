//! In-crate fakes for every collaborator the pipeline depends on

use crate::model::{ItemId, RetrievalInput, ScoredItem, TrackId};
use crate::profile::TagMatcher;
use crate::rerank::{Judgement, ScoreRequest, Scorer};
use crate::retrieval::Track;
use async_trait::async_trait;
use recforge_common::db::models::TagKind;
use recforge_common::db::{KeywordMatch, ProjectRecord, TagMatch, VectorHit};
use recforge_common::errors::{AppError, Result};
use recforge_common::{CatalogStore, Embedder, TagIndex, VectorStore};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn unavailable(service: &str) -> AppError {
    AppError::ServiceUnavailable {
        message: format!("{} is down", service),
    }
}

/// Catalog project with a generated title and description
pub fn record(id: ItemId, status: &str) -> ProjectRecord {
    ProjectRecord {
        id,
        title: format!("Project {}", id),
        description: format!("Description of project {}", id),
        tags: vec!["rust".to_string()],
        status: status.to_string(),
    }
}

// ============================================================================
// Stores
// ============================================================================

#[derive(Default)]
pub struct FakeCatalog {
    tag_matches: Vec<TagMatch>,
    keyword_matches: Vec<KeywordMatch>,
    records: Vec<ProjectRecord>,
    fail: bool,
    fetches: Mutex<Vec<BTreeSet<ItemId>>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    pub fn with_tag_matches(mut self, rows: Vec<TagMatch>) -> Self {
        self.tag_matches = rows;
        self
    }

    pub fn with_keyword_matches(mut self, rows: Vec<KeywordMatch>) -> Self {
        self.keyword_matches = rows;
        self
    }

    pub fn with_records(mut self, records: impl IntoIterator<Item = ProjectRecord>) -> Self {
        self.records.extend(records);
        self
    }

    /// Id sets passed to `fetch_by_ids`, in call order
    pub fn fetch_calls(&self) -> Vec<BTreeSet<ItemId>> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CatalogStore for FakeCatalog {
    async fn query_by_tags(&self, _tag_ids: &BTreeSet<i64>, limit: usize) -> Result<Vec<TagMatch>> {
        if self.fail {
            return Err(unavailable("catalog"));
        }
        Ok(self.tag_matches.iter().take(limit).copied().collect())
    }

    async fn query_by_keywords(&self, _keywords: &[String], limit: usize) -> Result<Vec<KeywordMatch>> {
        if self.fail {
            return Err(unavailable("catalog"));
        }
        Ok(self.keyword_matches.iter().take(limit).cloned().collect())
    }

    async fn fetch_by_ids(&self, ids: &BTreeSet<i64>) -> Result<Vec<ProjectRecord>> {
        self.fetches.lock().unwrap().push(ids.clone());
        if self.fail {
            return Err(unavailable("catalog"));
        }
        Ok(self.records.iter().filter(|r| ids.contains(&r.id)).cloned().collect())
    }
}

pub struct FakeVectorStore {
    hits: Vec<VectorHit>,
}

impl FakeVectorStore {
    pub fn returning(hits: Vec<VectorHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn top_k(&self, _embedding: &[f32], _k: usize, _min_similarity: f32) -> Result<Vec<VectorHit>> {
        Ok(self.hits.clone())
    }
}

#[derive(Default)]
pub struct FakeTagIndex {
    hits: Vec<(TagKind, Vec<VectorHit>)>,
}

impl FakeTagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: TagKind, hits: Vec<VectorHit>) -> Self {
        self.hits.push((kind, hits));
        self
    }
}

#[async_trait]
impl TagIndex for FakeTagIndex {
    async fn nearest_tags(
        &self,
        _embedding: &[f32],
        kind: TagKind,
        limit: usize,
        _min_similarity: f32,
    ) -> Result<Vec<VectorHit>> {
        Ok(self
            .hits
            .iter()
            .filter(|(k, _)| *k == kind)
            .flat_map(|(_, hits)| hits.iter().copied())
            .take(limit)
            .collect())
    }
}

// ============================================================================
// Analyzer collaborators
// ============================================================================

pub struct FakeTagMatcher {
    tags: Option<BTreeSet<i64>>,
    seen: Mutex<Vec<Option<usize>>>,
}

impl FakeTagMatcher {
    pub fn returning(tags: impl IntoIterator<Item = i64>) -> Self {
        Self {
            tags: Some(tags.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            tags: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Embedding length handed over on each call, `None` when absent
    pub fn embeddings_seen(&self) -> Vec<Option<usize>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TagMatcher for FakeTagMatcher {
    async fn match_tags(
        &self,
        _text: &str,
        embedding: Option<&[f32]>,
        _known: &BTreeSet<i64>,
    ) -> Result<BTreeSet<i64>> {
        self.seen.lock().unwrap().push(embedding.map(<[f32]>::len));
        self.tags.clone().ok_or_else(|| unavailable("tag matcher"))
    }
}

pub struct FakeEmbedder {
    dimension: usize,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn ok(dimension: usize) -> Self {
        Self { dimension, fail: false, delay: None, calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { dimension: 0, fail: true, delay: None, calls: AtomicUsize::new(0) }
    }

    pub fn slow(dimension: usize, delay: Duration) -> Self {
        Self { dimension, fail: false, delay: Some(delay), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AppError::EmbeddingError {
                message: "embedding provider unreachable".to_string(),
            });
        }
        Ok((0..self.dimension).map(|i| (i + 1) as f32 / self.dimension as f32).collect())
    }

    fn model_name(&self) -> &str {
        "fake"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// Tracks
// ============================================================================

/// One scripted track response
pub struct Step {
    result: std::result::Result<Vec<ScoredItem>, fn() -> AppError>,
    delay: Duration,
}

impl Step {
    pub fn items(items: Vec<(ItemId, f32)>) -> Self {
        Self::items_after(items, 0)
    }

    pub fn items_after(items: Vec<(ItemId, f32)>, delay_ms: u64) -> Self {
        Self {
            result: Ok(items.into_iter().map(|(id, score)| ScoredItem::new(id, score)).collect()),
            delay: Duration::from_millis(delay_ms),
        }
    }

    pub fn transient_error() -> Self {
        Self {
            result: Err(|| AppError::UpstreamError {
                service: "store".to_string(),
                status: Some(503),
                message: "overloaded".to_string(),
            }),
            delay: Duration::ZERO,
        }
    }

    pub fn permanent_error() -> Self {
        Self {
            result: Err(|| AppError::Validation {
                message: "malformed query".to_string(),
                field: None,
            }),
            delay: Duration::ZERO,
        }
    }
}

/// Track that replays its steps in order, repeating the last one
pub struct FakeTrack {
    id: TrackId,
    steps: Vec<Step>,
    calls: AtomicUsize,
}

impl FakeTrack {
    pub fn new(id: TrackId, steps: Vec<Step>) -> Self {
        Self {
            id,
            steps,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Track for FakeTrack {
    fn id(&self) -> TrackId {
        self.id
    }

    fn is_applicable(&self, input: &RetrievalInput) -> bool {
        match self.id {
            TrackId::Tag => !input.tag_ids.is_empty(),
            TrackId::Semantic => input.embedding.is_some(),
            TrackId::Keyword => !input.keywords.is_empty(),
        }
    }

    async fn recall(&self, _input: &RetrievalInput) -> Result<Vec<ScoredItem>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(step) = self.steps.get(call).or(self.steps.last()) else {
            return Ok(Vec::new());
        };

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        match &step.result {
            Ok(items) => Ok(items.clone()),
            Err(make_error) => Err(make_error()),
        }
    }
}

// ============================================================================
// Scorers
// ============================================================================

/// Judge that answers with a fixed reply, regardless of the request
pub struct StaticScorer {
    judgements: Vec<Judgement>,
    calls: AtomicUsize,
}

impl StaticScorer {
    pub fn new(judgements: Vec<(ItemId, f32, &str)>) -> Self {
        Self {
            judgements: judgements
                .into_iter()
                .map(|(id, score, reason)| Judgement {
                    id,
                    score,
                    reason: reason.to_string(),
                })
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for StaticScorer {
    fn name(&self) -> &str {
        "static"
    }

    async fn score(&self, _request: &ScoreRequest) -> Result<Vec<Judgement>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.judgements.clone())
    }
}

/// Judge that always errors, optionally after a delay
pub struct FailingScorer {
    error: fn() -> AppError,
    delay: Duration,
}

impl FailingScorer {
    pub fn unavailable() -> Self {
        Self {
            error: || unavailable("judge"),
            delay: Duration::ZERO,
        }
    }

    pub fn malformed() -> Self {
        Self {
            error: || AppError::InvalidJudgeOutput {
                message: "reply was not JSON".to_string(),
            },
            delay: Duration::ZERO,
        }
    }

    pub fn hanging(delay: Duration) -> Self {
        Self {
            error: || unavailable("judge"),
            delay,
        }
    }
}

#[async_trait]
impl Scorer for FailingScorer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn score(&self, _request: &ScoreRequest) -> Result<Vec<Judgement>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Err((self.error)())
    }
}
