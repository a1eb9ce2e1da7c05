//! Recommendation pipeline
//!
//! query/profile → analyzer → coordinator (parallel tracks) → merger →
//! rerank → assembler. Every stage converts its failures into
//! diagnostics, so [`Recommender::recommend`] always returns a response.

use crate::assemble::{AssemblyInput, RecommendationResponse, ResultAssembler};
use crate::merge::CandidateMerger;
use crate::model::{Query, UserProfile};
use crate::profile::{AnalyzerSettings, ProfileAnalyzer, TagMatcher};
use crate::rerank::{FusionScorer, RerankEngine, RerankSettings, Scorer};
use crate::retrieval::{KeywordTrack, RetrievalCoordinator, RetryPolicy, SemanticTrack, TagTrack, Track};
use recforge_common::config::PipelineConfig;
use recforge_common::metrics::record_recommendation;
use recforge_common::{CatalogStore, Embedder, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// External collaborators the pipeline recalls and scores through
pub struct Collaborators {
    pub catalog: Arc<dyn CatalogStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub tag_matcher: Arc<dyn TagMatcher>,
    pub embedder: Arc<dyn Embedder>,

    /// Qualitative judge; `None` ranks by fusion only
    pub judge: Option<Arc<dyn Scorer>>,
}

/// The in-process recommendation entry point
pub struct Recommender {
    analyzer: ProfileAnalyzer,
    coordinator: RetrievalCoordinator,
    merger: CandidateMerger,
    reranker: RerankEngine,
    assembler: ResultAssembler,
    deadline: Duration,
}

impl Recommender {
    /// Wire the standard three tracks from configuration
    pub fn new(config: &PipelineConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            catalog,
            vectors,
            tag_matcher,
            embedder,
            judge,
        } = collaborators;

        let analyzer = ProfileAnalyzer::new(
            tag_matcher,
            embedder,
            AnalyzerSettings::from(config),
        );

        let tracks: Vec<Arc<dyn Track>> = vec![
            Arc::new(TagTrack::new(catalog.clone(), config.track_limit)),
            Arc::new(SemanticTrack::new(vectors, config.track_limit, config.semantic_min_similarity)),
            Arc::new(KeywordTrack::new(catalog.clone(), config.track_limit)),
        ];

        let coordinator = RetrievalCoordinator::new(
            tracks,
            RetryPolicy::from(config),
        );

        let merger = CandidateMerger::new(
            catalog,
            &config.eligible_statuses,
            config.pool_cap,
            config.catalog_timeout(),
        );

        let reranker = RerankEngine::new(
            judge,
            FusionScorer::new(config.weights),
            RerankSettings::from(config),
        );

        Self::from_components(analyzer, coordinator, merger, reranker, config.pipeline_deadline())
    }

    /// Assemble from prebuilt stages
    pub fn from_components(
        analyzer: ProfileAnalyzer,
        coordinator: RetrievalCoordinator,
        merger: CandidateMerger,
        reranker: RerankEngine,
        deadline: Duration,
    ) -> Self {
        Self {
            analyzer,
            coordinator,
            merger,
            reranker,
            assembler: ResultAssembler,
            deadline,
        }
    }

    /// Produce a ranked list with diagnostics; never fails
    #[instrument(skip_all, fields(user_id = query.user_id, request_id = tracing::field::Empty))]
    pub async fn recommend(&self, query: &Query, profile: &UserProfile) -> RecommendationResponse {
        let started = Instant::now();
        let deadline = started + self.deadline;
        let request_id = Uuid::now_v7();
        tracing::Span::current().record("request_id", tracing::field::display(request_id));

        let analysis = self.analyzer.analyze(&query.raw_text, profile).await;
        let input = Arc::new(analysis.input);

        let retrieval = self.coordinator.run(Arc::clone(&input), deadline).await;

        let merge = self.merger.merge(&retrieval.results).await;

        let rerank = self.reranker.rerank(&query.raw_text, &input, &merge.pool).await;

        let elapsed = started.elapsed();
        let response = self.assembler.assemble(AssemblyInput {
            request_id,
            embedding: analysis.embedding,
            tag_resolution: analysis.tag_resolution,
            retrieval: &retrieval,
            merge: &merge,
            rerank,
            elapsed_ms: elapsed.as_millis() as u64,
        });

        record_recommendation(elapsed.as_secs_f64(), response.diagnostics.degraded);
        info!(
            ranked = response.ranked_items.len(),
            pool_size = response.diagnostics.pool_size,
            degraded = response.diagnostics.degraded,
            elapsed_ms = response.diagnostics.elapsed_ms,
            "Recommendation complete"
        );

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{TrackId, TrackOutcome};
    use crate::profile::{EmbeddingStatus, TagResolution};
    use crate::rerank::{FallbackReason, RerankPath};
    use crate::testing::{
        record, FailingScorer, FakeCatalog, FakeEmbedder, FakeTagMatcher, FakeTrack, FakeVectorStore,
        StaticScorer, Step,
    };
    use recforge_common::db::{KeywordMatch, TagMatch, VectorHit};

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    fn scripted(
        catalog: Arc<FakeCatalog>,
        tracks: Vec<FakeTrack>,
        judge: Option<Arc<dyn Scorer>>,
    ) -> Recommender {
        let config = config();
        let analyzer = ProfileAnalyzer::new(
            Arc::new(FakeTagMatcher::returning([1])),
            Arc::new(FakeEmbedder::ok(4)),
            AnalyzerSettings::from(&config),
        );
        let coordinator = RetrievalCoordinator::new(
            tracks.into_iter().map(|t| Arc::new(t) as Arc<dyn Track>).collect(),
            RetryPolicy::from(&config),
        );
        let merger = CandidateMerger::new(catalog, &config.eligible_statuses, config.pool_cap, config.catalog_timeout());
        let reranker = RerankEngine::new(
            judge,
            FusionScorer::new(config.weights),
            RerankSettings::from(&config),
        );

        Recommender::from_components(analyzer, coordinator, merger, reranker, config.pipeline_deadline())
    }

    fn scenario_tracks() -> Vec<FakeTrack> {
        vec![
            FakeTrack::new(TrackId::Tag, vec![Step::items(vec![(101, 0.9)])]),
            FakeTrack::new(TrackId::Semantic, vec![Step::items(vec![(101, 0.85), (205, 0.7)])]),
            FakeTrack::new(TrackId::Keyword, vec![Step::items(vec![(310, 0.6)])]),
        ]
    }

    fn scenario_catalog() -> Arc<FakeCatalog> {
        Arc::new(FakeCatalog::new().with_records([101, 205, 310].map(|id| record(id, "active"))))
    }

    fn query() -> Query {
        Query::new("looking for a rust compiler project", 42)
    }

    #[tokio::test]
    async fn test_scenario_with_judge_unavailable() {
        let recommender = scripted(
            scenario_catalog(),
            scenario_tracks(),
            Some(Arc::new(FailingScorer::unavailable())),
        );

        let response = recommender.recommend(&query(), &UserProfile::default()).await;

        let ids: Vec<i64> = response.ranked_items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![101, 205, 310]);

        let scores: Vec<f32> = response.ranked_items.iter().map(|i| i.fused_score).collect();
        for (score, expected) in scores.iter().zip([70.0, 28.0, 12.0]) {
            assert!((score - expected).abs() < 1e-3, "{} != {}", score, expected);
        }

        assert_eq!(response.ranked_items[0].reason, "matched via: tag, semantic");
        assert_eq!(response.diagnostics.pool_size, 3);
        assert_eq!(response.diagnostics.rerank.path, RerankPath::Fallback);
        assert_eq!(
            response.diagnostics.rerank.fallback_reason,
            Some(FallbackReason::JudgeUnavailable)
        );
        assert!(response.diagnostics.degraded);
    }

    #[tokio::test]
    async fn test_judge_ranking_wins_when_valid() {
        let judge = Arc::new(StaticScorer::new(vec![
            (101, 55.0, "good"),
            (205, 91.0, "great"),
            (310, 12.0, "weak"),
        ]));
        let recommender = scripted(scenario_catalog(), scenario_tracks(), Some(judge));

        let response = recommender.recommend(&query(), &UserProfile::default()).await;

        let ids: Vec<i64> = response.ranked_items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![205, 101, 310]);
        assert_eq!(response.diagnostics.rerank.path, RerankPath::Judge);
        assert!(!response.diagnostics.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_tracks_failing_yields_empty_response() {
        let catalog = scenario_catalog();
        let tracks = TrackId::ALL
            .iter()
            .map(|t| FakeTrack::new(*t, vec![Step::permanent_error()]))
            .collect();
        let recommender = scripted(catalog.clone(), tracks, None);

        let response = recommender.recommend(&query(), &UserProfile::default()).await;

        assert!(response.ranked_items.is_empty());
        assert!(response.diagnostics.no_signal);
        assert!(response.diagnostics.degraded);
        assert!(response
            .diagnostics
            .tracks
            .iter()
            .all(|t| t.status == TrackOutcome::Failed));
        assert_eq!(response.diagnostics.rerank.fallback_reason, Some(FallbackReason::EmptyPool));
        assert!(catalog.fetch_calls().is_empty());
    }

    #[tokio::test]
    async fn test_output_is_deterministic() {
        let run = || async {
            let judge = Arc::new(StaticScorer::new(vec![
                (101, 60.0, "a"),
                (205, 60.0, "b"),
                (310, 60.0, "c"),
            ]));
            let response = scripted(scenario_catalog(), scenario_tracks(), Some(judge))
                .recommend(&query(), &UserProfile::default())
                .await;
            serde_json::to_string(&response.ranked_items).unwrap()
        };

        assert_eq!(run().await, run().await);
    }

    #[tokio::test]
    async fn test_end_to_end_with_store_backed_tracks() {
        let catalog = Arc::new(
            FakeCatalog::new()
                .with_tag_matches(vec![
                    TagMatch { project_id: 1, matched: 2, total: 3 },
                    TagMatch { project_id: 2, matched: 1, total: 4 },
                ])
                .with_keyword_matches(vec![KeywordMatch {
                    project_id: 3,
                    title: "Rust compiler internals".to_string(),
                    description: "".to_string(),
                }])
                .with_records(vec![record(1, "active"), record(2, "draft"), record(3, "in_progress")]),
        );
        let collaborators = Collaborators {
            catalog: catalog.clone(),
            vectors: Arc::new(FakeVectorStore::returning(vec![VectorHit { id: 99, similarity: 0.9 }])),
            tag_matcher: Arc::new(FakeTagMatcher::returning([10, 11])),
            embedder: Arc::new(FakeEmbedder::failing()),
            judge: None,
        };
        let recommender = Recommender::new(&config(), collaborators);

        let response = recommender
            .recommend(&Query::new("rust compiler", 7), &UserProfile::default())
            .await;

        let ids: Vec<i64> = response.ranked_items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);

        let diagnostics = &response.diagnostics;
        assert_eq!(diagnostics.embedding, EmbeddingStatus::Unavailable);
        assert_eq!(diagnostics.tag_resolution, TagResolution::Resolved);
        assert_eq!(diagnostics.tracks[1].status, TrackOutcome::Skipped);
        assert_eq!(diagnostics.pool_size, 2);
        assert_eq!(diagnostics.rerank.fallback_reason, Some(FallbackReason::JudgeDisabled));
        assert!(diagnostics.degraded);
    }
}
