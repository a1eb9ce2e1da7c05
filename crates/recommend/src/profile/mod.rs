//! Profile analysis
//!
//! Turns the raw query and known profile into [`RetrievalInput`]:
//! - Tag resolution through a [`TagMatcher`] (falls back to the profile's tags)
//! - Local keyword extraction (cannot fail)
//! - Query embedding (absent on failure or timeout)
//!
//! The query is embedded once, under its own timeout; tag resolution
//! reuses that embedding under a separate timeout. A failed embedding
//! degrades tag resolution to the profile's tags.

mod keywords;
mod tags;

pub use keywords::extract_keywords;
pub use tags::{TagMatcher, VectorTagMatcher};

use crate::model::{RetrievalInput, UserProfile};
use recforge_common::config::PipelineConfig;
use recforge_common::Embedder;
use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{instrument, warn};

/// Outcome of tag resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagResolution {
    /// Matcher answered
    Resolved,
    /// Matcher failed or timed out; profile tags used as-is
    Degraded,
}

/// Outcome of the query embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStatus {
    Available,
    Unavailable,
}

/// Analyzer output: retrieval input plus degradation flags
#[derive(Debug, Clone)]
pub struct Analysis {
    pub input: RetrievalInput,
    pub tag_resolution: TagResolution,
    pub embedding: EmbeddingStatus,
}

/// Analyzer settings
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub tag_timeout: Duration,
    pub embedding_timeout: Duration,
    pub max_keywords: usize,
    pub max_query_chars: usize,
}

impl From<&PipelineConfig> for AnalyzerSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            tag_timeout: config.tag_timeout(),
            embedding_timeout: config.embedding_timeout(),
            max_keywords: config.max_keywords,
            max_query_chars: config.max_query_chars,
        }
    }
}

/// Builds retrieval inputs from a query and profile
pub struct ProfileAnalyzer {
    tag_matcher: Arc<dyn TagMatcher>,
    embedder: Arc<dyn Embedder>,
    settings: AnalyzerSettings,
}

impl ProfileAnalyzer {
    pub fn new(
        tag_matcher: Arc<dyn TagMatcher>,
        embedder: Arc<dyn Embedder>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            tag_matcher,
            embedder,
            settings,
        }
    }

    /// Analyze a query; never fails, degraded steps are flagged instead
    #[instrument(skip_all, fields(chars = raw_text.len()))]
    pub async fn analyze(&self, raw_text: &str, profile: &UserProfile) -> Analysis {
        let text = truncate_chars(raw_text.trim(), self.settings.max_query_chars);
        let known = profile.known_tag_ids();

        let keywords = extract_keywords(text, self.settings.max_keywords);

        let embedding = self.embed(text).await;
        let (tag_ids, tag_resolution) = self.resolve_tags(text, embedding.as_deref(), &known).await;

        let embedding_status = if embedding.is_some() {
            EmbeddingStatus::Available
        } else {
            EmbeddingStatus::Unavailable
        };

        Analysis {
            input: RetrievalInput {
                tag_ids,
                keywords,
                embedding,
            },
            tag_resolution,
            embedding: embedding_status,
        }
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if text.is_empty() {
            return None;
        }
        match timeout(self.settings.embedding_timeout, self.embedder.embed(text)).await {
            Ok(Ok(vector)) if is_usable(&vector) => Some(vector),
            Ok(Ok(_)) => {
                warn!("Embedding contained no usable values");
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Embedding failed, semantic track will be skipped");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.settings.embedding_timeout.as_millis() as u64,
                    "Embedding timed out, semantic track will be skipped"
                );
                None
            }
        }
    }

    async fn resolve_tags(
        &self,
        text: &str,
        embedding: Option<&[f32]>,
        known: &BTreeSet<i64>,
    ) -> (BTreeSet<i64>, TagResolution) {
        let matched = timeout(self.settings.tag_timeout, self.tag_matcher.match_tags(text, embedding, known)).await;
        match matched {
            Ok(Ok(tags)) => (tags, TagResolution::Resolved),
            Ok(Err(e)) => {
                warn!(error = %e, "Tag resolution failed, using profile tags");
                (known.clone(), TagResolution::Degraded)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.settings.tag_timeout.as_millis() as u64,
                    "Tag resolution timed out, using profile tags"
                );
                (known.clone(), TagResolution::Degraded)
            }
        }
    }
}

fn is_usable(vector: &[f32]) -> bool {
    !vector.is_empty() && vector.iter().all(|v| v.is_finite())
}

/// Truncate to at most `max` characters on a char boundary
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
