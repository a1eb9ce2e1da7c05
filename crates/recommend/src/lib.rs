//! RecForge recommendation pipeline
//!
//! Recommends catalog projects from free-text intent:
//! - Profile analysis (tags, keywords, query embedding)
//! - Concurrent tag, semantic and keyword recall
//! - Deduplicating candidate merge with provenance
//! - Judged rerank with deterministic fusion fallback
//! - Ranked output with diagnostics
//!
//! [`Recommender::recommend`] never fails: unavailable signal sources
//! are reported in the diagnostics instead.

pub mod assemble;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod rerank;
pub mod retrieval;
pub mod session;

#[cfg(test)]
mod testing;

pub use assemble::{Diagnostics, RecommendationResponse};
pub use model::{Query, RankedItem, UserProfile};
pub use pipeline::{Collaborators, Recommender};
pub use session::{InMemorySessionStore, RedisSessionStore, SessionState, SessionStore};
