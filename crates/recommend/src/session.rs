//! Session store boundary
//!
//! Keeps a user's profile and last recommendation between invocations.
//! The surrounding layer loads a session before calling the pipeline and
//! saves it afterwards; the pipeline itself never touches the store.
//!
//! Two implementations:
//! - [`RedisSessionStore`]: Redis with server-side expiry
//! - [`InMemorySessionStore`]: process-local map, expiry checked on read

use crate::model::{ItemId, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use recforge_common::cache::{keys, Cache};
use recforge_common::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Per-session state persisted between invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: Uuid,
    pub user_id: i64,
    pub profile: UserProfile,

    #[serde(default)]
    pub last_query: Option<String>,

    /// Ids of the last ranked list, best first
    #[serde(default)]
    pub last_recommendations: Vec<ItemId>,

    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionState {
    /// Start a new session
    pub fn new(user_id: i64, profile: UserProfile, ttl_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            profile,
            last_query: None,
            last_recommendations: Vec::new(),
            created_at: now,
            last_active_at: now,
            expires_at: now + ttl(ttl_secs),
        }
    }

    /// Record a finished turn and push the expiry forward
    pub fn record_turn(&mut self, query: &str, recommended: Vec<ItemId>, ttl_secs: u64) {
        let now = Utc::now();
        self.last_query = Some(query.to_string());
        self.last_recommendations = recommended;
        self.last_active_at = now;
        self.expires_at = now + ttl(ttl_secs);
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Longest honoured TTL, ten years
const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

fn ttl(secs: u64) -> ChronoDuration {
    ChronoDuration::seconds(secs.min(MAX_TTL_SECS) as i64)
}

/// Keyed session storage with explicit TTL lifecycle
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live session; expired or unknown ids yield `None`
    async fn load(&self, id: Uuid) -> Result<Option<SessionState>>;

    /// Save, refreshing the TTL
    async fn save(&self, state: &SessionState) -> Result<()>;

    /// Remove a session; returns whether one existed
    async fn clear(&self, id: Uuid) -> Result<bool>;
}

/// Redis-backed sessions
pub struct RedisSessionStore {
    cache: Arc<Cache>,
    ttl_secs: u64,
}

impl RedisSessionStore {
    pub fn new(cache: Arc<Cache>, ttl_secs: u64) -> Self {
        Self { cache, ttl_secs }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<SessionState>> {
        let state: Option<SessionState> = self.cache.get(&keys::session(id)).await?;
        Ok(state.filter(|s| !s.is_expired()))
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        self.cache
            .set_with_ttl(&keys::session(state.id), state, self.ttl_secs)
            .await
    }

    async fn clear(&self, id: Uuid) -> Result<bool> {
        self.cache.delete(&keys::session(id)).await
    }
}

/// Process-local sessions for hosts that keep the pipeline resident;
/// they do not outlive the process
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<Uuid, SessionState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired sessions; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        before - sessions.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: Uuid) -> Result<Option<SessionState>> {
        let sessions = self.sessions.read().await;
        match sessions.get(&id) {
            Some(state) if state.is_expired() => {
                debug!(session_id = %id, "Session expired");
                Ok(None)
            }
            other => Ok(other.cloned()),
        }
    }

    async fn save(&self, state: &SessionState) -> Result<()> {
        self.sessions.write().await.insert(state.id, state.clone());
        Ok(())
    }

    async fn clear(&self, id: Uuid) -> Result<bool> {
        Ok(self.sessions.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn profile() -> UserProfile {
        UserProfile {
            interest_tag_ids: [1, 2].into_iter().collect(),
            skill_tag_ids: [7].into_iter().collect(),
        }
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = InMemorySessionStore::new();
        let mut state = SessionState::new(42, profile(), 3600);
        state.record_turn("rust compilers", vec![101, 205], 3600);

        assert_ok!(store.save(&state).await);
        let loaded = assert_ok!(store.load(state.id).await).unwrap();

        assert_eq!(loaded, state);
        assert_eq!(loaded.last_recommendations, vec![101, 205]);
    }

    #[tokio::test]
    async fn test_expired_session_is_not_loaded() {
        let store = InMemorySessionStore::new();
        let mut state = SessionState::new(42, profile(), 3600);
        state.expires_at = Utc::now() - ChronoDuration::seconds(1);

        assert_ok!(store.save(&state).await);

        assert!(assert_ok!(store.load(state.id).await).is_none());
        assert_eq!(store.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let store = InMemorySessionStore::new();
        let state = SessionState::new(42, profile(), 3600);
        assert_ok!(store.save(&state).await);

        assert!(assert_ok!(store.clear(state.id).await));
        assert!(!assert_ok!(store.clear(state.id).await));
        assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[test]
    fn test_record_turn_extends_expiry() {
        let mut state = SessionState::new(1, UserProfile::default(), 10);
        let first_expiry = state.expires_at;

        state.record_turn("q", vec![3], 3600);

        assert!(state.expires_at > first_expiry);
        assert_eq!(state.last_query.as_deref(), Some("q"));
    }

    #[test]
    fn test_state_json_roundtrip() {
        let state = SessionState::new(9, profile(), 60);
        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
