//! RecForge recommend CLI
//!
//! Wires production collaborators from configuration and runs one
//! recommendation:
//!
//! ```text
//! recommend <user_id> <query...> [--session <uuid>]
//! ```
//!
//! The profile comes from the session when one is given and still live,
//! otherwise from the user's stored tags. The JSON response is printed
//! to stdout with the `session_id` to pass on the next call, and the
//! session is saved with the new recommendation. Sessions need Redis;
//! without it each call starts fresh and nothing is persisted.

use anyhow::{bail, Context};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use recforge_common::cache::{Cache, CacheConfig};
use recforge_common::config::AppConfig;
use recforge_common::db::DbPool;
use recforge_common::embeddings::{create_embedder, CachedEmbedder};
use recforge_common::llm::ChatClient;
use recforge_common::metrics::{register_metrics, LATENCY_BUCKETS};
use recforge_common::{Embedder, Repository, VERSION};
use recforge_recommend::profile::VectorTagMatcher;
use recforge_recommend::rerank::{LlmJudge, Scorer};
use recforge_recommend::{
    Collaborators, Query, Recommender, RedisSessionStore, SessionState, SessionStore, UserProfile,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

struct Args {
    user_id: i64,
    query: String,
    session: Option<Uuid>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut args = args.into_iter();
    let mut session = None;
    let mut words = Vec::new();

    let user_id = args
        .next()
        .context("usage: recommend <user_id> <query...> [--session <uuid>]")?
        .parse::<i64>()
        .context("user_id must be an integer")?;

    while let Some(arg) = args.next() {
        if arg == "--session" {
            let value = args.next().context("--session needs a value")?;
            session = Some(Uuid::parse_str(&value).context("--session must be a UUID")?);
        } else {
            words.push(arg);
        }
    }

    if words.is_empty() {
        bail!("query text is required");
    }

    Ok(Args {
        user_id,
        query: words.join(" "),
        session,
    })
}

/// Response printed to stdout
#[derive(Serialize)]
struct Output<'a, T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<Uuid>,

    #[serde(flatten)]
    response: &'a T,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.pretty().init();
    }
}

fn init_metrics(port: u16) -> anyhow::Result<()> {
    register_metrics();

    if port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(Matcher::Suffix("duration_seconds".to_string()), LATENCY_BUCKETS)?
        .install()
        .context("failed to install Prometheus exporter")?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = parse_args(std::env::args().skip(1))?;

    // Load configuration
    let config = AppConfig::load().context("failed to load configuration")?;
    config.validate()?;

    init_tracing(&config);
    info!("Starting RecForge recommend v{}", VERSION);

    init_metrics(config.observability.metrics_port)?;

    // Stores
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Arc::new(Repository::new(db));

    let cache = match CacheConfig::from_redis(&config.redis) {
        Some(cache_config) => match Cache::new(cache_config).await {
            Ok(cache) => Some(Arc::new(cache)),
            Err(e) => {
                warn!(error = %e, "Redis unavailable, continuing without cache");
                None
            }
        },
        None => None,
    };

    // Embeddings
    let mut embedder: Arc<dyn Embedder> = create_embedder(&config.embedding)?;
    if let (true, Some(cache)) = (config.embedding.cache_enabled, &cache) {
        embedder = Arc::new(CachedEmbedder::new(embedder, cache.clone(), config.redis.default_ttl_secs));
    }

    // Judge
    let judge: Option<Arc<dyn Scorer>> = if config.judge_enabled() {
        let client = ChatClient::new(&config.judge, config.pipeline.judge_timeout())?;
        Some(Arc::new(LlmJudge::new(Arc::new(client))))
    } else {
        info!("Judge disabled, ranking by fusion only");
        None
    };

    let recommender = Recommender::new(
        &config.pipeline,
        Collaborators {
            catalog: repository.clone(),
            vectors: repository.clone(),
            tag_matcher: Arc::new(VectorTagMatcher::new(
                repository.clone(),
                config.tags.per_kind_limit,
                config.tags.min_similarity,
            )),
            embedder,
            judge,
        },
    );

    // Sessions
    let sessions: Option<Arc<dyn SessionStore>> = match &cache {
        Some(cache) => Some(Arc::new(RedisSessionStore::new(cache.clone(), config.session.ttl_secs)) as Arc<dyn SessionStore>),
        None => {
            warn!("Redis unavailable, sessions will not be persisted");
            None
        }
    };

    let existing = match (args.session, &sessions) {
        (Some(id), Some(store)) => store.load(id).await?.filter(|s| s.user_id == args.user_id),
        (Some(id), None) => {
            warn!(session_id = %id, "Cannot resume session without Redis");
            None
        }
        (None, _) => None,
    };

    let mut session = match existing {
        Some(session) => session,
        None => {
            let tags = repository.load_user_profile(args.user_id).await?;
            let profile = UserProfile {
                interest_tag_ids: tags.interest,
                skill_tag_ids: tags.skill,
            };
            SessionState::new(args.user_id, profile, config.session.ttl_secs)
        }
    };

    let query = Query::new(args.query, args.user_id);
    let response = recommender.recommend(&query, &session.profile).await;

    let output = Output {
        session_id: sessions.as_ref().map(|_| session.id),
        response: &response,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    let Some(store) = sessions else {
        return Ok(());
    };

    session.record_turn(
        &query.raw_text,
        response.ranked_items.iter().map(|item| item.id).collect(),
        config.session.ttl_secs,
    );
    store.save(&session).await?;

    info!(session_id = %session.id, "Session saved");
    Ok(())
}
