//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for the recommendation pipeline
//! with standardized naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all RecForge metrics
pub const METRICS_PREFIX: &str = "recforge";

/// Histogram buckets for pipeline stage latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    3.000,  // 3s - track timeout
    5.000,  // 5s
    8.000,  // 8s - pipeline deadline
    15.00,  // 15s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Retrieval metrics
    describe_counter!(
        format!("{}_track_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Retrieval track executions by outcome"
    );

    describe_histogram!(
        format!("{}_track_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval track latency including retries"
    );

    // Rerank metrics
    describe_counter!(
        format!("{}_rerank_total", METRICS_PREFIX),
        Unit::Count,
        "Rerank passes by path (judge or fallback)"
    );

    // Recommendation metrics
    describe_counter!(
        format!("{}_recommendations_total", METRICS_PREFIX),
        Unit::Count,
        "Recommendation requests served"
    );

    describe_histogram!(
        format!("{}_recommendation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end recommendation latency"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Record one retrieval track execution
pub fn record_track(track: &str, outcome: &str, duration_secs: f64) {
    counter!(
        format!("{}_track_requests_total", METRICS_PREFIX),
        "track" => track.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_track_duration_seconds", METRICS_PREFIX),
        "track" => track.to_string()
    )
    .record(duration_secs);
}

/// Record which rerank path produced the final ordering
pub fn record_rerank(path: &str, reason: Option<&str>) {
    counter!(
        format!("{}_rerank_total", METRICS_PREFIX),
        "path" => path.to_string(),
        "reason" => reason.unwrap_or("none").to_string()
    )
    .increment(1);
}

/// Record a completed recommendation request
pub fn record_recommendation(duration_secs: f64, degraded: bool) {
    counter!(
        format!("{}_recommendations_total", METRICS_PREFIX),
        "degraded" => degraded.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_recommendation_duration_seconds", METRICS_PREFIX)
    )
    .record(duration_secs);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    if hit {
        counter!(
            format!("{}_cache_hits_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    } else {
        counter!(
            format!("{}_cache_misses_total", METRICS_PREFIX),
            "cache" => cache_name.to_string()
        )
        .increment(1);
    }
}
