//! Concurrent track execution
//!
//! Fan-out/fan-in over the configured tracks:
//! - every applicable track is spawned onto its own task
//! - each attempt runs under the per-track timeout, with a bounded
//!   number of retries on transient failures
//! - this function is the single collector; tracks never share state
//! - the pipeline deadline aborts whatever is still running
//!
//! Results are keyed by [`TrackId`] so the returned list is always in
//! canonical order regardless of completion order.

use super::Track;
use crate::model::{RetrievalInput, TrackId, TrackOutcome, TrackResult};
use recforge_common::config::PipelineConfig;
use recforge_common::errors::AppError;
use recforge_common::metrics::record_track;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Per-track timeout and retry settings
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Timeout for a single attempt
    pub attempt_timeout: Duration,

    /// Additional attempts after a transient failure
    pub retries: u32,

    /// Pause between attempts
    pub backoff: Duration,
}

impl From<&PipelineConfig> for RetryPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            attempt_timeout: config.track_timeout(),
            retries: config.track_retries,
            backoff: config.retry_backoff(),
        }
    }
}

/// Collected track results
#[derive(Debug, Clone)]
pub struct CoordinatorOutput {
    /// One result per configured track, canonical order
    pub results: Vec<TrackResult>,

    /// No track completed: nothing to merge
    pub no_signal: bool,

    /// The pipeline deadline expired with tracks still in flight
    pub deadline_exceeded: bool,
}

/// Runs retrieval tracks concurrently
pub struct RetrievalCoordinator {
    tracks: Vec<Arc<dyn Track>>,
    policy: RetryPolicy,
}

impl RetrievalCoordinator {
    pub fn new(tracks: Vec<Arc<dyn Track>>, policy: RetryPolicy) -> Self {
        Self { tracks, policy }
    }

    /// Run every track and collect results until all finish or `deadline` passes
    #[instrument(skip_all, fields(tracks = self.tracks.len()))]
    pub async fn run(&self, input: Arc<RetrievalInput>, deadline: Instant) -> CoordinatorOutput {
        let mut results: BTreeMap<TrackId, TrackResult> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for track in &self.tracks {
            if !track.is_applicable(&input) {
                debug!(track = %track.id(), "Track not applicable, skipping");
                results.insert(track.id(), TrackResult::skipped(track.id()));
                continue;
            }

            let track = Arc::clone(track);
            let input = Arc::clone(&input);
            let policy = self.policy;
            tasks.spawn(async move { run_track(track, input, policy).await });
        }

        let mut deadline_exceeded = false;

        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(result))) => {
                    results.insert(result.track, result);
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "Retrieval task panicked");
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_exceeded = true;
                    warn!(in_flight = tasks.len(), "Pipeline deadline reached, cancelling tracks");
                    tasks.abort_all();
                    break;
                }
            }
        }

        // Anything without a result was cancelled at the deadline or panicked
        for track in &self.tracks {
            let id = track.id();
            results.entry(id).or_insert_with(|| {
                if deadline_exceeded {
                    record_track(id.as_str(), TrackOutcome::Cancelled.as_str(), 0.0);
                    TrackResult::failed(id, TrackOutcome::Cancelled, 0, 0, "cancelled at pipeline deadline")
                } else {
                    TrackResult::failed(id, TrackOutcome::Failed, 0, 0, "retrieval task panicked")
                }
            });
        }

        let results: Vec<TrackResult> = results.into_values().collect();
        let no_signal = !results.iter().any(|r| r.outcome == TrackOutcome::Completed);

        info!(
            completed = results.iter().filter(|r| r.outcome == TrackOutcome::Completed).count(),
            no_signal,
            deadline_exceeded,
            "Retrieval finished"
        );

        CoordinatorOutput {
            results,
            no_signal,
            deadline_exceeded,
        }
    }
}

/// Run one track with per-attempt timeout and transient retry
async fn run_track(track: Arc<dyn Track>, input: Arc<RetrievalInput>, policy: RetryPolicy) -> TrackResult {
    let id = track.id();
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        let (outcome, error, transient) = match timeout(policy.attempt_timeout, track.recall(&input)).await {
            Ok(Ok(items)) => {
                let elapsed = started.elapsed();
                debug!(track = %id, items = items.len(), attempts, "Track completed");
                record_track(id.as_str(), TrackOutcome::Completed.as_str(), elapsed.as_secs_f64());
                return TrackResult::completed(id, items, attempts, elapsed.as_millis() as u64);
            }
            Ok(Err(e)) => (TrackOutcome::Failed, e.to_string(), e.is_transient()),
            Err(_) => {
                let e = AppError::UpstreamTimeout {
                    service: id.as_str().to_string(),
                    timeout_ms: policy.attempt_timeout.as_millis() as u64,
                };
                (TrackOutcome::TimedOut, e.to_string(), e.is_transient())
            }
        };

        if transient && attempts <= policy.retries {
            warn!(track = %id, attempt = attempts, error = %error, "Track attempt failed, retrying");
            tokio::time::sleep(policy.backoff).await;
            continue;
        }

        let elapsed = started.elapsed();
        warn!(track = %id, attempts, outcome = outcome.as_str(), error = %error, "Track failed");
        record_track(id.as_str(), outcome.as_str(), elapsed.as_secs_f64());
        return TrackResult::failed(id, outcome, attempts, elapsed.as_millis() as u64, error);
    }
}
