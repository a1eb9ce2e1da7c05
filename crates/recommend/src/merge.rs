//! Candidate merging
//!
//! Single deterministic pass over the collected track results:
//! 1. Collect provenance per item (sources, best score per track)
//! 2. Fetch every referenced project once from the catalog
//! 3. Drop ineligible statuses
//! 4. Cap the pool by best track score (desc), then id (asc)

use crate::model::{CandidatePool, CandidateProject, ItemId, TrackId, TrackResult};
use recforge_common::db::models::ProjectStatus;
use recforge_common::db::ProjectRecord;
use recforge_common::errors::AppError;
use recforge_common::CatalogStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Where an item came from and how well each track scored it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Provenance {
    pub sources: BTreeSet<TrackId>,
    pub track_scores: BTreeMap<TrackId, f32>,
}

/// Merge output with bookkeeping for diagnostics
#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    pub pool: CandidatePool,

    /// The catalog fetch failed; the pool is empty
    pub catalog_unavailable: bool,

    /// Items dropped for an ineligible status
    pub ineligible: usize,

    /// Items the catalog no longer knows about
    pub missing: usize,

    /// Items dropped by the pool cap
    pub over_cap: usize,
}

/// Deduplicates track results into a capped, eligible candidate pool
pub struct CandidateMerger {
    catalog: Arc<dyn CatalogStore>,
    eligible_statuses: BTreeSet<String>,
    pool_cap: usize,
    fetch_timeout: Duration,
}

impl CandidateMerger {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        eligible_statuses: &[String],
        pool_cap: usize,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            eligible_statuses: eligible_statuses
                .iter()
                .map(|s| s.trim().to_ascii_lowercase())
                .collect(),
            pool_cap,
            fetch_timeout,
        }
    }

    /// Merge track results into the candidate pool
    #[instrument(skip_all, fields(tracks = results.len()))]
    pub async fn merge(&self, results: &[TrackResult]) -> MergeOutput {
        let provenance = collect_provenance(results);
        if provenance.is_empty() {
            return MergeOutput::default();
        }

        let ids: BTreeSet<ItemId> = provenance.keys().copied().collect();

        let fetched = timeout(self.fetch_timeout, self.catalog.fetch_by_ids(&ids))
            .await
            .unwrap_or_else(|_| {
                Err(AppError::UpstreamTimeout {
                    service: "catalog".to_string(),
                    timeout_ms: self.fetch_timeout.as_millis() as u64,
                })
            });

        let records = match fetched {
            Ok(records) => records,
            Err(e) => {
                warn!(code = e.code().as_code(), error = %e, items = ids.len(), "Catalog fetch failed, pool is empty");
                return MergeOutput { catalog_unavailable: true, ..Default::default() };
            }
        };

        let output = build_pool(provenance, records, &self.eligible_statuses, self.pool_cap);

        debug!(
            pool = output.pool.len(),
            ineligible = output.ineligible,
            missing = output.missing,
            over_cap = output.over_cap,
            "Candidate pool built"
        );

        output
    }
}

/// Union sources and keep the maximum score per (item, track).
///
/// Only succeeded tracks contribute; iteration is in canonical order.
pub fn collect_provenance(results: &[TrackResult]) -> BTreeMap<ItemId, Provenance> {
    let mut ordered: Vec<&TrackResult> = results.iter().filter(|r| r.succeeded()).collect();
    ordered.sort_by_key(|r| r.track);

    let mut provenance: BTreeMap<ItemId, Provenance> = BTreeMap::new();

    for result in ordered {
        for item in &result.items {
            let entry = provenance.entry(item.id).or_default();
            entry.sources.insert(result.track);
            entry.track_scores
                .entry(result.track)
                .and_modify(|s| *s = s.max(item.score))
                .or_insert(item.score);
        }
    }

    provenance
}

/// Attach provenance to fetched records, filter by status and cap
pub fn build_pool(
    mut provenance: BTreeMap<ItemId, Provenance>,
    records: Vec<ProjectRecord>,
    eligible_statuses: &BTreeSet<String>,
    pool_cap: usize,
) -> MergeOutput {
    let requested = provenance.len();
    let mut output = MergeOutput::default();
    let mut candidates: Vec<CandidateProject> = Vec::with_capacity(records.len());

    for record in records {
        // Duplicate rows from the store are ignored after the first
        let Some(prov) = provenance.remove(&record.id) else {
            continue;
        };

        if !eligible_statuses.contains(ProjectStatus::from(record.status.as_str()).as_str()) {
            output.ineligible += 1;
            continue;
        }

        let mut candidate = CandidateProject::from_record(record);
        candidate.sources = prov.sources;
        candidate.track_scores = prov.track_scores;
        candidates.push(candidate);
    }

    output.missing = requested - output.ineligible - candidates.len();

    candidates.sort_by(|a, b| {
        b.best_track_score()
            .total_cmp(&a.best_track_score())
            .then(a.id.cmp(&b.id))
    });

    if candidates.len() > pool_cap {
        output.over_cap = candidates.len() - pool_cap;
        candidates.truncate(pool_cap);
    }

    output.pool = candidates.into_iter().map(|c| (c.id, c)).collect();
    output
}
