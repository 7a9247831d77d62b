use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One D-Index observation for a dataset. Readers want "latest per dataset";
/// history is kept for trend charts only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DIndexRecord {
    pub dataset_id: i64,
    pub score: f64,
    pub created: DateTime<Utc>,
}

/// Precomputed S-Index for an organization or user in a given year. These
/// rows are the authoritative source; nothing recomputes them at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SIndexRecord {
    pub entity_id: i64,
    pub entity_name: String,
    pub year: i32,
    pub score: f64,
}

/// Keeps the first row per entity from a slice already sorted year-descending,
/// i.e. each entity's most recent precomputed score.
#[must_use]
pub fn latest_per_entity(rows: &[SIndexRecord]) -> Vec<SIndexRecord> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|r| seen.insert(r.entity_id))
        .cloned()
        .collect()
}

/// Mean of latest-per-entity precomputed scores. `None` when no rows exist.
#[must_use]
pub fn mean_latest_sindex(rows: &[SIndexRecord]) -> Option<f64> {
    let latest = latest_per_entity(rows);
    if latest.is_empty() {
        return None;
    }
    let sum: f64 = latest.iter().map(|r| r.score).sum();
    Some(sum / latest.len() as f64)
}
