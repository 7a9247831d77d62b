use super::{CatalogStore, StoreError};
use crate::config::HIGH_FAIR_THRESHOLD;
use async_trait::async_trait;
use fairdex_api::{MetricsRollup, MonthlyCount};
use fairdex_model::{
    mean_latest_sindex, DIndexRecord, DatasetRecord, FairScore, JobDescriptor, SIndexRecord,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct FakeState {
    datasets: BTreeMap<i64, DatasetRecord>,
    jobs: BTreeSet<i64>,
    scores: HashMap<i64, FairScore>,
    dindex: Vec<DIndexRecord>,
    sindex: Vec<SIndexRecord>,
    citations: HashMap<i64, i64>,
    mentions: HashMap<i64, i64>,
}

/// In-memory store twin. Claim atomicity comes from holding the single state
/// lock for the whole select-and-remove step, matching the row-lock
/// discipline of the Postgres implementation.
#[derive(Clone, Default)]
pub struct FakeCatalogStore {
    state: Arc<Mutex<FakeState>>,
    fail_reads: Arc<AtomicBool>,
    pub claim_calls: Arc<AtomicU64>,
}

impl FakeCatalogStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_dataset(&self, dataset: DatasetRecord) {
        let mut state = self.state.lock().await;
        state.datasets.insert(dataset.id, dataset);
    }

    pub async fn enqueue_job(&self, dataset_id: i64) {
        let mut state = self.state.lock().await;
        state.jobs.insert(dataset_id);
    }

    pub async fn push_dindex(&self, record: DIndexRecord) {
        let mut state = self.state.lock().await;
        state.dindex.push(record);
    }

    pub async fn push_sindex(&self, record: SIndexRecord) {
        let mut state = self.state.lock().await;
        state.sindex.push(record);
        state.sindex.sort_by(|a, b| b.year.cmp(&a.year));
    }

    pub async fn set_citations(&self, dataset_id: i64, total: i64) {
        let mut state = self.state.lock().await;
        state.citations.insert(dataset_id, total);
    }

    pub async fn set_mentions(&self, dataset_id: i64, total: i64) {
        let mut state = self.state.lock().await;
        state.mentions.insert(dataset_id, total);
    }

    /// Makes every subsequent operation fail with `Unavailable`, simulating
    /// a store outage.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    pub async fn pending_job_count(&self) -> usize {
        self.state.lock().await.jobs.len()
    }

    pub async fn score_of(&self, dataset_id: i64) -> Option<f64> {
        self.state
            .lock()
            .await
            .scores
            .get(&dataset_id)
            .map(|s| s.score.get())
    }

    fn check_outage(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for FakeCatalogStore {
    async fn claim_jobs(&self, limit: i64) -> Result<Vec<JobDescriptor>, StoreError> {
        self.claim_calls.fetch_add(1, Ordering::Relaxed);
        self.check_outage()?;
        let mut state = self.state.lock().await;
        let take: Vec<i64> = state
            .jobs
            .iter()
            .take(limit.max(0) as usize)
            .copied()
            .collect();
        let mut out = Vec::with_capacity(take.len());
        for id in take {
            state.jobs.remove(&id);
            if let Some(dataset) = state.datasets.get(&id) {
                out.push(JobDescriptor {
                    dataset_id: id,
                    identifier: dataset.identifier.clone(),
                    identifier_type: dataset.identifier_type,
                });
            }
        }
        Ok(out)
    }

    async fn peek_jobs(&self, limit: i64) -> Result<Vec<JobDescriptor>, StoreError> {
        self.check_outage()?;
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .take(limit.max(0) as usize)
            .filter_map(|id| {
                state.datasets.get(id).map(|dataset| JobDescriptor {
                    dataset_id: *id,
                    identifier: dataset.identifier.clone(),
                    identifier_type: dataset.identifier_type,
                })
            })
            .collect())
    }

    async fn dataset(&self, id: i64) -> Result<DatasetRecord, StoreError> {
        self.check_outage()?;
        self.state
            .lock()
            .await
            .datasets
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn dataset_by_doi(&self, lookup_key: &str) -> Result<DatasetRecord, StoreError> {
        self.check_outage()?;
        self.state
            .lock()
            .await
            .datasets
            .values()
            .find(|d| d.identifier.to_ascii_lowercase() == lookup_key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn current_score(&self, dataset_id: i64) -> Result<Option<FairScore>, StoreError> {
        self.check_outage()?;
        let state = self.state.lock().await;
        if !state.datasets.contains_key(&dataset_id) {
            return Err(StoreError::NotFound);
        }
        Ok(state.scores.get(&dataset_id).cloned())
    }

    async fn upsert_score_if_improved(&self, score: &FairScore) -> Result<bool, StoreError> {
        self.check_outage()?;
        // Check and write under one lock acquisition, mirroring the single
        // guarded statement of the Postgres implementation.
        let mut state = self.state.lock().await;
        if !state.datasets.contains_key(&score.dataset_id) {
            return Err(StoreError::NotFound);
        }
        let current = state.scores.get(&score.dataset_id).map(|s| s.score);
        if !score.score.improves_on(current) {
            return Ok(false);
        }
        state.scores.insert(score.dataset_id, score.clone());
        Ok(true)
    }

    async fn delete_job(&self, dataset_id: i64) -> Result<(), StoreError> {
        self.check_outage()?;
        self.state.lock().await.jobs.remove(&dataset_id);
        Ok(())
    }

    async fn latest_dindex(&self, dataset_id: i64) -> Result<Option<DIndexRecord>, StoreError> {
        self.check_outage()?;
        let state = self.state.lock().await;
        Ok(state
            .dindex
            .iter()
            .filter(|r| r.dataset_id == dataset_id)
            .max_by_key(|r| r.created)
            .cloned())
    }

    async fn citation_total(&self, dataset_id: i64) -> Result<i64, StoreError> {
        self.check_outage()?;
        Ok(*self
            .state
            .lock()
            .await
            .citations
            .get(&dataset_id)
            .unwrap_or(&0))
    }

    async fn mention_total(&self, dataset_id: i64) -> Result<i64, StoreError> {
        self.check_outage()?;
        Ok(*self
            .state
            .lock()
            .await
            .mentions
            .get(&dataset_id)
            .unwrap_or(&0))
    }

    async fn sindex_rows(&self) -> Result<Vec<SIndexRecord>, StoreError> {
        self.check_outage()?;
        Ok(self.state.lock().await.sindex.clone())
    }

    async fn metrics_rollup(&self) -> Result<MetricsRollup, StoreError> {
        self.check_outage()?;
        let state = self.state.lock().await;
        let scored: Vec<f64> = state.scores.values().map(|s| s.score.get()).collect();
        let average_fair_score = if scored.is_empty() {
            None
        } else {
            Some(scored.iter().sum::<f64>() / scored.len() as f64)
        };
        let mut months: BTreeMap<String, i64> = BTreeMap::new();
        for dataset in state.datasets.values() {
            if let Some(date) = dataset.published_at {
                *months.entry(date.format("%Y-%m").to_string()).or_insert(0) += 1;
            }
        }
        Ok(MetricsRollup {
            dataset_count: state.datasets.len() as i64,
            scored_count: scored.len() as i64,
            high_fair_count: scored.iter().filter(|s| **s >= HIGH_FAIR_THRESHOLD).count() as i64,
            cited_count: state.citations.values().filter(|c| **c > 0).count() as i64,
            average_fair_score,
            average_s_index: mean_latest_sindex(&state.sindex),
            monthly_publications: months
                .into_iter()
                .map(|(month, count)| MonthlyCount { month, count })
                .collect(),
        })
    }

    async fn unscored_dataset_ids(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>, StoreError> {
        self.check_outage()?;
        let state = self.state.lock().await;
        Ok(state
            .datasets
            .keys()
            .filter(|id| **id > after_id && !state.scores.contains_key(id))
            .take(limit.max(0) as usize)
            .copied()
            .collect())
    }

    async fn insert_jobs(&self, dataset_ids: &[i64]) -> Result<u64, StoreError> {
        self.check_outage()?;
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for id in dataset_ids {
            if state.jobs.insert(*id) {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
