use crate::store::{CatalogStore, StoreError};
use crate::telemetry::{ActivityTracker, RequestMetrics};
use fairdex_api::ValidatedResult;
use fairdex_model::FairScore;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub updated: u64,
    pub duplicates: u64,
    pub missing: Vec<i64>,
}

/// Applies a validated worker batch item by item. Items are independent: a
/// missing dataset or a stale score never blocks its neighbors. Only a store
/// outage aborts the batch, and by then every earlier item is already
/// durable. The monotonic acceptance rule lives in the store's atomic
/// guarded upsert, so concurrent batches cannot regress a score.
pub async fn reconcile_results(
    store: &dyn CatalogStore,
    activity: &ActivityTracker,
    metrics: &RequestMetrics,
    actor: &str,
    items: &[ValidatedResult],
) -> Result<ReconcileOutcome, StoreError> {
    let mut outcome = ReconcileOutcome::default();
    for item in items {
        let score = FairScore {
            dataset_id: item.dataset_id,
            score: item.score,
            evaluation_date: item.evaluation_date,
            metric_version: item.metric_version.clone(),
            software_version: item.software_version.clone(),
        };
        match store.upsert_score_if_improved(&score).await {
            Ok(true) => {
                store.delete_job(item.dataset_id).await?;
                outcome.updated += 1;
            }
            Ok(false) => {
                debug!(
                    dataset_id = item.dataset_id,
                    score = item.score.get(),
                    "score does not improve on stored value, skipping"
                );
                outcome.duplicates += 1;
            }
            Err(StoreError::NotFound) => outcome.missing.push(item.dataset_id),
            Err(e) => return Err(e),
        }
    }

    metrics
        .results_updated_total
        .fetch_add(outcome.updated, Ordering::Relaxed);
    metrics
        .results_duplicate_total
        .fetch_add(outcome.duplicates, Ordering::Relaxed);
    metrics
        .results_missing_total
        .fetch_add(outcome.missing.len() as u64, Ordering::Relaxed);
    if outcome.updated > 0 {
        activity.record("score-update", actor, outcome.updated).await;
    }
    if outcome.duplicates > 0 {
        activity
            .record("score-duplicate", actor, outcome.duplicates)
            .await;
    }
    info!(
        actor,
        updated = outcome.updated,
        duplicates = outcome.duplicates,
        missing = outcome.missing.len(),
        "reconciled result batch"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeCatalogStore;
    use chrono::NaiveDate;
    use fairdex_model::{DatasetRecord, IdentifierType, ScoreValue};
    use std::time::Duration;

    fn dataset(id: i64) -> DatasetRecord {
        DatasetRecord {
            id,
            identifier: format!("10.5281/zenodo.{id}"),
            identifier_type: IdentifierType::Doi,
            title: None,
            publisher: None,
            authors: Vec::new(),
            subjects: Vec::new(),
            published_at: None,
        }
    }

    fn result(dataset_id: i64, score: f64) -> ValidatedResult {
        ValidatedResult {
            dataset_id,
            score: ScoreValue::parse(score).unwrap(),
            evaluation_date: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
            metric_version: "metrics_v0.5".to_string(),
            software_version: "fuji-3.4.1".to_string(),
        }
    }

    fn harness() -> (ActivityTracker, RequestMetrics) {
        (
            ActivityTracker::memory(Duration::from_secs(600)),
            RequestMetrics::default(),
        )
    }

    #[tokio::test]
    async fn scores_only_move_upward() {
        let store = FakeCatalogStore::new();
        store.insert_dataset(dataset(1)).await;
        let (activity, metrics) = harness();
        let sequence = [60.0, 55.0, 80.0, 80.0, 40.0];
        let mut updated = 0;
        let mut duplicates = 0;
        for score in sequence {
            let outcome =
                reconcile_results(&store, &activity, &metrics, "worker-a", &[result(1, score)])
                    .await
                    .unwrap();
            updated += outcome.updated;
            duplicates += outcome.duplicates;
        }
        assert_eq!(store.score_of(1).await, Some(80.0));
        assert_eq!(updated, 2);
        assert_eq!(duplicates, 3);
        assert_eq!(activity.query("score-update", None).await.total, 2);
        assert_eq!(activity.query("score-duplicate", None).await.total, 3);
    }

    #[tokio::test]
    async fn accepted_result_retires_pending_job() {
        let store = FakeCatalogStore::new();
        store.insert_dataset(dataset(1)).await;
        store.enqueue_job(1).await;
        let (activity, metrics) = harness();
        reconcile_results(&store, &activity, &metrics, "worker-a", &[result(1, 70.0)])
            .await
            .unwrap();
        assert_eq!(store.pending_job_count().await, 0);
    }

    #[tokio::test]
    async fn replay_is_idempotent() {
        let store = FakeCatalogStore::new();
        store.insert_dataset(dataset(1)).await;
        let (activity, metrics) = harness();
        let batch = [result(1, 70.0)];
        let first = reconcile_results(&store, &activity, &metrics, "w", &batch)
            .await
            .unwrap();
        let second = reconcile_results(&store, &activity, &metrics, "w", &batch)
            .await
            .unwrap();
        assert_eq!(first.updated, 1);
        assert_eq!(second.updated, 0);
        assert_eq!(second.duplicates, 1);
        assert_eq!(store.score_of(1).await, Some(70.0));
    }

    #[tokio::test]
    async fn missing_dataset_does_not_block_neighbors() {
        let store = FakeCatalogStore::new();
        store.insert_dataset(dataset(1)).await;
        store.insert_dataset(dataset(3)).await;
        let (activity, metrics) = harness();
        let outcome = reconcile_results(
            &store,
            &activity,
            &metrics,
            "w",
            &[result(1, 50.0), result(2, 60.0), result(3, 70.0)],
        )
        .await
        .unwrap();
        assert_eq!(outcome.updated, 2);
        assert_eq!(outcome.missing, vec![2]);
        assert_eq!(store.score_of(1).await, Some(50.0));
        assert_eq!(store.score_of(3).await, Some(70.0));
    }

    /// Store twin that stalls low-score writes, widening the race window
    /// between two in-flight batches for the same dataset.
    struct StallingStore {
        inner: FakeCatalogStore,
        stall_below: f64,
    }

    #[async_trait::async_trait]
    impl crate::store::CatalogStore for StallingStore {
        async fn claim_jobs(
            &self,
            limit: i64,
        ) -> Result<Vec<fairdex_model::JobDescriptor>, StoreError> {
            self.inner.claim_jobs(limit).await
        }

        async fn peek_jobs(
            &self,
            limit: i64,
        ) -> Result<Vec<fairdex_model::JobDescriptor>, StoreError> {
            self.inner.peek_jobs(limit).await
        }

        async fn dataset(&self, id: i64) -> Result<DatasetRecord, StoreError> {
            self.inner.dataset(id).await
        }

        async fn dataset_by_doi(&self, lookup_key: &str) -> Result<DatasetRecord, StoreError> {
            self.inner.dataset_by_doi(lookup_key).await
        }

        async fn current_score(
            &self,
            dataset_id: i64,
        ) -> Result<Option<FairScore>, StoreError> {
            self.inner.current_score(dataset_id).await
        }

        async fn upsert_score_if_improved(&self, score: &FairScore) -> Result<bool, StoreError> {
            if score.score.get() < self.stall_below {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.upsert_score_if_improved(score).await
        }

        async fn delete_job(&self, dataset_id: i64) -> Result<(), StoreError> {
            self.inner.delete_job(dataset_id).await
        }

        async fn latest_dindex(
            &self,
            dataset_id: i64,
        ) -> Result<Option<fairdex_model::DIndexRecord>, StoreError> {
            self.inner.latest_dindex(dataset_id).await
        }

        async fn citation_total(&self, dataset_id: i64) -> Result<i64, StoreError> {
            self.inner.citation_total(dataset_id).await
        }

        async fn mention_total(&self, dataset_id: i64) -> Result<i64, StoreError> {
            self.inner.mention_total(dataset_id).await
        }

        async fn sindex_rows(&self) -> Result<Vec<fairdex_model::SIndexRecord>, StoreError> {
            self.inner.sindex_rows().await
        }

        async fn metrics_rollup(&self) -> Result<fairdex_api::MetricsRollup, StoreError> {
            self.inner.metrics_rollup().await
        }

        async fn unscored_dataset_ids(
            &self,
            after_id: i64,
            limit: i64,
        ) -> Result<Vec<i64>, StoreError> {
            self.inner.unscored_dataset_ids(after_id, limit).await
        }

        async fn insert_jobs(&self, dataset_ids: &[i64]) -> Result<u64, StoreError> {
            self.inner.insert_jobs(dataset_ids).await
        }
    }

    #[tokio::test]
    async fn concurrent_batches_cannot_regress_the_score() {
        let inner = FakeCatalogStore::new();
        inner.insert_dataset(dataset(1)).await;
        let store = std::sync::Arc::new(StallingStore {
            inner: inner.clone(),
            stall_below: 70.0,
        });
        let (activity, metrics) = harness();
        let metrics = std::sync::Arc::new(metrics);

        // The low score enters reconciliation first but its write stalls;
        // the high score lands in the meantime. The stored score must end
        // at the maximum with the low report counted as a duplicate.
        let low = {
            let store = std::sync::Arc::clone(&store);
            let activity = activity.clone();
            let metrics = std::sync::Arc::clone(&metrics);
            tokio::spawn(async move {
                reconcile_results(store.as_ref(), &activity, &metrics, "w-low", &[result(1, 60.0)])
                    .await
                    .unwrap()
            })
        };
        let high = {
            let store = std::sync::Arc::clone(&store);
            let activity = activity.clone();
            let metrics = std::sync::Arc::clone(&metrics);
            tokio::spawn(async move {
                reconcile_results(store.as_ref(), &activity, &metrics, "w-high", &[result(1, 80.0)])
                    .await
                    .unwrap()
            })
        };
        let low = low.await.unwrap();
        let high = high.await.unwrap();

        assert_eq!(inner.score_of(1).await, Some(80.0));
        assert_eq!(high.updated, 1);
        assert_eq!(low.updated, 0);
        assert_eq!(low.duplicates, 1);
    }

    #[tokio::test]
    async fn outage_surfaces_as_error() {
        let store = FakeCatalogStore::new();
        store.insert_dataset(dataset(1)).await;
        store.set_fail_reads(true);
        let (activity, metrics) = harness();
        let err = reconcile_results(&store, &activity, &metrics, "w", &[result(1, 50.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
