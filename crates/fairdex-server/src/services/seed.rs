use crate::store::{CatalogStore, StoreError};
use tracing::info;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub scanned: u64,
    pub inserted: u64,
    pub pages: u64,
}

/// Enqueues a job for every dataset without an accepted score. Cursor
/// pagination on the primary key, never OFFSET; inserts ignore ids already
/// queued, so re-running after a crash is safe.
pub async fn seed_jobs(
    store: &dyn CatalogStore,
    page_size: i64,
    insert_batch: i64,
) -> Result<SeedReport, StoreError> {
    let mut report = SeedReport::default();
    let mut cursor = 0i64;
    loop {
        let ids = store.unscored_dataset_ids(cursor, page_size).await?;
        if ids.is_empty() {
            break;
        }
        report.pages += 1;
        report.scanned += ids.len() as u64;
        for chunk in ids.chunks(insert_batch.max(1) as usize) {
            report.inserted += store.insert_jobs(chunk).await?;
        }
        cursor = match ids.last() {
            Some(last) => *last,
            None => break,
        };
        info!(
            cursor,
            scanned = report.scanned,
            inserted = report.inserted,
            "seed page complete"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FakeCatalogStore;
    use chrono::NaiveDate;
    use fairdex_model::{DatasetRecord, FairScore, IdentifierType, ScoreValue};

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

    async fn store_with_datasets(count: i64, scored: &[i64]) -> FakeCatalogStore {
        let store = FakeCatalogStore::new();
        for id in 1..=count {
            store.insert_dataset(dataset(id)).await;
        }
        for id in scored {
            store
                .upsert_score_if_improved(&FairScore {
                    dataset_id: *id,
                    score: ScoreValue::parse(50.0).unwrap(),
                    evaluation_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                    metric_version: "m".to_string(),
                    software_version: "s".to_string(),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn seeds_only_unscored_datasets() {
        let store = store_with_datasets(10, &[2, 5, 8]).await;
        let report = seed_jobs(&store, 4, 2).await.unwrap();
        assert_eq!(report.scanned, 7);
        assert_eq!(report.inserted, 7);
        assert_eq!(store.pending_job_count().await, 7);
    }

    #[tokio::test]
    async fn rerun_inserts_nothing_new() {
        let store = store_with_datasets(6, &[]).await;
        let first = seed_jobs(&store, 3, 3).await.unwrap();
        let second = seed_jobs(&store, 3, 3).await.unwrap();
        assert_eq!(first.inserted, 6);
        assert_eq!(second.inserted, 0);
        assert_eq!(second.scanned, 6);
        assert_eq!(store.pending_job_count().await, 6);
    }

    #[tokio::test]
    async fn paginates_past_a_single_page() {
        let store = store_with_datasets(25, &[]).await;
        let report = seed_jobs(&store, 10, 10).await.unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.inserted, 25);
    }
}
