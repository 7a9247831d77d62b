use super::{CatalogStore, StoreError};
use crate::config::HIGH_FAIR_THRESHOLD;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fairdex_api::{MetricsRollup, MonthlyCount};
use fairdex_model::{
    mean_latest_sindex, Author, DIndexRecord, DatasetRecord, FairScore, IdentifierType,
    JobDescriptor, SIndexRecord, ScoreValue,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn dataset_from_row(row: &PgRow) -> Result<DatasetRecord, StoreError> {
    let authors_json: serde_json::Value = row.try_get("authors")?;
    let subjects_json: serde_json::Value = row.try_get("subjects")?;
    let authors: Vec<Author> = serde_json::from_value(authors_json)
        .map_err(|e| StoreError::Unavailable(format!("corrupt authors column: {e}")))?;
    let subjects: Vec<String> = serde_json::from_value(subjects_json)
        .map_err(|e| StoreError::Unavailable(format!("corrupt subjects column: {e}")))?;
    let identifier_type: String = row.try_get("identifier_type")?;
    Ok(DatasetRecord {
        id: row.try_get("id")?,
        identifier: row.try_get("identifier")?,
        identifier_type: IdentifierType::from_str_lossy(&identifier_type),
        title: row.try_get("title")?,
        publisher: row.try_get("publisher")?,
        authors,
        subjects,
        published_at: row.try_get("published_at")?,
    })
}

fn descriptor_from_row(row: &PgRow) -> Result<JobDescriptor, StoreError> {
    let identifier_type: String = row.try_get("identifier_type")?;
    Ok(JobDescriptor {
        dataset_id: row.try_get("id")?,
        identifier: row.try_get("identifier")?,
        identifier_type: IdentifierType::from_str_lossy(&identifier_type),
    })
}

fn score_from_row(row: &PgRow) -> Result<FairScore, StoreError> {
    let raw: f64 = row.try_get("score")?;
    let score = ScoreValue::parse(raw)
        .map_err(|e| StoreError::Unavailable(format!("stored score out of range: {e}")))?;
    Ok(FairScore {
        dataset_id: row.try_get("dataset_id")?,
        score,
        evaluation_date: row.try_get("evaluation_date")?,
        metric_version: row.try_get("metric_version")?,
        software_version: row.try_get("software_version")?,
    })
}

const DATASET_COLUMNS: &str =
    "id, identifier, identifier_type, title, publisher, authors, subjects, published_at";

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn claim_jobs(&self, limit: i64) -> Result<Vec<JobDescriptor>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let claimed = sqlx::query(
            "DELETE FROM fair_jobs WHERE dataset_id IN ( \
               SELECT dataset_id FROM fair_jobs \
               ORDER BY dataset_id ASC LIMIT $1 \
               FOR UPDATE SKIP LOCKED \
             ) RETURNING dataset_id",
        )
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;
        let mut ids = Vec::with_capacity(claimed.len());
        for row in &claimed {
            ids.push(row.try_get::<i64, _>("dataset_id")?);
        }
        if ids.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }
        // Descriptors resolve inside the same transaction so a claimed id can
        // never race a dataset deletion.
        let rows = sqlx::query(
            "SELECT id, identifier, identifier_type FROM datasets \
             WHERE id = ANY($1) ORDER BY id ASC",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        rows.iter().map(descriptor_from_row).collect()
    }

    async fn peek_jobs(&self, limit: i64) -> Result<Vec<JobDescriptor>, StoreError> {
        let rows = sqlx::query(
            "SELECT d.id, d.identifier, d.identifier_type \
             FROM fair_jobs j JOIN datasets d ON d.id = j.dataset_id \
             ORDER BY j.dataset_id ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(descriptor_from_row).collect()
    }

    async fn dataset(&self, id: i64) -> Result<DatasetRecord, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DATASET_COLUMNS} FROM datasets WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        dataset_from_row(&row)
    }

    async fn dataset_by_doi(&self, lookup_key: &str) -> Result<DatasetRecord, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DATASET_COLUMNS} FROM datasets \
             WHERE identifier_type = 'doi' AND identifier_key = $1"
        ))
        .bind(lookup_key)
        .fetch_one(&self.pool)
        .await?;
        dataset_from_row(&row)
    }

    async fn current_score(&self, dataset_id: i64) -> Result<Option<FairScore>, StoreError> {
        let exists = sqlx::query("SELECT 1 AS one FROM datasets WHERE id = $1")
            .bind(dataset_id)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound);
        }
        let row = sqlx::query(
            "SELECT dataset_id, score, evaluation_date, metric_version, software_version \
             FROM fair_scores WHERE dataset_id = $1",
        )
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(score_from_row).transpose()
    }

    async fn upsert_score_if_improved(&self, score: &FairScore) -> Result<bool, StoreError> {
        // The WHERE guard makes check-and-write one atomic statement;
        // a concurrent writer can never regress the stored score.
        let result = sqlx::query(
            "INSERT INTO fair_scores \
               (dataset_id, score, evaluation_date, metric_version, software_version, updated_at) \
             VALUES ($1, $2, $3, $4, $5, now()) \
             ON CONFLICT (dataset_id) DO UPDATE SET \
               score = EXCLUDED.score, \
               evaluation_date = EXCLUDED.evaluation_date, \
               metric_version = EXCLUDED.metric_version, \
               software_version = EXCLUDED.software_version, \
               updated_at = now() \
             WHERE fair_scores.score < EXCLUDED.score",
        )
        .bind(score.dataset_id)
        .bind(score.score.get())
        .bind(score.evaluation_date)
        .bind(&score.metric_version)
        .bind(&score.software_version)
        .execute(&self.pool)
        .await;
        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(e) => {
                // 23503: foreign key violation, the dataset row is gone.
                if let sqlx::Error::Database(db) = &e {
                    if db.code().as_deref() == Some("23503") {
                        return Err(StoreError::NotFound);
                    }
                }
                Err(e.into())
            }
        }
    }

    async fn delete_job(&self, dataset_id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM fair_jobs WHERE dataset_id = $1")
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn latest_dindex(&self, dataset_id: i64) -> Result<Option<DIndexRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT dataset_id, score, created FROM d_index_scores \
             WHERE dataset_id = $1 ORDER BY created DESC LIMIT 1",
        )
        .bind(dataset_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(DIndexRecord {
                dataset_id: row.try_get("dataset_id")?,
                score: row.try_get("score")?,
                created: row.try_get::<DateTime<Utc>, _>("created")?,
            })),
            None => Ok(None),
        }
    }

    async fn citation_total(&self, dataset_id: i64) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM citations WHERE dataset_id = $1")
            .bind(dataset_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn mention_total(&self, dataset_id: i64) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM mentions WHERE dataset_id = $1")
            .bind(dataset_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn sindex_rows(&self) -> Result<Vec<SIndexRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT entity_id, entity_name, year, score FROM s_index_scores \
             ORDER BY year DESC, entity_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SIndexRecord {
                entity_id: row.try_get("entity_id")?,
                entity_name: row.try_get("entity_name")?,
                year: row.try_get("year")?,
                score: row.try_get("score")?,
            });
        }
        Ok(out)
    }

    async fn metrics_rollup(&self) -> Result<MetricsRollup, StoreError> {
        let counts = sqlx::query(
            "SELECT \
               (SELECT COUNT(*) FROM datasets) AS dataset_count, \
               (SELECT COUNT(*) FROM fair_scores) AS scored_count, \
               (SELECT COUNT(*) FROM fair_scores WHERE score >= $1) AS high_fair_count, \
               (SELECT COUNT(DISTINCT dataset_id) FROM citations) AS cited_count, \
               (SELECT AVG(score) FROM fair_scores) AS average_fair_score",
        )
        .bind(HIGH_FAIR_THRESHOLD)
        .fetch_one(&self.pool)
        .await?;

        let monthly = sqlx::query(
            "SELECT to_char(date_trunc('month', published_at), 'YYYY-MM') AS month, \
                    COUNT(*) AS count \
             FROM datasets \
             WHERE published_at >= date_trunc('month', CURRENT_DATE) - INTERVAL '11 months' \
             GROUP BY 1 ORDER BY 1 ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut monthly_publications = Vec::with_capacity(monthly.len());
        for row in monthly {
            monthly_publications.push(MonthlyCount {
                month: row.try_get("month")?,
                count: row.try_get("count")?,
            });
        }

        let sindex = self.sindex_rows().await?;
        Ok(MetricsRollup {
            dataset_count: counts.try_get("dataset_count")?,
            scored_count: counts.try_get("scored_count")?,
            high_fair_count: counts.try_get("high_fair_count")?,
            cited_count: counts.try_get("cited_count")?,
            average_fair_score: counts.try_get("average_fair_score")?,
            average_s_index: mean_latest_sindex(&sindex),
            monthly_publications,
        })
    }

    async fn unscored_dataset_ids(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>, StoreError> {
        let rows = sqlx::query(
            "SELECT d.id FROM datasets d \
             LEFT JOIN fair_scores s ON s.dataset_id = d.id \
             WHERE s.dataset_id IS NULL AND d.id > $1 \
             ORDER BY d.id ASC LIMIT $2",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(row.try_get::<i64, _>("id")?);
        }
        Ok(ids)
    }

    async fn insert_jobs(&self, dataset_ids: &[i64]) -> Result<u64, StoreError> {
        if dataset_ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query(
            "INSERT INTO fair_jobs (dataset_id) \
             SELECT unnest($1::bigint[]) \
             ON CONFLICT (dataset_id) DO NOTHING",
        )
        .bind(dataset_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
