use async_trait::async_trait;
use fairdex_api::MetricsRollup;
use fairdex_model::{DIndexRecord, DatasetRecord, FairScore, JobDescriptor, SIndexRecord};
use std::fmt::{Display, Formatter};

pub mod fake;
pub mod postgres;

pub use fake::FakeCatalogStore;
pub use postgres::PgCatalogStore;

#[derive(Debug)]
pub enum StoreError {
    NotFound,
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "row not found"),
            Self::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Seam between the HTTP service and the primary store. The Postgres
/// implementation is production; the fake twin backs tests and local runs
/// and must keep identical claim semantics.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Atomically removes up to `limit` queue rows and returns their work
    /// descriptors, ascending by dataset id. Claimed rows are gone; a second
    /// concurrent claim can never see them.
    async fn claim_jobs(&self, limit: i64) -> Result<Vec<JobDescriptor>, StoreError>;

    /// Non-destructive preview of the front of the queue.
    async fn peek_jobs(&self, limit: i64) -> Result<Vec<JobDescriptor>, StoreError>;

    async fn dataset(&self, id: i64) -> Result<DatasetRecord, StoreError>;

    /// Lookup by the case-folded DOI key.
    async fn dataset_by_doi(&self, lookup_key: &str) -> Result<DatasetRecord, StoreError>;

    /// `Err(NotFound)` when the dataset does not exist; `Ok(None)` when it
    /// exists but has no accepted score yet.
    async fn current_score(&self, dataset_id: i64) -> Result<Option<FairScore>, StoreError>;

    /// Writes the score only if it is strictly greater than the stored one,
    /// as a single atomic check-and-write. Returns whether the row changed;
    /// `Err(NotFound)` when the dataset does not exist. Concurrent callers
    /// must never be able to regress an accepted score.
    async fn upsert_score_if_improved(&self, score: &FairScore) -> Result<bool, StoreError>;

    /// Removes the queue row for a dataset if one is still pending. Absent
    /// rows are fine; the job was usually retired at claim time already.
    async fn delete_job(&self, dataset_id: i64) -> Result<(), StoreError>;

    async fn latest_dindex(&self, dataset_id: i64) -> Result<Option<DIndexRecord>, StoreError>;

    async fn citation_total(&self, dataset_id: i64) -> Result<i64, StoreError>;

    async fn mention_total(&self, dataset_id: i64) -> Result<i64, StoreError>;

    /// Precomputed S-Index rows ordered year-descending.
    async fn sindex_rows(&self) -> Result<Vec<SIndexRecord>, StoreError>;

    async fn metrics_rollup(&self) -> Result<MetricsRollup, StoreError>;

    /// Cursor page of dataset ids with no accepted score, strictly after
    /// `after_id`, ascending.
    async fn unscored_dataset_ids(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<i64>, StoreError>;

    /// Enqueues jobs for the given datasets, ignoring ids already queued.
    /// Returns the number of rows actually inserted.
    async fn insert_jobs(&self, dataset_ids: &[i64]) -> Result<u64, StoreError>;
}
