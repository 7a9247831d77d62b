use crate::store::CatalogStore;
use crate::telemetry::{ActivityTracker, RequestMetrics};
use fairdex_api::ClaimedJob;
use fairdex_model::JobDescriptor;
use std::sync::atomic::Ordering;
use tracing::{error, warn};

/// Claims up to `limit` jobs for a polling worker. Pollers must keep
/// running through store outages, so any failure degrades to an empty
/// batch rather than an error response.
pub async fn claim_batch(
    store: &dyn CatalogStore,
    activity: &ActivityTracker,
    metrics: &RequestMetrics,
    limit: i64,
) -> Vec<ClaimedJob> {
    match store.claim_jobs(limit).await {
        Ok(jobs) => {
            metrics
                .claims_total
                .fetch_add(jobs.len() as u64, Ordering::Relaxed);
            if jobs.len() as i64 > limit {
                // Should be impossible given the claim statement; if it ever
                // fires the locking discipline has regressed.
                warn!(
                    claimed = jobs.len(),
                    limit, "claim batch exceeded requested limit"
                );
                metrics.claim_overflow_total.fetch_add(1, Ordering::Relaxed);
                activity.record("claim-overflow", "dispatcher", 1).await;
            }
            jobs.into_iter().map(ClaimedJob::from).collect()
        }
        Err(e) => {
            error!(error = %e, "job claim failed, returning empty batch");
            metrics.claim_failures_total.fetch_add(1, Ordering::Relaxed);
            activity.record("claim-failure", "dispatcher", 1).await;
            Vec::new()
        }
    }
}

/// Non-destructive queue preview. Fails open to empty like the claim path.
pub async fn peek_batch(store: &dyn CatalogStore, limit: i64) -> Vec<JobDescriptor> {
    match store.peek_jobs(limit).await {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(error = %e, "job peek failed, returning empty batch");
            Vec::new()
        }
    }
}
