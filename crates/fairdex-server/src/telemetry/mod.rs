use axum::http::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::sync::Mutex;

pub mod activity;
pub mod metrics_endpoint;
pub mod redis_backend;

pub use activity::ActivityTracker;
pub use redis_backend::{RedisBackend, RedisPolicy};

/// Per-process request and domain counters backing the `/metrics` exposition.
#[derive(Default)]
pub struct RequestMetrics {
    pub counts: Mutex<HashMap<(String, u16), u64>>,
    pub latency_ns: Mutex<HashMap<String, Vec<u64>>>,
    pub claims_total: AtomicU64,
    pub claim_failures_total: AtomicU64,
    pub claim_overflow_total: AtomicU64,
    pub results_updated_total: AtomicU64,
    pub results_duplicate_total: AtomicU64,
    pub results_missing_total: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    pub rate_limited_total: AtomicU64,
}

impl RequestMetrics {
    pub async fn observe_request(&self, route: &str, status: StatusCode, elapsed: Duration) {
        {
            let mut counts = self.counts.lock().await;
            *counts
                .entry((route.to_string(), status.as_u16()))
                .or_insert(0) += 1;
        }
        let mut latency = self.latency_ns.lock().await;
        let samples = latency.entry(route.to_string()).or_default();
        // Bounded sample buffer; p95 over the most recent window is enough.
        if samples.len() >= 4096 {
            samples.remove(0);
        }
        samples.push(elapsed.as_nanos().min(u128::from(u64::MAX)) as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn observe_request_accumulates_by_route_and_status() {
        let metrics = RequestMetrics::default();
        metrics
            .observe_request("/api/fuji/jobs", StatusCode::OK, Duration::from_millis(2))
            .await;
        metrics
            .observe_request("/api/fuji/jobs", StatusCode::OK, Duration::from_millis(3))
            .await;
        metrics
            .observe_request("/api/fuji/jobs", StatusCode::BAD_REQUEST, Duration::ZERO)
            .await;
        let counts = metrics.counts.lock().await;
        assert_eq!(counts[&("/api/fuji/jobs".to_string(), 200)], 2);
        assert_eq!(counts[&("/api/fuji/jobs".to_string(), 400)], 1);
    }
}
