use crate::{make_request_id, with_request_id, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::atomic::Ordering;
use std::time::Instant;

const METRIC_SUBSYSTEM: &str = "fairdex";
const METRIC_VERSION: &str = env!("CARGO_PKG_VERSION");

fn percentile_ns(values: &[u64], pct: f64) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut v = values.to_vec();
    v.sort_unstable();
    let idx = ((v.len() as f64 - 1.0) * pct).round() as usize;
    v[idx]
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> Response {
    let request_id = make_request_id(&state);
    let started = Instant::now();
    let m = &state.metrics;
    let mut body = String::new();
    for (name, value) in [
        ("fairdex_claims_total", m.claims_total.load(Ordering::Relaxed)),
        (
            "fairdex_claim_failures_total",
            m.claim_failures_total.load(Ordering::Relaxed),
        ),
        (
            "fairdex_claim_overflow_total",
            m.claim_overflow_total.load(Ordering::Relaxed),
        ),
        (
            "fairdex_results_updated_total",
            m.results_updated_total.load(Ordering::Relaxed),
        ),
        (
            "fairdex_results_duplicate_total",
            m.results_duplicate_total.load(Ordering::Relaxed),
        ),
        (
            "fairdex_results_missing_total",
            m.results_missing_total.load(Ordering::Relaxed),
        ),
        ("fairdex_cache_hits_total", m.cache_hits.load(Ordering::Relaxed)),
        (
            "fairdex_cache_misses_total",
            m.cache_misses.load(Ordering::Relaxed),
        ),
        (
            "fairdex_rate_limited_total",
            m.rate_limited_total.load(Ordering::Relaxed),
        ),
    ] {
        body.push_str(&format!(
            "{name}{{subsystem=\"{METRIC_SUBSYSTEM}\",version=\"{METRIC_VERSION}\"}} {value}\n"
        ));
    }

    let req_counts = m.counts.lock().await.clone();
    for ((route, status), count) in req_counts {
        body.push_str(&format!(
            "fairdex_http_requests_total{{subsystem=\"{METRIC_SUBSYSTEM}\",version=\"{METRIC_VERSION}\",route=\"{route}\",status=\"{status}\"}} {count}\n"
        ));
    }
    let req_lat = m.latency_ns.lock().await.clone();
    for (route, vals) in req_lat {
        body.push_str(&format!(
            "fairdex_http_request_latency_p95_seconds{{subsystem=\"{METRIC_SUBSYSTEM}\",version=\"{METRIC_VERSION}\",route=\"{route}\"}} {:.6}\n",
            percentile_ns(&vals, 0.95) as f64 / 1_000_000_000.0
        ));
    }

    let resp = (StatusCode::OK, body).into_response();
    state
        .metrics
        .observe_request("/metrics", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}
