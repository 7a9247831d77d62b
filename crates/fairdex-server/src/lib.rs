#![forbid(unsafe_code)]

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fairdex_api::{map_error, ApiError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod cache;
pub mod config;
pub mod http;
pub mod rate_limiter;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod upstream;

use cache::ResponseCache;
use config::ApiConfig;
use rate_limiter::RateLimiter;
use store::CatalogStore;
use telemetry::{ActivityTracker, RequestMetrics};
use upstream::UpstreamClient;

pub const CRATE_NAME: &str = "fairdex-server";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    pub cache: ResponseCache,
    pub activity: ActivityTracker,
    pub limiter: RateLimiter,
    pub upstream: Arc<dyn UpstreamClient>,
    pub config: Arc<ApiConfig>,
    pub metrics: Arc<RequestMetrics>,
    pub request_id_seed: Arc<AtomicU64>,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: ResponseCache,
        activity: ActivityTracker,
        limiter: RateLimiter,
        upstream: Arc<dyn UpstreamClient>,
        config: ApiConfig,
    ) -> Self {
        Self {
            store,
            cache,
            activity,
            limiter,
            upstream,
            config: Arc::new(config),
            metrics: Arc::new(RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

/// Honors a caller-supplied `x-request-id` so multi-hop traces line up;
/// mints a fresh id otherwise.
pub(crate) fn propagated_request_id(state: &AppState, headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| make_request_id(state))
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

pub(crate) fn api_error_response(error: &ApiError) -> Response {
    let status = StatusCode::from_u16(map_error(error).status_code)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(error.clone())).into_response()
}

#[must_use]
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;
    Router::new()
        .route("/healthz", get(http::ops::healthz_handler))
        .route("/readyz", get(http::ops::readyz_handler))
        .route("/v1/version", get(http::ops::version_handler))
        .route("/metrics", get(telemetry::metrics_endpoint::metrics_handler))
        .route("/api/fuji/jobs", get(http::jobs::claim_jobs_handler))
        .route("/api/fuji/jobs/priority", get(http::jobs::peek_jobs_handler))
        .route("/api/fuji/jobs/results", post(http::jobs::submit_results_handler))
        .route("/api/fuji/doi/*pid", get(http::resolve::doi_exists_handler))
        .route("/api/resolve/doi", get(http::resolve::resolve_doi_handler))
        .route("/api/resolve/url", get(http::resolve::resolve_url_handler))
        .route("/api/v1/datasets/by-doi", get(http::datasets::by_doi_handler))
        .route(
            "/api/v1/shields/d-index/*doi",
            get(http::datasets::dindex_badge_handler),
        )
        .route("/api/datasets/:datasetid", get(http::datasets::dataset_handler))
        .route("/api/metrics", get(http::datasets::metrics_rollup_handler))
        .route("/api/cache/flush", post(http::ops::cache_flush_handler))
        .route("/api/activity", get(http::ops::activity_handler))
        .layer(axum::extract::DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}
