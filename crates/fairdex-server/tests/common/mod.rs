use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use fairdex_model::{DatasetRecord, IdentifierType};
use fairdex_server::cache::ResponseCache;
use fairdex_server::config::ApiConfig;
use fairdex_server::rate_limiter::RateLimiter;
use fairdex_server::store::FakeCatalogStore;
use fairdex_server::telemetry::ActivityTracker;
use fairdex_server::upstream::{UpstreamClient, UpstreamError};
use fairdex_server::{build_router, AppState};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

pub struct StubUpstream {
    pub doi_known: AtomicBool,
    pub fail: AtomicBool,
    pub probe_calls: AtomicU64,
    pub series_calls: AtomicU64,
}

impl Default for StubUpstream {
    fn default() -> Self {
        Self {
            doi_known: AtomicBool::new(true),
            fail: AtomicBool::new(false),
            probe_calls: AtomicU64::new(0),
            series_calls: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl UpstreamClient for StubUpstream {
    async fn doi_exists(&self, _doi: &str) -> Result<bool, UpstreamError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpstreamError("stub outage".to_string()));
        }
        Ok(self.doi_known.load(Ordering::SeqCst))
    }

    async fn index_series_from_url(
        &self,
        url: &str,
        _pubdate: Option<&str>,
        _topic_id: Option<&str>,
    ) -> Result<Value, UpstreamError> {
        self.series_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(UpstreamError("stub outage".to_string()));
        }
        Ok(serde_json::json!({"url": url, "series": [1.0, 2.0]}))
    }
}

pub struct Harness {
    pub router: Router,
    pub store: FakeCatalogStore,
    pub upstream: Arc<StubUpstream>,
}

pub fn harness_with(config: ApiConfig) -> Harness {
    let store = FakeCatalogStore::new();
    let upstream = Arc::new(StubUpstream::default());
    let activity_ttl = config.activity_ttl;
    let state = AppState::new(
        Arc::new(store.clone()),
        ResponseCache::in_memory(),
        ActivityTracker::memory(activity_ttl),
        RateLimiter::memory(),
        upstream.clone(),
        config,
    );
    Harness {
        router: build_router(state),
        store,
        upstream,
    }
}

/// Default test config: rate limits opened wide so unrelated requests never
/// trip them.
pub fn harness() -> Harness {
    let mut config = ApiConfig::default();
    config.proxy_rate_limit.max_requests = 10_000;
    harness_with(config)
}

pub fn dataset(id: i64, doi: &str) -> DatasetRecord {
    DatasetRecord {
        id,
        identifier: doi.to_string(),
        identifier_type: IdentifierType::Doi,
        title: Some(format!("Dataset {id}")),
        publisher: Some("Zenodo".to_string()),
        authors: Vec::new(),
        subjects: Vec::new(),
        published_at: NaiveDate::from_ymd_opt(2026, 1, 15),
    }
}

pub async fn get(router: &Router, uri: &str) -> Response<Body> {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(router: &Router, uri: &str, body: Value) -> Response<Body> {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn assert_status(response: &Response<Body>, expected: StatusCode) {
    assert_eq!(response.status(), expected);
}
