use super::{client_identity, observe_cache, with_cache_status, with_rate_limit_headers};
use crate::store::StoreError;
use crate::{api_error_response, propagated_request_id, with_request_id, AppState};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fairdex_api::{ApiError, DoiExistsResponse, RateLimitBody, ResolveDoiResponse};
use fairdex_model::Doi;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::Ordering;
use std::time::Instant;

fn rate_limited_response(state: &AppState, decision: &crate::rate_limiter::RateDecision) -> Response {
    state.metrics.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    let body = RateLimitBody::new(decision.reset_at, decision.remaining);
    let resp = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    with_rate_limit_headers(resp, decision)
}

#[derive(Debug, Deserialize)]
pub(crate) struct DoiQuery {
    doi: Option<String>,
}

pub(crate) async fn resolve_doi_handler(
    State(state): State<AppState>,
    Query(query): Query<DoiQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/resolve/doi";

    let identity = client_identity(&headers);
    let decision = state
        .limiter
        .check("resolve:doi", &identity, &state.config.proxy_rate_limit)
        .await;
    if !decision.allowed {
        let resp = rate_limited_response(&state, &decision);
        state
            .metrics
            .observe_request(route, StatusCode::TOO_MANY_REQUESTS, started.elapsed())
            .await;
        return with_request_id(resp, &request_id);
    }

    let raw = query.doi.unwrap_or_default();
    let doi = match Doi::parse(&raw) {
        Ok(doi) => doi,
        Err(_) => {
            let resp = api_error_response(&ApiError::invalid_param("doi", &raw));
            state
                .metrics
                .observe_request(route, StatusCode::BAD_REQUEST, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
    };

    let (resp, status) = match state.store.dataset_by_doi(&doi.lookup_key()).await {
        Ok(dataset) => (
            (
                StatusCode::OK,
                Json(ResolveDoiResponse {
                    dataset_id: dataset.id,
                    doi: doi.as_str().to_string(),
                }),
            )
                .into_response(),
            StatusCode::OK,
        ),
        Err(StoreError::NotFound) => (
            api_error_response(&ApiError::not_found("dataset")),
            StatusCode::NOT_FOUND,
        ),
        Err(StoreError::Unavailable(reason)) => (
            api_error_response(&ApiError::store_unavailable(&reason)),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    };
    let resp = with_rate_limit_headers(resp, &decision);
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(resp, &request_id)
}

#[derive(Debug, Deserialize)]
pub(crate) struct UrlQuery {
    url: Option<String>,
    pubdate: Option<String>,
    topic_id: Option<String>,
}

/// Rate-limited, cached proxy to the external index-series API.
pub(crate) async fn resolve_url_handler(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/resolve/url";

    let identity = client_identity(&headers);
    let decision = state
        .limiter
        .check("resolve:url", &identity, &state.config.proxy_rate_limit)
        .await;
    if !decision.allowed {
        let resp = rate_limited_response(&state, &decision);
        state
            .metrics
            .observe_request(route, StatusCode::TOO_MANY_REQUESTS, started.elapsed())
            .await;
        return with_request_id(resp, &request_id);
    }

    let url = match query.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => url.to_string(),
        None => {
            let resp = api_error_response(&ApiError::invalid_param("url", ""));
            state
                .metrics
                .observe_request(route, StatusCode::BAD_REQUEST, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
    };

    let cache_key = format!(
        "{url}|{}|{}",
        query.pubdate.as_deref().unwrap_or(""),
        query.topic_id.as_deref().unwrap_or("")
    );
    let upstream = state.upstream.clone();
    let pubdate = query.pubdate.clone();
    let topic_id = query.topic_id.clone();
    let result = state
        .cache
        .get_or_compute::<Value, _, _, _>(
            "resolve:url",
            &cache_key,
            state.config.url_resolution_ttl,
            || async move {
                upstream
                    .index_series_from_url(&url, pubdate.as_deref(), topic_id.as_deref())
                    .await
            },
        )
        .await;

    let (resp, status) = match result {
        Ok((payload, cache_status)) => {
            observe_cache(&state.metrics, cache_status);
            let resp = (StatusCode::OK, Json(payload)).into_response();
            (with_cache_status(resp, cache_status), StatusCode::OK)
        }
        Err(e) => {
            tracing::warn!(error = %e, "index series proxy failed");
            (
                api_error_response(&ApiError::upstream_failed("index-series")),
                StatusCode::BAD_GATEWAY,
            )
        }
    };
    let resp = with_rate_limit_headers(resp, &decision);
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(resp, &request_id)
}

/// DataCite existence probe. Negative answers are cached just like positive
/// ones; registration events are rare enough that a stale negative is fine.
pub(crate) async fn doi_exists_handler(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/fuji/doi";

    let doi = match Doi::parse(&pid) {
        Ok(doi) => doi,
        Err(_) => {
            let resp = api_error_response(&ApiError::invalid_param("pid", &pid));
            state
                .metrics
                .observe_request(route, StatusCode::BAD_REQUEST, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
    };

    let upstream = state.upstream.clone();
    let lookup = doi.as_str().to_string();
    let result = state
        .cache
        .get_or_compute::<bool, _, _, _>(
            "fuji:doi",
            &doi.lookup_key(),
            state.config.doi_exists_ttl,
            || async move { upstream.doi_exists(&lookup).await },
        )
        .await;

    let (resp, status) = match result {
        Ok((exists, cache_status)) => {
            observe_cache(&state.metrics, cache_status);
            let status = if exists {
                StatusCode::OK
            } else {
                StatusCode::NOT_FOUND
            };
            let resp = (status, Json(DoiExistsResponse { exists })).into_response();
            (with_cache_status(resp, cache_status), status)
        }
        Err(e) => {
            tracing::warn!(error = %e, "datacite probe failed");
            (
                api_error_response(&ApiError::upstream_failed("datacite")),
                StatusCode::BAD_GATEWAY,
            )
        }
    };
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(resp, &request_id)
}
