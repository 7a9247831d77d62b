use super::{observe_cache, with_cache_status};
use crate::store::{CatalogStore, StoreError};
use crate::{api_error_response, propagated_request_id, with_request_id, AppState};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fairdex_api::{
    ApiError, BadgeResponse, ByDoiResponse, DatasetSummary, FairScoreView, IndexView,
    MetricsRollup,
};
use fairdex_model::{DatasetRecord, Doi};
use serde::Deserialize;
use std::time::Instant;

fn score_view(store_score: Option<fairdex_model::FairScore>) -> Option<FairScoreView> {
    store_score.map(|s| FairScoreView {
        score: s.score.get(),
        evaluation_date: s.evaluation_date,
        metric_version: s.metric_version,
        software_version: s.software_version,
    })
}

fn index_view(record: Option<fairdex_model::DIndexRecord>) -> Option<IndexView> {
    record.map(|r| IndexView {
        score: r.score,
        created: r.created,
    })
}

async fn aggregate_by_doi(
    store: &dyn CatalogStore,
    dataset: &DatasetRecord,
    doi: &str,
) -> Result<ByDoiResponse, StoreError> {
    let citation_total = store.citation_total(dataset.id).await?;
    let mention_total = store.mention_total(dataset.id).await?;
    let fair_score = store.current_score(dataset.id).await?;
    let latest = store.latest_dindex(dataset.id).await?;
    Ok(ByDoiResponse {
        dataset_id: dataset.id,
        doi: doi.to_string(),
        citation_total,
        mention_total,
        fair_score: score_view(fair_score),
        latest_d_index: index_view(latest),
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct DoiQuery {
    doi: Option<String>,
}

pub(crate) async fn by_doi_handler(
    State(state): State<AppState>,
    Query(query): Query<DoiQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/v1/datasets/by-doi";

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

    let store = state.store.clone();
    let doi_display = doi.as_str().to_string();
    let result = state
        .cache
        .get_or_compute::<ByDoiResponse, StoreError, _, _>(
            "v1:datasets:by-doi",
            &doi.lookup_key(),
            state.config.by_doi_ttl,
            || async move {
                let dataset = store.dataset_by_doi(&doi_display.to_ascii_lowercase()).await?;
                aggregate_by_doi(store.as_ref(), &dataset, &doi_display).await
            },
        )
        .await;

    let (resp, status) = match result {
        Ok((payload, cache_status)) => {
            observe_cache(&state.metrics, cache_status);
            let resp = (StatusCode::OK, Json(payload)).into_response();
            (with_cache_status(resp, cache_status), StatusCode::OK)
        }
        Err(StoreError::NotFound) => (
            api_error_response(&ApiError::not_found("dataset")),
            StatusCode::NOT_FOUND,
        ),
        Err(StoreError::Unavailable(reason)) => (
            api_error_response(&ApiError::store_unavailable(&reason)),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    };
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn dataset_handler(
    State(state): State<AppState>,
    Path(datasetid): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/datasets/{datasetid}";

    let (resp, status) = match state.store.dataset(datasetid).await {
        Ok(dataset) => {
            let fair_score = state.store.current_score(dataset.id).await.ok().flatten();
            let latest = state.store.latest_dindex(dataset.id).await.ok().flatten();
            let summary = DatasetSummary {
                id: dataset.id,
                identifier: dataset.identifier,
                identifier_type: dataset.identifier_type.as_str().to_string(),
                title: dataset.title,
                publisher: dataset.publisher,
                authors: dataset.authors,
                subjects: dataset.subjects,
                published_at: dataset.published_at,
                fair_score: score_view(fair_score),
                latest_d_index: index_view(latest),
            };
            (
                (StatusCode::OK, Json(summary)).into_response(),
                StatusCode::OK,
            )
        }
        Err(StoreError::NotFound) => (
            api_error_response(&ApiError::not_found("dataset")),
            StatusCode::NOT_FOUND,
        ),
        Err(StoreError::Unavailable(reason)) => (
            api_error_response(&ApiError::store_unavailable(&reason)),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    };
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn dindex_badge_handler(
    State(state): State<AppState>,
    Path(doi): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/v1/shields/d-index";

    let doi = match Doi::parse(&doi) {
        Ok(doi) => doi,
        Err(_) => {
            let resp = api_error_response(&ApiError::invalid_param("doi", &doi));
            state
                .metrics
                .observe_request(route, StatusCode::BAD_REQUEST, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
    };

    let (resp, status) = match state.store.dataset_by_doi(&doi.lookup_key()).await {
        Ok(dataset) => {
            let latest = state.store.latest_dindex(dataset.id).await.ok().flatten();
            let badge =
                BadgeResponse::for_score(doi.as_str(), dataset.id, latest.map(|r| r.score));
            (
                (StatusCode::OK, Json(badge)).into_response(),
                StatusCode::OK,
            )
        }
        Err(StoreError::NotFound) => (
            api_error_response(&ApiError::not_found("dataset")),
            StatusCode::NOT_FOUND,
        ),
        Err(StoreError::Unavailable(reason)) => (
            api_error_response(&ApiError::store_unavailable(&reason)),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    };
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn metrics_rollup_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/metrics";

    let store = state.store.clone();
    let result = state
        .cache
        .get_or_compute::<MetricsRollup, StoreError, _, _>(
            "metrics:rollup",
            "all",
            state.config.rollup_ttl,
            || async move { store.metrics_rollup().await },
        )
        .await;

    let (resp, status) = match result {
        Ok((rollup, cache_status)) => {
            observe_cache(&state.metrics, cache_status);
            let resp = (StatusCode::OK, Json(rollup)).into_response();
            (with_cache_status(resp, cache_status), StatusCode::OK)
        }
        Err(e) => (
            api_error_response(&ApiError::store_unavailable(&e.to_string())),
            StatusCode::SERVICE_UNAVAILABLE,
        ),
    };
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(resp, &request_id)
}
