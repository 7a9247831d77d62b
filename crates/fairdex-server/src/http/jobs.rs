use super::client_identity;
use crate::services::{dispatch, reconcile};
use crate::store::StoreError;
use crate::{api_error_response, propagated_request_id, with_request_id, AppState};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fairdex_api::{validate_submission, ApiError, ClaimedJob, ResultsSubmission};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;

#[derive(Debug, Deserialize)]
pub(crate) struct ClaimQuery {
    limit: Option<i64>,
}

/// Destructive claim: returned jobs are already deleted from the queue.
pub(crate) async fn claim_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<ClaimQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let limit = query
        .limit
        .unwrap_or(state.config.claim_batch_limit)
        .clamp(1, state.config.claim_batch_max);
    let jobs = dispatch::claim_batch(
        state.store.as_ref(),
        &state.activity,
        &state.metrics,
        limit,
    )
    .await;
    let resp = (StatusCode::OK, Json(jobs)).into_response();
    state
        .metrics
        .observe_request("/api/fuji/jobs", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn peek_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<ClaimQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let limit = query
        .limit
        .unwrap_or(state.config.peek_limit)
        .clamp(1, state.config.peek_limit);
    let jobs: Vec<ClaimedJob> = dispatch::peek_batch(state.store.as_ref(), limit)
        .await
        .into_iter()
        .map(ClaimedJob::from)
        .collect();
    let resp = (StatusCode::OK, Json(jobs)).into_response();
    state
        .metrics
        .observe_request("/api/fuji/jobs/priority", StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}

pub(crate) async fn submit_results_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(submission): Json<ResultsSubmission>,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/fuji/jobs/results";

    let validated = match validate_submission(&submission) {
        Ok(validated) => validated,
        Err(error) => {
            let resp = api_error_response(&error);
            state
                .metrics
                .observe_request(route, StatusCode::BAD_REQUEST, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
    };

    let actor = submission
        .machine_name
        .as_deref()
        .map(str::to_string)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| client_identity(&headers));

    let outcome = match reconcile::reconcile_results(
        state.store.as_ref(),
        &state.activity,
        &state.metrics,
        &actor,
        &validated,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(StoreError::NotFound) => {
            let resp = api_error_response(&ApiError::not_found("dataset"));
            state
                .metrics
                .observe_request(route, StatusCode::NOT_FOUND, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
        Err(StoreError::Unavailable(reason)) => {
            let resp = api_error_response(&ApiError::store_unavailable(&reason));
            state
                .metrics
                .observe_request(route, StatusCode::SERVICE_UNAVAILABLE, started.elapsed())
                .await;
            return with_request_id(resp, &request_id);
        }
    };

    // Accepted items are durable even when some datasets were unknown; the
    // 404 tells the worker which ids to drop from its queue.
    if !outcome.missing.is_empty() {
        let error = ApiError::new(
            fairdex_api::ApiErrorCode::NotFound,
            "dataset not found",
            json!({"datasetIds": outcome.missing, "updated": outcome.updated}),
        );
        let resp = api_error_response(&error);
        state
            .metrics
            .observe_request(route, StatusCode::NOT_FOUND, started.elapsed())
            .await;
        return with_request_id(resp, &request_id);
    }

    let resp = (StatusCode::OK, Json(json!({"message": "Results updated"}))).into_response();
    state
        .metrics
        .observe_request(route, StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}
