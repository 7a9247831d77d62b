use crate::config::CONFIG_SCHEMA_VERSION;
use crate::{api_error_response, propagated_request_id, with_request_id, AppState, CRATE_NAME};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fairdex_api::ApiError;
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;

pub(crate) async fn healthz_handler() -> Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

/// Readiness is a cheap store probe; a failing primary store means this
/// replica should stop receiving traffic.
pub(crate) async fn readyz_handler(State(state): State<AppState>) -> Response {
    match state.store.peek_jobs(1).await {
        Ok(_) => (StatusCode::OK, Json(json!({"status": "ready"}))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "reason": e.to_string()})),
        )
            .into_response(),
    }
}

pub(crate) async fn version_handler() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "crate": CRATE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "configSchema": CONFIG_SCHEMA_VERSION,
        })),
    )
        .into_response()
}

pub(crate) async fn cache_flush_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/cache/flush";

    let (resp, status) = match state.cache.flush().await {
        Ok(flushed) => (
            (
                StatusCode::OK,
                Json(json!({"ok": true, "flushed": flushed})),
            )
                .into_response(),
            StatusCode::OK,
        ),
        Err(e) => (
            api_error_response(&ApiError::internal(&e.to_string())),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    };
    state.metrics.observe_request(route, status, started.elapsed()).await;
    with_request_id(resp, &request_id)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActivityQuery {
    activity: Option<String>,
    actor: Option<String>,
}

pub(crate) async fn activity_handler(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&state, &headers);
    let started = Instant::now();
    let route = "/api/activity";

    let Some(activity) = query.activity.filter(|a| !a.trim().is_empty()) else {
        let resp = api_error_response(&ApiError::invalid_param("activity", ""));
        state
            .metrics
            .observe_request(route, StatusCode::BAD_REQUEST, started.elapsed())
            .await;
        return with_request_id(resp, &request_id);
    };

    let report = state
        .activity
        .query(&activity, query.actor.as_deref())
        .await;
    let resp = (StatusCode::OK, Json(report)).into_response();
    state
        .metrics
        .observe_request(route, StatusCode::OK, started.elapsed())
        .await;
    with_request_id(resp, &request_id)
}
