mod common;

use axum::http::StatusCode;
use common::{assert_status, body_json, dataset, get, harness, post_json};
use serde_json::json;

fn result(dataset_id: i64, score: f64) -> serde_json::Value {
    json!({
        "datasetId": dataset_id,
        "score": score,
        "evaluationDate": "2026-08-15",
        "metricVersion": "metrics_v0.5",
        "softwareVersion": "fuji-3.4.1"
    })
}

/// Full worker round trip: seed the queue, claim it dry, submit scores,
/// replay the same batch, then pick up fresh work.
#[tokio::test]
async fn claim_score_and_replay_round_trip() {
    let h = harness();
    for id in [1, 2, 3] {
        h.store
            .insert_dataset(dataset(id, &format!("10.5281/zenodo.{id}")))
            .await;
        h.store.enqueue_job(id).await;
    }

    let first = get(&h.router, "/api/fuji/jobs?limit=2").await;
    assert_status(&first, StatusCode::OK);
    let batch: Vec<i64> = body_json(first)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_i64().unwrap())
        .collect();
    assert_eq!(batch, vec![1, 2]);

    let second = get(&h.router, "/api/fuji/jobs?limit=2").await;
    let rest: Vec<i64> = body_json(second)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_i64().unwrap())
        .collect();
    assert_eq!(rest, vec![3]);

    let drained = get(&h.router, "/api/fuji/jobs").await;
    assert_eq!(body_json(drained).await, json!([]));
    assert_eq!(h.store.pending_job_count().await, 0);

    let submission = json!({
        "results": [result(1, 61.0), result(2, 74.5), result(3, 88.0)],
        "machineName": "swarm-7"
    });
    let accepted = post_json(&h.router, "/api/fuji/jobs/results", submission.clone()).await;
    assert_status(&accepted, StatusCode::OK);
    assert_eq!(h.store.score_of(1).await, Some(61.0));
    assert_eq!(h.store.score_of(2).await, Some(74.5));
    assert_eq!(h.store.score_of(3).await, Some(88.0));

    // A worker that crashed before its ack retries the exact same batch.
    // Nothing changes, nothing errors.
    let replay = post_json(&h.router, "/api/fuji/jobs/results", submission).await;
    assert_status(&replay, StatusCode::OK);
    assert_eq!(h.store.score_of(2).await, Some(74.5));

    // A lagging worker reports a worse score for the same dataset.
    let stale = post_json(
        &h.router,
        "/api/fuji/jobs/results",
        json!({"results": [result(2, 40.0)]}),
    )
    .await;
    assert_status(&stale, StatusCode::OK);
    assert_eq!(h.store.score_of(2).await, Some(74.5));

    h.store.insert_dataset(dataset(4, "10.5281/zenodo.4")).await;
    h.store.enqueue_job(4).await;
    let fresh = get(&h.router, "/api/fuji/jobs").await;
    let ids: Vec<i64> = body_json(fresh)
        .await
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![4]);
}

/// The acceptance rule is strictly greater. Out-of-order reports for one
/// dataset settle on the maximum and every non-improving report is a no-op.
#[tokio::test]
async fn interleaved_reports_settle_on_the_maximum() {
    let h = harness();
    h.store.insert_dataset(dataset(1, "10.5281/zenodo.1")).await;
    h.store.enqueue_job(1).await;

    for score in [60.0, 55.0, 80.0, 80.0, 40.0] {
        let response = post_json(
            &h.router,
            "/api/fuji/jobs/results",
            json!({"results": [result(1, score)]}),
        )
        .await;
        assert_status(&response, StatusCode::OK);
    }
    assert_eq!(h.store.score_of(1).await, Some(80.0));

    let report = body_json(get(&h.router, "/api/activity?activity=score-update").await).await;
    assert_eq!(report["total"], 2);
    let duplicates =
        body_json(get(&h.router, "/api/activity?activity=score-duplicate").await).await;
    assert_eq!(duplicates["total"], 3);
}
