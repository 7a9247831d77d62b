// SPDX-License-Identifier: Apache-2.0

//! DTOs exchanged with the deployed worker fleet. Field names are camelCase
//! on the wire and must not change without a fleet rollout.

use crate::{ApiError, ApiErrorCode};
use chrono::{DateTime, NaiveDate};
use fairdex_model::{IdentifierType, JobDescriptor, ScoreValue};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One unit of work handed to a worker at claim time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedJob {
    pub id: i64,
    pub identifier: String,
    pub identifier_type: IdentifierType,
}

impl From<JobDescriptor> for ClaimedJob {
    fn from(job: JobDescriptor) -> Self {
        Self {
            id: job.dataset_id,
            identifier: job.identifier,
            identifier_type: job.identifier_type,
        }
    }
}

/// One scored dataset as reported by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub dataset_id: i64,
    pub score: f64,
    pub evaluation_date: String,
    pub metric_version: String,
    pub software_version: String,
}

/// Worker result batch. `machine_name` identifies the reporting worker for
/// telemetry; absent for anonymous submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsSubmission {
    pub results: Vec<ScoreResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,
}

/// A submission item that passed shape and range validation. Reconciliation
/// consumes these; raw `ScoreResult`s never reach the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedResult {
    pub dataset_id: i64,
    pub score: ScoreValue,
    pub evaluation_date: NaiveDate,
    pub metric_version: String,
    pub software_version: String,
}

fn parse_evaluation_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Validates the whole batch before any write happens. Returns every
/// violation, not just the first, so a worker can fix its payload in one go.
pub fn validate_submission(
    submission: &ResultsSubmission,
) -> Result<Vec<ValidatedResult>, ApiError> {
    let mut errors: Vec<String> = Vec::new();
    let mut validated = Vec::with_capacity(submission.results.len());

    if submission.results.is_empty() {
        errors.push("results must not be empty".to_string());
    }

    for (i, item) in submission.results.iter().enumerate() {
        if item.dataset_id <= 0 {
            errors.push(format!("results[{i}].datasetId must be a positive integer"));
        }
        let score = match ScoreValue::parse(item.score) {
            Ok(score) => Some(score),
            Err(e) => {
                errors.push(format!("results[{i}].score: {e}"));
                None
            }
        };
        let evaluation_date = match parse_evaluation_date(&item.evaluation_date) {
            Some(date) => Some(date),
            None => {
                errors.push(format!(
                    "results[{i}].evaluationDate must be an ISO date, got '{}'",
                    item.evaluation_date
                ));
                None
            }
        };
        if item.metric_version.trim().is_empty() {
            errors.push(format!("results[{i}].metricVersion must not be empty"));
        }
        if item.software_version.trim().is_empty() {
            errors.push(format!("results[{i}].softwareVersion must not be empty"));
        }
        if let (Some(score), Some(evaluation_date)) = (score, evaluation_date) {
            if item.dataset_id > 0
                && !item.metric_version.trim().is_empty()
                && !item.software_version.trim().is_empty()
            {
                validated.push(ValidatedResult {
                    dataset_id: item.dataset_id,
                    score,
                    evaluation_date,
                    metric_version: item.metric_version.trim().to_string(),
                    software_version: item.software_version.trim().to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(ApiError::new(
            ApiErrorCode::ValidationFailed,
            errors.join(", "),
            json!({"field_errors": errors}),
        ))
    }
}
