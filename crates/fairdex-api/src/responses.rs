// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, NaiveDate, Utc};
use fairdex_model::Author;
use serde::{Deserialize, Serialize};

/// Body of every 429 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitBody {
    pub message: String,
    pub reset_at: i64,
    pub remaining: u32,
}

impl RateLimitBody {
    #[must_use]
    pub fn new(reset_at: i64, remaining: u32) -> Self {
        Self {
            message: "Too many requests. Please try again later.".to_string(),
            reset_at,
            remaining,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FairScoreView {
    pub score: f64,
    pub evaluation_date: NaiveDate,
    pub metric_version: String,
    pub software_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexView {
    pub score: f64,
    pub created: DateTime<Utc>,
}

/// Aggregate returned by the by-doi lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ByDoiResponse {
    pub dataset_id: i64,
    pub doi: String,
    pub citation_total: i64,
    pub mention_total: i64,
    pub fair_score: Option<FairScoreView>,
    pub latest_d_index: Option<IndexView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveDoiResponse {
    pub dataset_id: i64,
    pub doi: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoiExistsResponse {
    pub exists: bool,
}

/// Shields-style badge payload for embedding score widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeResponse {
    pub doi: String,
    pub dataset_id: Option<i64>,
    pub d_index_score: Option<f64>,
    pub label: String,
    pub message: String,
    pub color: String,
    pub label_color: String,
}

impl BadgeResponse {
    pub const LABEL: &'static str = "Dataset Index";

    #[must_use]
    pub fn for_score(doi: &str, dataset_id: i64, score: Option<f64>) -> Self {
        let (message, color) = match score {
            Some(s) => (format!("{}", s.round()), "green".to_string()),
            None => ("pending".to_string(), "lightgrey".to_string()),
        };
        Self {
            doi: doi.to_string(),
            dataset_id: Some(dataset_id),
            d_index_score: score,
            label: Self::LABEL.to_string(),
            message,
            color,
            label_color: "gray".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: i64,
    pub identifier: String,
    pub identifier_type: String,
    pub title: Option<String>,
    pub publisher: Option<String>,
    pub authors: Vec<Author>,
    pub subjects: Vec<String>,
    pub published_at: Option<NaiveDate>,
    pub fair_score: Option<FairScoreView>,
    pub latest_d_index: Option<IndexView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyCount {
    /// `YYYY-MM`.
    pub month: String,
    pub count: i64,
}

/// Catalog-wide rollup served by the metrics page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsRollup {
    pub dataset_count: i64,
    pub scored_count: i64,
    pub high_fair_count: i64,
    pub cited_count: i64,
    pub average_fair_score: Option<f64>,
    pub average_s_index: Option<f64>,
    pub monthly_publications: Vec<MonthlyCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorCount {
    pub actor: String,
    pub count: u64,
}

/// Live telemetry window for one activity, ranked by count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityReport {
    pub activity: String,
    pub total: u64,
    pub actors: Vec<ActorCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_renders_pending_without_score() {
        let badge = BadgeResponse::for_score("10.5281/zenodo.1", 1, None);
        assert_eq!(badge.message, "pending");
        assert_eq!(badge.color, "lightgrey");
        assert_eq!(badge.label, "Dataset Index");
        assert_eq!(badge.label_color, "gray");
    }

    #[test]
    fn badge_rounds_score() {
        let badge = BadgeResponse::for_score("10.5281/zenodo.1", 1, Some(72.6));
        assert_eq!(badge.message, "73");
        assert_eq!(badge.color, "green");
    }

    #[test]
    fn rate_limit_body_wire_shape() {
        let json = serde_json::to_value(RateLimitBody::new(1_700_000_000, 0)).unwrap();
        assert_eq!(json["resetAt"], 1_700_000_000);
        assert_eq!(json["remaining"], 0);
        assert!(json["message"].as_str().unwrap().contains("Too many requests"));
    }
}
