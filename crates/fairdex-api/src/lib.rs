// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

mod error_mapping;
mod errors;
mod responses;
mod wire;

pub use error_mapping::{map_error, ApiErrorMapping};
pub use errors::{ApiError, ApiErrorCode};
pub use responses::{
    ActivityReport, ActorCount, BadgeResponse, ByDoiResponse, DatasetSummary, DoiExistsResponse,
    FairScoreView, IndexView, MetricsRollup, MonthlyCount, RateLimitBody, ResolveDoiResponse,
};
pub use wire::{
    validate_submission, ClaimedJob, ResultsSubmission, ScoreResult, ValidatedResult,
};

pub const CRATE_NAME: &str = "fairdex-api";
