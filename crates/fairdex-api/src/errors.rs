// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ApiErrorCode {
    ValidationFailed,
    InvalidQueryParameter,
    NotFound,
    RateLimited,
    StoreUnavailable,
    UpstreamFailed,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
    pub details: Value,
}

impl ApiError {
    #[must_use]
    pub fn new(code: ApiErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
        }
    }

    #[must_use]
    pub fn invalid_param(name: &str, value: &str) -> Self {
        Self::new(
            ApiErrorCode::InvalidQueryParameter,
            format!("invalid query parameter: {name}"),
            json!({"field_errors":[{"parameter": name, "reason": "invalid", "value": value}]}),
        )
    }

    #[must_use]
    pub fn validation_failed(messages: &[String]) -> Self {
        Self::new(
            ApiErrorCode::ValidationFailed,
            messages.join(", "),
            json!({"field_errors": messages}),
        )
    }

    #[must_use]
    pub fn not_found(what: &str) -> Self {
        Self::new(ApiErrorCode::NotFound, format!("{what} not found"), json!({}))
    }

    #[must_use]
    pub fn rate_limited(reset_at: i64, remaining: u32) -> Self {
        Self::new(
            ApiErrorCode::RateLimited,
            "Too many requests. Please try again later.",
            json!({"resetAt": reset_at, "remaining": remaining}),
        )
    }

    #[must_use]
    pub fn store_unavailable(reason: &str) -> Self {
        Self::new(
            ApiErrorCode::StoreUnavailable,
            "primary store unavailable",
            json!({"reason": reason}),
        )
    }

    #[must_use]
    pub fn upstream_failed(service: &str) -> Self {
        Self::new(
            ApiErrorCode::UpstreamFailed,
            format!("upstream request to {service} failed"),
            json!({"service": service}),
        )
    }

    #[must_use]
    pub fn internal(reason: &str) -> Self {
        Self::new(ApiErrorCode::Internal, "internal error", json!({"reason": reason}))
    }
}

const _: fn() = || {
    fn assert_traits<T: Serialize + for<'de> Deserialize<'de>>() {}
    assert_traits::<ApiErrorCode>();
};
