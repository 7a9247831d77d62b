// SPDX-License-Identifier: Apache-2.0

use crate::{ApiError, ApiErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiErrorMapping {
    pub status_code: u16,
}

#[must_use]
pub fn map_error(error: &ApiError) -> ApiErrorMapping {
    let status_code = match error.code {
        ApiErrorCode::ValidationFailed | ApiErrorCode::InvalidQueryParameter => 400,
        ApiErrorCode::NotFound => 404,
        ApiErrorCode::RateLimited => 429,
        ApiErrorCode::StoreUnavailable => 503,
        ApiErrorCode::UpstreamFailed => 502,
        _ => 500,
    };
    ApiErrorMapping { status_code }
}
