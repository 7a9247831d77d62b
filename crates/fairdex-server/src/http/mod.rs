use crate::cache::CacheStatus;
use crate::rate_limiter::RateDecision;
use crate::telemetry::RequestMetrics;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use std::sync::atomic::Ordering;

pub mod datasets;
pub mod jobs;
pub mod ops;
pub mod resolve;

/// Caller identity for rate limiting and telemetry: first forwarded-for
/// entry, then the real-ip header, then a fixed sentinel. The service sits
/// behind a proxy in every deployment, so the peer address is not useful.
pub(crate) fn client_identity(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        let real_ip = real_ip.trim();
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    "unknown".to_string()
}

pub(crate) fn with_rate_limit_headers(mut response: Response, decision: &RateDecision) -> Response {
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(&decision.limit.to_string()) {
        headers.insert("x-ratelimit-limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", v);
    }
    if let Ok(v) = HeaderValue::from_str(&decision.reset_at.to_string()) {
        headers.insert("x-ratelimit-reset", v);
    }
    response
}

pub(crate) fn with_cache_status(mut response: Response, status: CacheStatus) -> Response {
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static(status.as_str()));
    response
}

pub(crate) fn observe_cache(metrics: &RequestMetrics, status: CacheStatus) {
    match status {
        CacheStatus::Hit => metrics.cache_hits.fetch_add(1, Ordering::Relaxed),
        CacheStatus::Miss => metrics.cache_misses.fetch_add(1, Ordering::Relaxed),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());
        headers.insert("x-real-ip", "5.6.7.8".parse().unwrap());
        assert_eq!(client_identity(&headers), "1.2.3.4");
    }

    #[test]
    fn identity_falls_back_to_real_ip_then_unknown() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "5.6.7.8".parse().unwrap());
        assert_eq!(client_identity(&headers), "5.6.7.8");
        assert_eq!(client_identity(&HeaderMap::new()), "unknown");
    }
}
