use serde::Serialize;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

/// High-FAIR threshold used by the rollup counters.
pub const HIGH_FAIR_THRESHOLD: f64 = 75.0;

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub claim_batch_limit: i64,
    pub claim_batch_max: i64,
    pub peek_limit: i64,
    pub proxy_rate_limit: RateLimitConfig,
    pub by_doi_ttl: Duration,
    pub url_resolution_ttl: Duration,
    pub doi_exists_ttl: Duration,
    pub rollup_ttl: Duration,
    pub activity_ttl: Duration,
    pub redis_url: Option<String>,
    pub redis_prefix: String,
    pub redis_timeout_ms: u64,
    pub redis_retry_attempts: usize,
    pub redis_breaker_failure_threshold: u32,
    pub redis_breaker_open_ms: u64,
    pub redis_max_key_bytes: usize,
    pub redis_max_cardinality: usize,
    pub redis_max_ttl_secs: u64,
    pub datacite_base_url: String,
    pub sindex_base_url: String,
    pub enable_json_logs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 256 * 1024,
            request_timeout: Duration::from_secs(10),
            claim_batch_limit: 3,
            claim_batch_max: 30,
            peek_limit: 30,
            proxy_rate_limit: RateLimitConfig::default(),
            by_doi_ttl: Duration::from_secs(300),
            url_resolution_ttl: Duration::from_secs(3600),
            doi_exists_ttl: Duration::from_secs(90 * 24 * 3600),
            rollup_ttl: Duration::from_secs(900),
            activity_ttl: Duration::from_secs(600),
            redis_url: None,
            redis_prefix: "fairdex".to_string(),
            redis_timeout_ms: 50,
            redis_retry_attempts: 2,
            redis_breaker_failure_threshold: 8,
            redis_breaker_open_ms: 3000,
            redis_max_key_bytes: 512,
            redis_max_cardinality: 100_000,
            redis_max_ttl_secs: 90 * 24 * 3600,
            datacite_base_url: "https://api.datacite.org".to_string(),
            sindex_base_url: "http://s-index-api.internal".to_string(),
            enable_json_logs: true,
        }
    }
}

pub fn validate_startup_config_contract(api: &ApiConfig) -> Result<(), String> {
    if api.max_body_bytes == 0 {
        return Err("max_body_bytes must be > 0".to_string());
    }
    if api.request_timeout.is_zero() {
        return Err("request_timeout must be > 0".to_string());
    }
    if api.claim_batch_limit < 1 || api.claim_batch_limit > api.claim_batch_max {
        return Err("claim_batch_limit must be within 1..=claim_batch_max".to_string());
    }
    if api.peek_limit < 1 {
        return Err("peek_limit must be >= 1".to_string());
    }
    if api.proxy_rate_limit.max_requests == 0 || api.proxy_rate_limit.window.is_zero() {
        return Err("proxy rate limit requires max_requests > 0 and window > 0".to_string());
    }
    for (name, ttl) in [
        ("by_doi_ttl", api.by_doi_ttl),
        ("url_resolution_ttl", api.url_resolution_ttl),
        ("doi_exists_ttl", api.doi_exists_ttl),
        ("rollup_ttl", api.rollup_ttl),
        ("activity_ttl", api.activity_ttl),
    ] {
        if ttl.is_zero() {
            return Err(format!("{name} must be > 0"));
        }
    }
    if api.redis_prefix.is_empty() || api.redis_prefix.contains(':') {
        return Err("redis_prefix must be non-empty and contain no ':'".to_string());
    }
    if api.doi_exists_ttl.as_secs() > api.redis_max_ttl_secs {
        return Err("redis_max_ttl_secs must cover doi_exists_ttl".to_string());
    }
    if api.datacite_base_url.is_empty() || api.sindex_base_url.is_empty() {
        return Err("upstream base urls must be non-empty".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_startup_contract() {
        validate_startup_config_contract(&ApiConfig::default()).expect("default config valid");
    }

    #[test]
    fn startup_contract_rejects_inverted_claim_limits() {
        let api = ApiConfig {
            claim_batch_limit: 50,
            claim_batch_max: 30,
            ..ApiConfig::default()
        };
        let err = validate_startup_config_contract(&api).expect_err("invalid claim limits");
        assert!(err.contains("claim_batch_limit"));
    }

    #[test]
    fn startup_contract_rejects_colon_in_prefix() {
        let api = ApiConfig {
            redis_prefix: "fair:dex".to_string(),
            ..ApiConfig::default()
        };
        let err = validate_startup_config_contract(&api).expect_err("invalid prefix");
        assert!(err.contains("redis_prefix"));
    }

    #[test]
    fn startup_contract_requires_ttl_headroom() {
        let api = ApiConfig {
            redis_max_ttl_secs: 60,
            ..ApiConfig::default()
        };
        let err = validate_startup_config_contract(&api).expect_err("ttl headroom");
        assert!(err.contains("redis_max_ttl_secs"));
    }
}
