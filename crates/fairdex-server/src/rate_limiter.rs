use crate::config::RateLimitConfig;
use crate::telemetry::redis_backend::RedisBackend;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Unix second at which the current window closes.
    pub reset_at: i64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: i64,
    count: u32,
}

#[derive(Clone)]
enum LimiterBackend {
    Redis(RedisBackend),
    Memory(Arc<Mutex<HashMap<String, Window>>>),
}

/// Fixed-window request limiter. Windows are anchored to wall-clock
/// boundaries, so every replica agrees on the window without coordination.
#[derive(Clone)]
pub struct RateLimiter {
    backend: LimiterBackend,
}

impl RateLimiter {
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: LimiterBackend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    #[must_use]
    pub fn redis(backend: RedisBackend) -> Self {
        Self {
            backend: LimiterBackend::Redis(backend),
        }
    }

    pub async fn check(&self, scope: &str, key: &str, cfg: &RateLimitConfig) -> RateDecision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        self.check_at(scope, key, cfg, now).await
    }

    /// Clock-parameterized variant; `now` is the current unix second.
    pub async fn check_at(
        &self,
        scope: &str,
        key: &str,
        cfg: &RateLimitConfig,
        now: i64,
    ) -> RateDecision {
        let window_secs = (cfg.window.as_secs() as i64).max(1);
        let start = now - now.rem_euclid(window_secs);
        let reset_at = start + window_secs;
        let count = match &self.backend {
            LimiterBackend::Redis(redis) => {
                match redis.incr_window(scope, key, window_secs as u64).await {
                    Ok(count) => count.clamp(0, i64::from(u32::MAX)) as u32,
                    Err(e) => {
                        // Degrade open: losing the limiter must not take the
                        // endpoint down with it.
                        warn!(error = %e, scope, "rate limit backend failed, allowing request");
                        1
                    }
                }
            }
            LimiterBackend::Memory(windows) => {
                let mut windows = windows.lock().await;
                let entry = windows
                    .entry(format!("{scope}:{key}"))
                    .or_insert(Window { start, count: 0 });
                if entry.start != start {
                    entry.start = start;
                    entry.count = 0;
                }
                entry.count = entry.count.saturating_add(1);
                entry.count
            }
        };
        RateDecision {
            allowed: count <= cfg.max_requests,
            limit: cfg.max_requests,
            remaining: cfg.max_requests.saturating_sub(count),
            reset_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn five_per_minute() -> RateLimitConfig {
        RateLimitConfig {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn sixth_request_in_window_is_denied() {
        let limiter = RateLimiter::memory();
        let cfg = five_per_minute();
        let now = 1_756_600_000;
        for i in 0..5 {
            let d = limiter.check_at("resolve", "1.2.3.4", &cfg, now + i).await;
            assert!(d.allowed, "request {i} should pass");
            assert_eq!(d.remaining, 4 - i as u32);
        }
        let denied = limiter.check_at("resolve", "1.2.3.4", &cfg, now + 10).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at, (now - now % 60) + 60);
    }

    #[tokio::test]
    async fn window_resets_after_expiry() {
        let limiter = RateLimiter::memory();
        let cfg = five_per_minute();
        let now = 1_756_600_000;
        for _ in 0..6 {
            let _ = limiter.check_at("resolve", "1.2.3.4", &cfg, now).await;
        }
        assert!(!limiter.check_at("resolve", "1.2.3.4", &cfg, now).await.allowed);
        let next_window = (now - now % 60) + 60;
        let d = limiter.check_at("resolve", "1.2.3.4", &cfg, next_window).await;
        assert!(d.allowed);
        assert_eq!(d.remaining, 4);
    }

    #[tokio::test]
    async fn identities_are_isolated() {
        let limiter = RateLimiter::memory();
        let cfg = five_per_minute();
        let now = 1_756_600_000;
        for _ in 0..6 {
            let _ = limiter.check_at("resolve", "1.2.3.4", &cfg, now).await;
        }
        assert!(limiter.check_at("resolve", "5.6.7.8", &cfg, now).await.allowed);
        assert!(limiter.check_at("other", "1.2.3.4", &cfg, now).await.allowed);
    }
}
