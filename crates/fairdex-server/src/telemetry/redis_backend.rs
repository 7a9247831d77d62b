use crate::config::ApiConfig;
use redis::AsyncCommands;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct RedisPolicy {
    pub timeout: Duration,
    pub retry_attempts: usize,
    pub breaker_failure_threshold: u32,
    pub breaker_open_duration: Duration,
    pub max_key_bytes: usize,
    pub max_cardinality: usize,
    pub max_ttl_secs: u64,
}

impl Default for RedisPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(50),
            retry_attempts: 2,
            breaker_failure_threshold: 8,
            breaker_open_duration: Duration::from_millis(3000),
            max_key_bytes: 512,
            max_cardinality: 100_000,
            max_ttl_secs: 90 * 24 * 3600,
        }
    }
}

impl RedisPolicy {
    #[must_use]
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            timeout: Duration::from_millis(api.redis_timeout_ms),
            retry_attempts: api.redis_retry_attempts,
            breaker_failure_threshold: api.redis_breaker_failure_threshold,
            breaker_open_duration: Duration::from_millis(api.redis_breaker_open_ms),
            max_key_bytes: api.redis_max_key_bytes,
            max_cardinality: api.redis_max_cardinality,
            max_ttl_secs: api.redis_max_ttl_secs,
        }
    }
}

#[derive(Default)]
struct RedisBreakerState {
    failure_count: u32,
    open_until: Option<Instant>,
}

#[derive(Default)]
pub struct RedisMetrics {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub read_fallbacks: AtomicU64,
    pub write_fallbacks: AtomicU64,
    pub rate_limit_fallbacks: AtomicU64,
    pub telemetry_fallbacks: AtomicU64,
    pub breaker_open_total: AtomicU64,
    pub breaker_reject_total: AtomicU64,
    pub key_reject_total: AtomicU64,
    pub cardinality_reject_total: AtomicU64,
}

#[derive(Clone)]
pub struct RedisBackend {
    client: redis::Client,
    prefix: String,
    policy: RedisPolicy,
    breaker: Arc<Mutex<RedisBreakerState>>,
    key_registry: Arc<Mutex<HashSet<String>>>,
    pub metrics: Arc<RedisMetrics>,
}

impl RedisBackend {
    pub fn new(url: &str, prefix: &str, policy: RedisPolicy) -> Result<Self, String> {
        let client = redis::Client::open(url).map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
            policy,
            breaker: Arc::new(Mutex::new(RedisBreakerState::default())),
            key_registry: Arc::new(Mutex::new(HashSet::new())),
            metrics: Arc::new(RedisMetrics::default()),
        })
    }

    async fn breaker_check(&self) -> Result<(), String> {
        let lock = self.breaker.lock().await;
        if let Some(until) = lock.open_until {
            if Instant::now() < until {
                self.metrics
                    .breaker_reject_total
                    .fetch_add(1, Ordering::Relaxed);
                return Err("redis breaker open".to_string());
            }
        }
        Ok(())
    }

    async fn record_failure(&self, fallback_counter: &AtomicU64, msg: &str) -> String {
        fallback_counter.fetch_add(1, Ordering::Relaxed);
        let mut lock = self.breaker.lock().await;
        lock.failure_count += 1;
        if lock.failure_count >= self.policy.breaker_failure_threshold {
            lock.open_until = Some(Instant::now() + self.policy.breaker_open_duration);
            self.metrics
                .breaker_open_total
                .fetch_add(1, Ordering::Relaxed);
        }
        msg.to_string()
    }

    async fn record_success(&self) {
        let mut lock = self.breaker.lock().await;
        lock.failure_count = 0;
        lock.open_until = None;
    }

    async fn with_retry<T, Fut, F>(&self, mut op: F) -> Result<T, String>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, String>>,
    {
        let attempts = self.policy.retry_attempts.max(1);
        let mut last = None;
        for i in 0..attempts {
            match timeout(self.policy.timeout, op()).await {
                Ok(Ok(v)) => return Ok(v),
                Ok(Err(e)) => last = Some(e),
                Err(_) => last = Some("redis timeout".to_string()),
            }
            if i + 1 < attempts {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
        Err(last.unwrap_or_else(|| "redis failure".to_string()))
    }

    fn check_key_budget(&self, full_key: &str) -> Result<(), String> {
        if full_key.len() > self.policy.max_key_bytes {
            self.metrics
                .key_reject_total
                .fetch_add(1, Ordering::Relaxed);
            return Err("redis key rejected by max key size policy".to_string());
        }
        Ok(())
    }

    /// Fixed-window counter. The window start second is baked into the key,
    /// so INCR on a fresh window starts from zero without coordination.
    pub async fn incr_window(
        &self,
        scope: &str,
        key: &str,
        window_secs: u64,
    ) -> Result<i64, String> {
        self.breaker_check().await?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_secs();
        let window_start = now - (now % window_secs.max(1));
        let window_key = format!("{}:rl:{scope}:{key}:{window_start}", self.prefix);
        self.check_key_budget(&window_key)?;
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let window_key = window_key.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let count: i64 = conn
                        .incr(&window_key, 1_i64)
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: bool = conn
                        .expire(&window_key, window_secs as i64 + 1)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(count)
                }
            })
            .await;
        match result {
            Ok(v) => {
                self.record_success().await;
                Ok(v)
            }
            Err(e) => Err(self
                .record_failure(&self.metrics.rate_limit_fallbacks, &e)
                .await),
        }
    }

    /// Writes one telemetry counter under its own key with a TTL.
    pub async fn set_counter(
        &self,
        key_suffix: &str,
        value: u64,
        ttl_secs: u64,
    ) -> Result<(), String> {
        self.breaker_check().await?;
        let full_key = format!("{}:{key_suffix}", self.prefix);
        self.check_key_budget(&full_key)?;
        let ttl = ttl_secs.clamp(1, self.policy.max_ttl_secs);
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let full_key = full_key.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: () = conn
                        .set_ex(full_key, value, ttl)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(())
                }
            })
            .await;
        match result {
            Ok(()) => {
                self.record_success().await;
                Ok(())
            }
            Err(e) => Err(self
                .record_failure(&self.metrics.telemetry_fallbacks, &e)
                .await),
        }
    }

    /// SCANs live keys under `{prefix}:{suffix_pattern}` and returns each
    /// key (prefix stripped) with its integer value. Keys that expire
    /// between SCAN and MGET read as zero.
    pub async fn scan_counts(&self, suffix_pattern: &str) -> Result<Vec<(String, u64)>, String> {
        self.breaker_check().await?;
        let pattern = format!("{}:{suffix_pattern}", self.prefix);
        let strip = format!("{}:", self.prefix);
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let pattern = pattern.clone();
                let strip = strip.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let mut keys: Vec<String> = Vec::new();
                    {
                        let mut iter = conn
                            .scan_match::<_, String>(&pattern)
                            .await
                            .map_err(|e| e.to_string())?;
                        while let Some(key) = iter.next_item().await {
                            keys.push(key);
                        }
                    }
                    if keys.is_empty() {
                        return Ok(Vec::new());
                    }
                    let values: Vec<Option<u64>> =
                        conn.mget(&keys).await.map_err(|e| e.to_string())?;
                    Ok(keys
                        .into_iter()
                        .zip(values)
                        .map(|(key, value)| {
                            let short = key.strip_prefix(&strip).unwrap_or(&key).to_string();
                            (short, value.unwrap_or(0))
                        })
                        .collect())
                }
            })
            .await;
        match result {
            Ok(v) => {
                self.record_success().await;
                Ok(v)
            }
            Err(e) => Err(self.record_failure(&self.metrics.read_fallbacks, &e).await),
        }
    }

    pub async fn get_bytes(&self, key_suffix: &str) -> Result<Option<Vec<u8>>, String> {
        self.breaker_check().await?;
        let full_key = format!("{}:{key_suffix}", self.prefix);
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let full_key = full_key.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    conn.get(full_key).await.map_err(|e| e.to_string())
                }
            })
            .await;
        match result {
            Ok(Some(v)) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(Some(v))
            }
            Ok(None) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                self.record_success().await;
                Ok(None)
            }
            Err(e) => Err(self.record_failure(&self.metrics.read_fallbacks, &e).await),
        }
    }

    pub async fn set_bytes(
        &self,
        key_suffix: &str,
        value: &[u8],
        ttl_secs: u64,
    ) -> Result<(), String> {
        self.breaker_check().await?;
        let full_key = format!("{}:{key_suffix}", self.prefix);
        self.check_key_budget(&full_key)?;
        let ttl = ttl_secs.clamp(1, self.policy.max_ttl_secs);
        {
            let mut keys = self.key_registry.lock().await;
            if !keys.contains(&full_key) && keys.len() >= self.policy.max_cardinality {
                self.metrics
                    .cardinality_reject_total
                    .fetch_add(1, Ordering::Relaxed);
                return Err("redis key rejected by max cardinality policy".to_string());
            }
            keys.insert(full_key.clone());
        }
        let payload = value.to_vec();
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let full_key = full_key.clone();
                let payload = payload.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let _: () = conn
                        .set_ex(full_key, payload, ttl)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok(())
                }
            })
            .await;
        match result {
            Ok(()) => {
                self.record_success().await;
                Ok(())
            }
            Err(e) => Err(self.record_failure(&self.metrics.write_fallbacks, &e).await),
        }
    }

    /// Deletes every key under `{prefix}:{suffix_pattern}`. Returns the
    /// number of keys removed.
    pub async fn delete_matching(&self, suffix_pattern: &str) -> Result<u64, String> {
        self.breaker_check().await?;
        let pattern = format!("{}:{suffix_pattern}", self.prefix);
        let this = self.clone();
        let result = self
            .with_retry(move || {
                let this = this.clone();
                let pattern = pattern.clone();
                async move {
                    let mut conn = this
                        .client
                        .get_multiplexed_async_connection()
                        .await
                        .map_err(|e| e.to_string())?;
                    let mut keys: Vec<String> = Vec::new();
                    {
                        let mut iter = conn
                            .scan_match::<_, String>(&pattern)
                            .await
                            .map_err(|e| e.to_string())?;
                        while let Some(key) = iter.next_item().await {
                            keys.push(key);
                        }
                    }
                    if keys.is_empty() {
                        return Ok(0);
                    }
                    let deleted: u64 = conn.del(&keys).await.map_err(|e| e.to_string())?;
                    Ok(deleted)
                }
            })
            .await;
        match result {
            Ok(v) => {
                self.record_success().await;
                self.key_registry.lock().await.clear();
                Ok(v)
            }
            Err(e) => Err(self.record_failure(&self.metrics.write_fallbacks, &e).await),
        }
    }
}
