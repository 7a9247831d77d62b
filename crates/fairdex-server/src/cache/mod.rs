use crate::telemetry::redis_backend::RedisBackend;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug)]
pub struct CacheError(pub String);

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for CacheError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
        }
    }
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;
    async fn flush(&self) -> Result<u64, CacheError>;
}

pub struct MemoryCacheBackend {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryCacheBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn flush(&self) -> Result<u64, CacheError> {
        let mut entries = self.entries.lock().await;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }
}

pub struct RedisCacheBackend {
    backend: RedisBackend,
}

impl RedisCacheBackend {
    #[must_use]
    pub fn new(backend: RedisBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.backend.get_bytes(key).await.map_err(CacheError)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        self.backend
            .set_bytes(key, value, ttl.as_secs())
            .await
            .map_err(CacheError)
    }

    async fn flush(&self) -> Result<u64, CacheError> {
        self.backend.delete_matching("cache:*").await.map_err(CacheError)
    }
}

/// Cache-aside over serialized JSON payloads. Never authoritative: a backend
/// failure degrades to computing fresh, and writes are best-effort.
#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
}

impl ResponseCache {
    #[must_use]
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheBackend::new()))
    }

    fn full_key(domain: &str, key: &str) -> String {
        format!("cache:{domain}:{key}")
    }

    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        domain: &str,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<(T, CacheStatus), E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let full_key = Self::full_key(domain, key);
        match self.backend.get(&full_key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => return Ok((value, CacheStatus::Hit)),
                Err(e) => {
                    warn!(key = %full_key, error = %e, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(key = %full_key, error = %e, "cache read failed, computing fresh");
            }
        }
        let value = compute().await?;
        match serde_json::to_vec(&value) {
            Ok(bytes) => {
                if let Err(e) = self.backend.set(&full_key, &bytes, ttl).await {
                    warn!(key = %full_key, error = %e, "cache write dropped");
                }
            }
            Err(e) => warn!(key = %full_key, error = %e, "cache serialization failed"),
        }
        Ok((value, CacheStatus::Miss))
    }

    pub async fn flush(&self) -> Result<u64, CacheError> {
        self.backend.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    async fn counted(calls: &AtomicU64) -> Result<u64, CacheError> {
        Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[tokio::test]
    async fn computes_once_within_ttl() {
        let cache = ResponseCache::in_memory();
        let calls = AtomicU64::new(0);
        let (v1, s1) = cache
            .get_or_compute("t", "k", Duration::from_secs(60), || counted(&calls))
            .await
            .unwrap();
        let (v2, s2) = cache
            .get_or_compute("t", "k", Duration::from_secs(60), || counted(&calls))
            .await
            .unwrap();
        assert_eq!((v1, s1), (1, CacheStatus::Miss));
        assert_eq!((v2, s2), (1, CacheStatus::Hit));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recomputes_after_expiry() {
        let cache = ResponseCache::in_memory();
        let calls = AtomicU64::new(0);
        let _ = cache
            .get_or_compute("t", "k", Duration::from_millis(20), || counted(&calls))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let (v, status) = cache
            .get_or_compute("t", "k", Duration::from_millis(20), || counted(&calls))
            .await
            .unwrap();
        assert_eq!(v, 2);
        assert_eq!(status, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn flush_empties_the_namespace() {
        let cache = ResponseCache::in_memory();
        let calls = AtomicU64::new(0);
        let _ = cache
            .get_or_compute("a", "x", Duration::from_secs(60), || counted(&calls))
            .await
            .unwrap();
        let _ = cache
            .get_or_compute("b", "y", Duration::from_secs(60), || counted(&calls))
            .await
            .unwrap();
        assert_eq!(cache.flush().await.unwrap(), 2);
        let (_, status) = cache
            .get_or_compute("a", "x", Duration::from_secs(60), || counted(&calls))
            .await
            .unwrap();
        assert_eq!(status, CacheStatus::Miss);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share_entries() {
        let cache = ResponseCache::in_memory();
        let calls = AtomicU64::new(0);
        let (v1, _) = cache
            .get_or_compute("t", "k1", Duration::from_secs(60), || counted(&calls))
            .await
            .unwrap();
        let (v2, _) = cache
            .get_or_compute("t", "k2", Duration::from_secs(60), || counted(&calls))
            .await
            .unwrap();
        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
    }
}
