use super::redis_backend::RedisBackend;
use fairdex_api::{ActivityReport, ActorCount};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Clone)]
enum ActivityBackend {
    Redis(RedisBackend),
    Memory(Arc<Mutex<HashMap<String, (u64, Instant)>>>),
}

/// Lossy, short-lived activity counters. Each `record` call writes its own
/// uniquely-suffixed key, so concurrent writers never contend on a shared
/// counter; queries sum whatever keys are still alive.
#[derive(Clone)]
pub struct ActivityTracker {
    backend: ActivityBackend,
    nonce_seed: Arc<AtomicU64>,
    ttl: Duration,
}

impl ActivityTracker {
    #[must_use]
    pub fn memory(ttl: Duration) -> Self {
        Self {
            backend: ActivityBackend::Memory(Arc::new(Mutex::new(HashMap::new()))),
            nonce_seed: Arc::new(AtomicU64::new(1)),
            ttl,
        }
    }

    #[must_use]
    pub fn redis(backend: RedisBackend, ttl: Duration) -> Self {
        Self {
            backend: ActivityBackend::Redis(backend),
            nonce_seed: Arc::new(AtomicU64::new(1)),
            ttl,
        }
    }

    fn next_nonce(&self) -> String {
        let seq = self.nonce_seed.fetch_add(1, Ordering::Relaxed);
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        format!("{millis:x}-{seq:x}")
    }

    // Actors can contain ':' (IPv6 addresses); fold to '_' so the key layout
    // stays parseable.
    fn sanitize(segment: &str) -> String {
        let folded: String = segment
            .chars()
            .map(|c| if c == ':' || c.is_whitespace() { '_' } else { c })
            .collect();
        if folded.is_empty() {
            "unknown".to_string()
        } else {
            folded
        }
    }

    /// Best-effort: a telemetry failure is logged and swallowed, never
    /// surfaced to the request that triggered it.
    pub async fn record(&self, activity: &str, actor: &str, count: u64) {
        let key = format!(
            "activity:{}:{}:{}",
            Self::sanitize(activity),
            Self::sanitize(actor),
            self.next_nonce()
        );
        match &self.backend {
            ActivityBackend::Redis(redis) => {
                if let Err(e) = redis.set_counter(&key, count, self.ttl.as_secs()).await {
                    warn!(error = %e, activity, "activity record dropped");
                }
            }
            ActivityBackend::Memory(map) => {
                let mut map = map.lock().await;
                map.insert(key, (count, Instant::now() + self.ttl));
            }
        }
    }

    pub async fn query(&self, activity: &str, actor: Option<&str>) -> ActivityReport {
        let activity = Self::sanitize(activity);
        let scope = match actor {
            Some(actor) => format!("activity:{activity}:{}:*", Self::sanitize(actor)),
            None => format!("activity:{activity}:*"),
        };
        let entries: Vec<(String, u64)> = match &self.backend {
            ActivityBackend::Redis(redis) => match redis.scan_counts(&scope).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(error = %e, activity, "activity query degraded to empty");
                    Vec::new()
                }
            },
            ActivityBackend::Memory(map) => {
                let now = Instant::now();
                let mut map = map.lock().await;
                map.retain(|_, (_, expires)| *expires > now);
                let want = scope.trim_end_matches('*');
                map.iter()
                    .filter(|(key, _)| key.starts_with(want))
                    .map(|(key, (count, _))| (key.clone(), *count))
                    .collect()
            }
        };

        let head = format!("activity:{activity}:");
        let mut per_actor: HashMap<String, u64> = HashMap::new();
        let mut total = 0u64;
        for (key, count) in entries {
            let Some(rest) = key.strip_prefix(&head) else {
                continue;
            };
            let Some((actor, _nonce)) = rest.rsplit_once(':') else {
                continue;
            };
            *per_actor.entry(actor.to_string()).or_insert(0) += count;
            total += count;
        }
        let mut actors: Vec<ActorCount> = per_actor
            .into_iter()
            .map(|(actor, count)| ActorCount { actor, count })
            .collect();
        actors.sort_by(|a, b| b.count.cmp(&a.count).then(a.actor.cmp(&b.actor)));
        ActivityReport {
            activity,
            total,
            actors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_records_never_collide() {
        let tracker = ActivityTracker::memory(Duration::from_secs(600));
        let mut handles = Vec::new();
        for _ in 0..16 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                tracker.record("score-update", "worker-a", 1).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let report = tracker.query("score-update", Some("worker-a")).await;
        assert_eq!(report.total, 16);
        assert_eq!(report.actors.len(), 1);
    }

    #[tokio::test]
    async fn breakdown_is_ranked_by_count() {
        let tracker = ActivityTracker::memory(Duration::from_secs(600));
        tracker.record("claim", "worker-a", 2).await;
        tracker.record("claim", "worker-b", 5).await;
        tracker.record("claim", "worker-a", 1).await;
        let report = tracker.query("claim", None).await;
        assert_eq!(report.total, 8);
        assert_eq!(report.actors[0].actor, "worker-b");
        assert_eq!(report.actors[0].count, 5);
        assert_eq!(report.actors[1].actor, "worker-a");
        assert_eq!(report.actors[1].count, 3);
    }

    #[tokio::test]
    async fn expired_counters_vanish_from_queries() {
        let tracker = ActivityTracker::memory(Duration::from_millis(20));
        tracker.record("claim", "worker-a", 3).await;
        assert_eq!(tracker.query("claim", None).await.total, 3);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(tracker.query("claim", None).await.total, 0);
    }

    #[tokio::test]
    async fn ipv6_actor_keys_stay_parseable() {
        let tracker = ActivityTracker::memory(Duration::from_secs(600));
        tracker.record("resolve", "2001:db8::1", 1).await;
        let report = tracker.query("resolve", None).await;
        assert_eq!(report.total, 1);
        assert_eq!(report.actors[0].actor, "2001_db8__1");
    }
}
