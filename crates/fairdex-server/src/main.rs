#![forbid(unsafe_code)]

use fairdex_server::cache::{MemoryCacheBackend, RedisCacheBackend, ResponseCache};
use fairdex_server::config::{validate_startup_config_contract, ApiConfig, RateLimitConfig};
use fairdex_server::rate_limiter::RateLimiter;
use fairdex_server::store::{CatalogStore, FakeCatalogStore, PgCatalogStore};
use fairdex_server::telemetry::{ActivityTracker, RedisBackend, RedisPolicy};
use fairdex_server::upstream::HttpUpstream;
use fairdex_server::{build_router, AppState};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn env_duration_secs(name: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_u64(name, default_secs))
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn config_from_env() -> ApiConfig {
    let defaults = ApiConfig::default();
    ApiConfig {
        max_body_bytes: env_usize("FAIRDEX_MAX_BODY_BYTES", defaults.max_body_bytes),
        request_timeout: env_duration_secs(
            "FAIRDEX_REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        ),
        claim_batch_limit: env_i64("FAIRDEX_CLAIM_BATCH_LIMIT", defaults.claim_batch_limit),
        claim_batch_max: env_i64("FAIRDEX_CLAIM_BATCH_MAX", defaults.claim_batch_max),
        peek_limit: env_i64("FAIRDEX_PEEK_LIMIT", defaults.peek_limit),
        proxy_rate_limit: RateLimitConfig {
            max_requests: env_u32(
                "FAIRDEX_RATE_LIMIT_MAX",
                defaults.proxy_rate_limit.max_requests,
            ),
            window: env_duration_secs(
                "FAIRDEX_RATE_LIMIT_WINDOW_SECS",
                defaults.proxy_rate_limit.window.as_secs(),
            ),
        },
        by_doi_ttl: env_duration_secs("FAIRDEX_BY_DOI_TTL_SECS", defaults.by_doi_ttl.as_secs()),
        url_resolution_ttl: env_duration_secs(
            "FAIRDEX_URL_RESOLUTION_TTL_SECS",
            defaults.url_resolution_ttl.as_secs(),
        ),
        doi_exists_ttl: env_duration_secs(
            "FAIRDEX_DOI_EXISTS_TTL_SECS",
            defaults.doi_exists_ttl.as_secs(),
        ),
        rollup_ttl: env_duration_secs("FAIRDEX_ROLLUP_TTL_SECS", defaults.rollup_ttl.as_secs()),
        activity_ttl: env_duration_secs(
            "FAIRDEX_ACTIVITY_TTL_SECS",
            defaults.activity_ttl.as_secs(),
        ),
        redis_url: env::var("FAIRDEX_REDIS_URL").ok().filter(|v| !v.is_empty()),
        redis_prefix: env::var("FAIRDEX_REDIS_PREFIX").unwrap_or(defaults.redis_prefix),
        redis_timeout_ms: env_u64("FAIRDEX_REDIS_TIMEOUT_MS", defaults.redis_timeout_ms),
        redis_retry_attempts: env_usize(
            "FAIRDEX_REDIS_RETRY_ATTEMPTS",
            defaults.redis_retry_attempts,
        ),
        redis_breaker_failure_threshold: env_u32(
            "FAIRDEX_REDIS_BREAKER_THRESHOLD",
            defaults.redis_breaker_failure_threshold,
        ),
        redis_breaker_open_ms: env_u64(
            "FAIRDEX_REDIS_BREAKER_OPEN_MS",
            defaults.redis_breaker_open_ms,
        ),
        redis_max_key_bytes: env_usize(
            "FAIRDEX_REDIS_MAX_KEY_BYTES",
            defaults.redis_max_key_bytes,
        ),
        redis_max_cardinality: env_usize(
            "FAIRDEX_REDIS_MAX_CARDINALITY",
            defaults.redis_max_cardinality,
        ),
        redis_max_ttl_secs: env_u64("FAIRDEX_REDIS_MAX_TTL_SECS", defaults.redis_max_ttl_secs),
        datacite_base_url: env::var("FAIRDEX_DATACITE_BASE_URL")
            .unwrap_or(defaults.datacite_base_url),
        sindex_base_url: env::var("FAIRDEX_SINDEX_BASE_URL").unwrap_or(defaults.sindex_base_url),
        enable_json_logs: env_bool("FAIRDEX_LOG_JSON", defaults.enable_json_logs),
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = config_from_env();
    init_tracing(config.enable_json_logs);
    validate_startup_config_contract(&config)?;

    let bind_addr = env::var("FAIRDEX_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let store: Arc<dyn CatalogStore> = match env::var("DATABASE_URL").ok().filter(|v| !v.is_empty())
    {
        Some(database_url) => {
            let max_connections = env_u32("FAIRDEX_PG_MAX_CONNECTIONS", 10);
            let pg = PgCatalogStore::connect(&database_url, max_connections)
                .await
                .map_err(|e| format!("postgres connect failed: {e}"))?;
            if env_bool("FAIRDEX_RUN_MIGRATIONS", true) {
                pg.run_migrations()
                    .await
                    .map_err(|e| format!("migrations failed: {e}"))?;
            }
            Arc::new(pg)
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store (development only)");
            Arc::new(FakeCatalogStore::new())
        }
    };

    let redis_backend = match &config.redis_url {
        Some(url) => match RedisBackend::new(url, &config.redis_prefix, RedisPolicy::from_config(&config)) {
            Ok(backend) => Some(backend),
            Err(e) => {
                warn!(error = %e, "redis unavailable, falling back to in-memory backends");
                None
            }
        },
        None => None,
    };
    let cache = match &redis_backend {
        Some(backend) => ResponseCache::new(Arc::new(RedisCacheBackend::new(backend.clone()))),
        None => ResponseCache::new(Arc::new(MemoryCacheBackend::new())),
    };
    let activity = match &redis_backend {
        Some(backend) => ActivityTracker::redis(backend.clone(), config.activity_ttl),
        None => ActivityTracker::memory(config.activity_ttl),
    };
    let limiter = match &redis_backend {
        Some(backend) => RateLimiter::redis(backend.clone()),
        None => RateLimiter::memory(),
    };

    let upstream = HttpUpstream::new(
        &config.datacite_base_url,
        &config.sindex_base_url,
        config.request_timeout,
    )
    .map_err(|e| format!("upstream client init failed: {e}"))?;

    let state = AppState::new(
        store,
        cache,
        activity,
        limiter,
        Arc::new(upstream),
        config,
    );
    let app = build_router(state);

    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("invalid bind addr {bind_addr}: {e}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!("fairdex-server listening on {bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            let drain_ms = env_u64("FAIRDEX_SHUTDOWN_DRAIN_MS", 2000);
            tokio::time::sleep(Duration::from_millis(drain_ms)).await;
        })
        .await
        .map_err(|e| format!("server failed: {e}"))
}
