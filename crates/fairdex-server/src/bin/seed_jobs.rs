#![forbid(unsafe_code)]

//! Enqueues scoring jobs for every dataset that has no accepted score yet.
//! Idempotent: re-running after a partial failure inserts only what is
//! missing.

use fairdex_server::services::seed::seed_jobs;
use fairdex_server::store::PgCatalogStore;
use std::env;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_i64(name: &str, default: i64) -> i64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;
    let page_size = env_i64("FAIRDEX_SEED_PAGE_SIZE", 10_000);
    let insert_batch = env_i64("FAIRDEX_SEED_INSERT_BATCH", 1_000);

    let store = PgCatalogStore::connect(&database_url, 5)
        .await
        .map_err(|e| format!("postgres connect failed: {e}"))?;

    let report = seed_jobs(&store, page_size, insert_batch)
        .await
        .map_err(|e| format!("seeding failed: {e}"))?;
    info!(
        scanned = report.scanned,
        inserted = report.inserted,
        pages = report.pages,
        "job seeding complete"
    );
    Ok(())
}
