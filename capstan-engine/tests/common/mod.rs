//! Shared helpers for the database-backed integration tests
//!
//! These tests assume exclusive use of the scratch database named by
//! DATABASE_URL and are skipped when it is not set.

use sqlx::PgPool;
use std::sync::atomic::{AtomicU32, Ordering};

pub async fn test_pool() -> Option<PgPool> {
    // Skip if DATABASE_URL not set (CI condition)
    let database_url = std::env::var("DATABASE_URL").unwrap_or_default();
    if database_url.is_empty() {
        eprintln!("DATABASE_URL not set; skipping integration test");
        return None;
    }

    let pool = capstan_engine::db::create_pool(&database_url)
        .await
        .expect("Failed to connect to test database");

    capstan_engine::db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}

/// A name no other test run will have used, so per-scope sequences start
/// from scratch
pub fn unique_name(prefix: &str) -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .subsec_nanos();
    format!(
        "{}-{}-{}-{}",
        prefix,
        std::process::id(),
        nanos,
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}
