//! Fixed-window rate limiting with pluggable counter stores.
//!
//! `MemoryStore` keeps counters in the process and suits a single instance.
//! `PgStore` keeps them in the `rate_limits` table so every instance behind
//! a load balancer shares the same windows.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::sql_types::{Double, Int4, Text, Timestamptz};
use diesel_async::RunQueryDsl;

use crate::migration::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Postgres,
}

impl FromStr for RateLimitBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(RateLimitBackend::Memory),
            "postgres" | "pg" => Ok(RateLimitBackend::Postgres),
            other => Err(format!("unknown rate limit backend: {other}")),
        }
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: u64,
}

impl Decision {
    /// Decide from the post-increment count and the time left in the window.
    pub fn from_count(count: u32, max: u32, time_left: Duration) -> Self {
        let allowed = count <= max;
        Self {
            allowed,
            remaining: max.saturating_sub(count),
            retry_after_secs: if allowed {
                0
            } else {
                time_left.as_secs().max(1)
            },
        }
    }
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count a request against `key` and decide whether it may proceed.
    async fn check(&self, key: &str, max: u32, window: Duration) -> anyhow::Result<Decision>;

    /// Drop expired windows. Stores that expire lazily may do nothing.
    async fn sweep(&self) -> anyhow::Result<usize> {
        Ok(0)
    }
}

pub type SharedRateLimiter = Arc<dyn RateLimitStore>;

pub fn build_store(backend: RateLimitBackend, pool: DbPool) -> SharedRateLimiter {
    match backend {
        RateLimitBackend::Memory => Arc::new(MemoryStore::default()),
        RateLimitBackend::Postgres => Arc::new(PgStore::new(pool)),
    }
}

// ── In-process store ──

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    windows: Mutex<HashMap<String, Window>>,
}

impl MemoryStore {
    fn check_at(&self, key: &str, max: u32, window: Duration, now: Instant) -> Decision {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = windows.entry(key.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + window,
        });
        if entry.reset_at <= now {
            *entry = Window {
                count: 0,
                reset_at: now + window,
            };
        }
        entry.count = entry.count.saturating_add(1);

        Decision::from_count(entry.count, max, entry.reset_at.saturating_duration_since(now))
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = windows.len();
        windows.retain(|_, w| w.reset_at > now);
        before - windows.len()
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn check(&self, key: &str, max: u32, window: Duration) -> anyhow::Result<Decision> {
        Ok(self.check_at(key, max, window, Instant::now()))
    }

    async fn sweep(&self) -> anyhow::Result<usize> {
        Ok(self.sweep_at(Instant::now()))
    }
}

// ── Shared PostgreSQL store ──

const UPSERT_SQL: &str = "\
    INSERT INTO rate_limits (key, count, reset_at) \
    VALUES ($1, 1, NOW() + make_interval(secs => $2)) \
    ON CONFLICT (key) DO UPDATE SET \
        count = CASE WHEN rate_limits.reset_at <= NOW() THEN 1 ELSE rate_limits.count + 1 END, \
        reset_at = CASE WHEN rate_limits.reset_at <= NOW() THEN EXCLUDED.reset_at ELSE rate_limits.reset_at END \
    RETURNING count, reset_at";

#[derive(Debug, diesel::QueryableByName)]
struct WindowRow {
    #[diesel(sql_type = Int4)]
    count: i32,
    #[diesel(sql_type = Timestamptz)]
    reset_at: DateTime<Utc>,
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitStore for PgStore {
    async fn check(&self, key: &str, max: u32, window: Duration) -> anyhow::Result<Decision> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;

        let row: WindowRow = diesel::sql_query(UPSERT_SQL)
            .bind::<Text, _>(key)
            .bind::<Double, _>(window.as_secs_f64())
            .get_result(&mut conn)
            .await?;

        let time_left = (row.reset_at - Utc::now()).to_std().unwrap_or_default();
        Ok(Decision::from_count(row.count.max(0) as u32, max, time_left))
    }

    async fn sweep(&self) -> anyhow::Result<usize> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
        let deleted = diesel::sql_query("DELETE FROM rate_limits WHERE reset_at <= NOW()")
            .execute(&mut conn)
            .await?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn allows_up_to_max_then_blocks() {
        let store = MemoryStore::default();
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let d = store.check_at("login:1.2.3.4", 3, WINDOW, now);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }

        let blocked = store.check_at("login:1.2.3.4", 3, WINDOW, now + Duration::from_secs(10));
        assert_eq!(
            blocked,
            Decision {
                allowed: false,
                remaining: 0,
                retry_after_secs: 50,
            }
        );
    }

    #[test]
    fn window_resets_after_expiry() {
        let store = MemoryStore::default();
        let now = Instant::now();
        for _ in 0..4 {
            store.check_at("k", 3, WINDOW, now);
        }
        let later = store.check_at("k", 3, WINDOW, now + WINDOW);
        assert!(later.allowed);
        assert_eq!(later.remaining, 2);
    }

    #[test]
    fn keys_are_independent() {
        let store = MemoryStore::default();
        let now = Instant::now();
        store.check_at("a", 1, WINDOW, now);
        assert!(!store.check_at("a", 1, WINDOW, now).allowed);
        assert!(store.check_at("b", 1, WINDOW, now).allowed);
    }

    #[test]
    fn sweep_drops_expired_windows() {
        let store = MemoryStore::default();
        let now = Instant::now();
        store.check_at("short", 5, Duration::from_secs(1), now);
        store.check_at("long", 5, WINDOW, now);
        assert_eq!(store.sweep_at(now + Duration::from_secs(2)), 1);
        assert_eq!(store.sweep_at(now + Duration::from_secs(2)), 0);
    }

    #[test]
    fn blocked_requests_wait_at_least_a_second() {
        let d = Decision::from_count(2, 1, Duration::from_millis(200));
        assert!(!d.allowed);
        assert_eq!(d.retry_after_secs, 1);
    }

    #[test]
    fn backend_names() {
        assert_eq!("memory".parse(), Ok(RateLimitBackend::Memory));
        assert_eq!("Postgres".parse(), Ok(RateLimitBackend::Postgres));
        assert!("redis".parse::<RateLimitBackend>().is_err());
    }

    #[tokio::test]
    async fn trait_object_dispatch() {
        let store: SharedRateLimiter = Arc::new(MemoryStore::default());
        let d = store.check("x", 1, WINDOW).await.unwrap();
        assert!(d.allowed);
        assert!(!store.check("x", 1, WINDOW).await.unwrap().allowed);
    }
}
