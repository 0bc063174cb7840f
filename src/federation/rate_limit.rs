/**
 * Rate Limiting & Idempotency
 *
 * DESIGN DECISION: An in-process sliding-window counter per (key, category)
 * plus a SQLite-backed idempotency log capped at a fixed size
 * WHY: Federation endpoints take traffic from the outside world; reads,
 * submissions, and deletions have very different abuse profiles and need
 * separate budgets. Idempotency is a separate concern from rate limiting —
 * a resubmitted webhook-style event should be silently absorbed rather than
 * processed twice, even from a caller well within their rate budget.
 *
 * REASONING CHAIN:
 * 1. Each category (reads/submissions/deletions) gets its own window and
 *    ceiling from `RateLimitConfig`
 * 2. A request records its timestamp, then the window is trimmed from the
 *    front before counting — O(window size) per check, acceptable at these
 *    request volumes
 * 3. Idempotency keys persist in `idempotency_log`; once the table exceeds
 *    the cap, the oldest rows are dropped to keep it bounded
 *
 * PATTERN: Sliding-window rate limiter + bounded idempotency log
 */

use crate::config::RateLimitConfig;
use crate::error::{Error, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;

const IDEMPOTENCY_CAP: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Read,
    Submission,
    Deletion,
}

pub struct RateLimiter {
    window: Duration,
    ceilings: HashMap<Category, u32>,
    buckets: StdMutex<HashMap<(String, Category), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let mut ceilings = HashMap::new();
        ceilings.insert(Category::Read, config.max_requests_reads);
        ceilings.insert(Category::Submission, config.max_requests_submissions);
        ceilings.insert(Category::Deletion, config.max_requests_deletions);
        Self {
            window: Duration::from_secs(config.window_secs),
            ceilings,
            buckets: StdMutex::new(HashMap::new()),
        }
    }

    /// Records one request from `key` under `category`; errs with
    /// [`Error::RateLimited`] if the ceiling for this window is exceeded.
    pub fn check(&self, key: &str, category: Category) -> Result<()> {
        let ceiling = *self.ceilings.get(&category).unwrap_or(&u32::MAX);
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry((key.to_string(), category)).or_default();
        bucket.retain(|t| now.duration_since(*t) < self.window);

        if bucket.len() as u32 >= ceiling {
            return Err(Error::RateLimited {
                retry_after_secs: self.window.as_secs(),
            });
        }
        bucket.push(now);
        Ok(())
    }
}

/// Bounded log of already-processed event ids, backed by the
/// `idempotency_log` table the store schema already creates.
pub struct IdempotencyGuard {
    conn: AsyncMutex<Connection>,
}

impl IdempotencyGuard {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        crate::store::schema::init_schema(&conn)?;
        Ok(Self { conn: AsyncMutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        crate::store::schema::init_schema(&conn)?;
        Ok(Self { conn: AsyncMutex::new(conn) })
    }

    /// Returns `true` the first time `event_id` is seen, `false` on every
    /// replay. Recording and the drop-oldest trim happen under the same
    /// connection lock.
    pub async fn check_and_record(&self, event_id: &str, event_type: &str) -> Result<bool> {
        let conn = self.conn.lock().await;

        let seen: Option<String> = conn
            .query_row(
                "SELECT event_id FROM idempotency_log WHERE event_id = ?1",
                params![event_id],
                |row| row.get(0),
            )
            .optional()?;
        if seen.is_some() {
            return Ok(false);
        }

        conn.execute(
            "INSERT INTO idempotency_log (event_id, event_type, processed_at) VALUES (?1, ?2, ?3)",
            params![event_id, event_type, Utc::now().to_rfc3339()],
        )?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM idempotency_log", [], |row| row.get(0))?;
        if count > IDEMPOTENCY_CAP {
            conn.execute(
                "DELETE FROM idempotency_log WHERE event_id IN (
                    SELECT event_id FROM idempotency_log ORDER BY processed_at ASC LIMIT ?1
                )",
                params![count - IDEMPOTENCY_CAP],
            )?;
        }

        Ok(true)
    }
}
