/**
 * Lifecycle Counters
 *
 * DESIGN DECISION: A single key/value table, one row per named counter or
 * snapshot, instead of a typed column per metric
 * WHY: The set of counters (trigger counts, the regression-detection
 * success-ratio snapshot) grows independently of the schema; a key/value
 * table needs no migration to add one, the same single-table event-log
 * idiom this module is grounded on, flattened from an event stream to
 * current-value rows since only the latest counter value matters here.
 *
 * PATTERN: Key/value counter table over SQLite
 */

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;
use uuid::Uuid;

const SUCCESS_RATIO_SNAPSHOT_KEY: &str = "success_ratio_snapshot";

pub struct Counters {
    conn: Mutex<Connection>,
}

impl Counters {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        crate::store::schema::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        crate::store::schema::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        Ok(conn
            .query_row("SELECT value FROM lifecycle_counters WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?)
    }

    async fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO lifecycle_counters (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub async fn get_count(&self, key: &str) -> Result<u64> {
        Ok(self.get_raw(key).await?.and_then(|v| v.parse().ok()).unwrap_or(0))
    }

    /// Increments `key` by one and reports whether the new value is a
    /// nonzero multiple of `step` — the lifecycle trigger check.
    pub async fn bump(&self, key: &str, step: u64) -> Result<(u64, bool)> {
        let next = self.get_count(key).await? + 1;
        self.set_raw(key, &next.to_string()).await?;
        Ok((next, step > 0 && next % step == 0))
    }

    /// Persists the per-pattern success ratio seen at the end of an Evolve
    /// phase, so the next cycle can compute the regression delta against it.
    pub async fn snapshot_success_ratios(&self, ratios: &HashMap<Uuid, f64>) -> Result<()> {
        let json = serde_json::to_string(ratios)?;
        self.set_raw(SUCCESS_RATIO_SNAPSHOT_KEY, &json).await
    }

    pub async fn load_success_ratios(&self) -> Result<HashMap<Uuid, f64>> {
        match self.get_raw(SUCCESS_RATIO_SNAPSHOT_KEY).await? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(HashMap::new()),
        }
    }
}
