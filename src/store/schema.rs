/**
 * Store Schema
 *
 * DESIGN DECISION: One JSON blob column per row plus a handful of indexed
 * scalar columns pulled out for filtering, rather than a fully normalized
 * relational schema
 * WHY: The full record serializes and deserializes as one unit everywhere
 * it is used (search results, import/export, federation sync); the indexed
 * columns exist purely so SQLite can filter/sort without deserializing
 * every row, the same split this schema generalizes from a vector-plus-
 * metadata-blob table to the full Pattern/Candidate record.
 *
 * PATTERN: JSON-blob-plus-indexed-columns (SQLite local store)
 */

use crate::error::Result;
use rusqlite::Connection;

pub const PATTERNS_TABLE: &str = "patterns";
pub const CANDIDATES_TABLE: &str = "candidates";

/// Creates every table and index this store needs, idempotently.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))?;

    for table in [PATTERNS_TABLE, CANDIDATES_TABLE] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    name_lower TEXT NOT NULL,
                    language TEXT NOT NULL,
                    coherency_total REAL NOT NULL,
                    updated_at TEXT NOT NULL,
                    author TEXT NOT NULL,
                    removed_into TEXT,
                    record TEXT NOT NULL
                )"
            ),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {table}_canonical_key
                 ON {table} (name_lower, language) WHERE removed_into IS NULL"
            ),
            [],
        )?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS {table}_language ON {table} (language)"),
            [],
        )?;
        conn.execute(
            &format!("CREATE INDEX IF NOT EXISTS {table}_updated_at ON {table} (updated_at)"),
            [],
        )?;
        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS {table}_coherency ON {table} (coherency_total)"
            ),
            [],
        )?;
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS votes (
            pattern_id TEXT NOT NULL,
            voter_id TEXT NOT NULL,
            direction INTEGER NOT NULL,
            weight REAL NOT NULL,
            timestamp TEXT NOT NULL,
            PRIMARY KEY (pattern_id, voter_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS voters (
            id TEXT PRIMARY KEY,
            reputation REAL NOT NULL,
            votes_cast INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lifecycle_counters (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS idempotency_log (
            event_id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            processed_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}
