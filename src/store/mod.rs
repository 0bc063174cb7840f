/**
 * Pattern & Candidate Store
 *
 * DESIGN DECISION: A single writer behind `tokio::sync::Mutex<Connection>`,
 * many readers against an in-memory `RwLock<HashMap>` index kept in sync on
 * every write
 * WHY: Reads vastly outnumber writes (every resolve/search call reads,
 * only insert/update/delete/dedup write); this generalizes the read/write
 * wrapper already used for shared-knowledge synchronization in this
 * codebase, corrected so the write path takes an actual exclusive lock
 * instead of a shared one
 *
 * REASONING CHAIN:
 * 1. Every mutation goes through the connection mutex and is durable
 *    (SQLite write) before the call returns
 * 2. The in-memory index is updated atomically alongside the SQLite write,
 *    under the same mutex guard, so readers never observe a write half-done
 * 3. Reads take a read lock on the index only — never touch the connection
 * 4. `deduplicate()` takes the same write path as insert/update, since it
 *    mutates multiple rows at once
 *
 * PATTERN: Single-writer / many-reader store over SQLite + in-memory index
 */

pub mod dedup;
pub mod portable;
pub mod schema;
pub mod seed;

use crate::config::CoherencyConfig;
use crate::error::{Error, Result};
use crate::pattern::{GenerationMethod, Language, Pattern};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Outcome of [`Store::insert`].
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(Uuid),
    Merged { surviving_id: Uuid },
}

/// Filters accepted by [`Store::iter`]/[`Store::all`].
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub language: Option<Language>,
    pub min_coherency: Option<f64>,
    pub any_tag: Vec<String>,
    pub generation_method: Option<GenerationMethod>,
    pub author: Option<String>,
    pub updated_since: Option<DateTime<Utc>>,
}

impl Filter {
    fn matches(&self, pattern: &Pattern) -> bool {
        if let Some(lang) = self.language {
            if pattern.language() != lang {
                return false;
            }
        }
        if let Some(min) = self.min_coherency {
            if pattern.coherency_score().total() < min {
                return false;
            }
        }
        if !self.any_tag.is_empty() && !pattern.tags().iter().any(|t| self.any_tag.contains(t)) {
            return false;
        }
        if let Some(method) = self.generation_method {
            if pattern.lineage().generation_method != method {
                return false;
            }
        }
        if let Some(author) = &self.author {
            if pattern.author() != author {
                return false;
            }
        }
        if let Some(since) = self.updated_since {
            if pattern.updated_at() < since {
                return false;
            }
        }
        true
    }
}

/// Aggregate statistics returned by [`Store::stats`].
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub total: usize,
    pub avg_coherency: f64,
    pub by_language: HashMap<String, usize>,
    pub by_type: HashMap<String, usize>,
}

struct Inner {
    conn: AsyncMutex<Connection>,
    index: StdRwLock<HashMap<Uuid, Pattern>>,
    table: &'static str,
    /// `Some(floor)` gates insert/merge on `coherencyScore.total >= floor`
    /// (I1); `None` for collections (candidates) the floor doesn't apply to.
    floor_proven: Option<f64>,
}

/// Shared implementation behind [`PatternStore`] and [`CandidateStore`] —
/// the two collections have identical operations and differ only in which
/// table backs them and in the invariant that a row in one never appears
/// in the other.
struct Store {
    inner: Arc<Inner>,
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Store {
    fn open(path: &Path, table: &'static str, floor_proven: Option<f64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::init_schema(&conn)?;
        let index = Self::load_index(&conn, table)?;
        Ok(Self {
            inner: Arc::new(Inner {
                conn: AsyncMutex::new(conn),
                index: StdRwLock::new(index),
                table,
                floor_proven,
            }),
        })
    }

    fn open_in_memory(table: &'static str, floor_proven: Option<f64>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            inner: Arc::new(Inner {
                conn: AsyncMutex::new(conn),
                index: StdRwLock::new(HashMap::new()),
                table,
                floor_proven,
            }),
        })
    }

    fn load_index(conn: &Connection, table: &str) -> Result<HashMap<Uuid, Pattern>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT id, record FROM {table} WHERE removed_into IS NULL"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut index = HashMap::new();
        for row in rows {
            let (id, record) = row?;
            let id = Uuid::parse_str(&id).map_err(|e| Error::Fatal(e.to_string()))?;
            let pattern: Pattern = serde_json::from_str(&record)?;
            index.insert(id, pattern);
        }
        Ok(index)
    }

    /// Pre-insertion invariant gate: covenant-seal status applies to every
    /// collection (I7); the coherency floor only to whichever collection was
    /// opened with one (I1 — Patterns, not Candidates).
    fn check_constraints(&self, pattern: &Pattern) -> Result<()> {
        if !pattern.covenant_sealed() {
            return Err(Error::ConstraintViolated(format!(
                "pattern {} failed the covenant seal",
                pattern.name()
            )));
        }
        if let Some(floor) = self.inner.floor_proven {
            let total = pattern.coherency_score().total();
            if total < floor {
                return Err(Error::ConstraintViolated(format!(
                    "pattern {} coherency {:.3} is below floor {:.3}",
                    pattern.name(),
                    total,
                    floor
                )));
            }
        }
        Ok(())
    }

    fn write_row(conn: &Connection, table: &str, pattern: &Pattern) -> Result<()> {
        let record = serde_json::to_string(pattern)?;
        let (name_lower, language) = pattern.canonical_key();
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {table}
                 (id, name_lower, language, coherency_total, updated_at, author, removed_into, record)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)"
            ),
            params![
                pattern.id().to_string(),
                name_lower,
                language.as_str(),
                pattern.coherency_score().total(),
                pattern.updated_at().to_rfc3339(),
                pattern.author(),
                record,
            ],
        )?;
        Ok(())
    }

    fn mark_removed(conn: &Connection, table: &str, id: Uuid, into: Uuid) -> Result<()> {
        conn.execute(
            &format!("UPDATE {table} SET removed_into = ?1 WHERE id = ?2"),
            params![into.to_string(), id.to_string()],
        )?;
        Ok(())
    }

    async fn insert(&self, pattern: Pattern, strict: bool) -> Result<InsertOutcome> {
        self.check_constraints(&pattern)?;

        let existing_collision = {
            let index = self.inner.index.read().unwrap();
            let (name_lower, language) = pattern.canonical_key();
            index
                .values()
                .find(|p| p.canonical_key() == (name_lower.clone(), language))
                .map(|p| p.id())
        };

        if let Some(existing_id) = existing_collision {
            if strict {
                return Err(Error::ValidationRejected(format!(
                    "duplicate name/language: {}",
                    pattern.name()
                )));
            }
            return self.merge_into(existing_id, pattern).await;
        }

        let conn = self.inner.conn.lock().await;
        Self::write_row(&conn, self.inner.table, &pattern)?;
        drop(conn);

        let id = pattern.id();
        self.inner.index.write().unwrap().insert(id, pattern);
        Ok(InsertOutcome::Inserted(id))
    }

    async fn merge_into(&self, survivor_id: Uuid, incoming: Pattern) -> Result<InsertOutcome> {
        let merged = {
            let mut index = self.inner.index.write().unwrap();
            let survivor = index
                .get_mut(&survivor_id)
                .ok_or_else(|| Error::NotFound(survivor_id.to_string()))?;
            survivor.union_tags(incoming.tags());
            if incoming.coherency_score().total() > survivor.coherency_score().total() {
                survivor.set_coherency_score(incoming.coherency_score().clone());
            }
            for _ in 0..incoming.reliability().usage_count {
                survivor.record_use(true);
            }
            survivor.clone()
        };

        let conn = self.inner.conn.lock().await;
        Self::write_row(&conn, self.inner.table, &merged)?;
        Ok(InsertOutcome::Merged {
            surviving_id: survivor_id,
        })
    }

    fn get(&self, id: Uuid) -> Option<Pattern> {
        self.inner.index.read().unwrap().get(&id).cloned()
    }

    fn get_by_name(&self, name: &str, language: Language) -> Option<Pattern> {
        let key = name.to_ascii_lowercase();
        self.inner
            .index
            .read()
            .unwrap()
            .values()
            .find(|p| p.canonical_key() == (key.clone(), language))
            .cloned()
    }

    fn all(&self) -> Vec<Pattern> {
        self.inner.index.read().unwrap().values().cloned().collect()
    }

    fn iter(&self, filter: &Filter) -> Vec<Pattern> {
        self.inner
            .index
            .read()
            .unwrap()
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    async fn update<F>(&self, id: Uuid, f: F) -> Result<Pattern>
    where
        F: FnOnce(&mut Pattern),
    {
        let updated = {
            let mut index = self.inner.index.write().unwrap();
            let pattern = index.get_mut(&id).ok_or_else(|| Error::NotFound(id.to_string()))?;
            f(pattern);
            pattern.clone()
        };
        let conn = self.inner.conn.lock().await;
        Self::write_row(&conn, self.inner.table, &updated)?;
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.inner
            .index
            .write()
            .unwrap()
            .remove(&id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let conn = self.inner.conn.lock().await;
        conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.inner.table),
            params![id.to_string()],
        )?;
        Ok(())
    }

    async fn delete_by_author(&self, author: &str) -> Result<usize> {
        let ids: Vec<Uuid> = {
            let index = self.inner.index.read().unwrap();
            index
                .values()
                .filter(|p| p.author() == author)
                .map(|p| p.id())
                .collect()
        };
        for id in &ids {
            self.delete(*id).await?;
        }
        Ok(ids.len())
    }

    fn snapshot(&self) -> Vec<Pattern> {
        self.all()
    }

    fn stats(&self) -> StoreStats {
        let index = self.inner.index.read().unwrap();
        let total = index.len();
        let avg_coherency = if total == 0 {
            0.0
        } else {
            index.values().map(|p| p.coherency_score().total()).sum::<f64>() / total as f64
        };
        let mut by_language = HashMap::new();
        let mut by_type = HashMap::new();
        for p in index.values() {
            *by_language.entry(p.language().as_str().to_string()).or_insert(0) += 1;
            *by_type.entry(format!("{:?}", p.pattern_type())).or_insert(0) += 1;
        }
        StoreStats {
            total,
            avg_coherency,
            by_language,
            by_type,
        }
    }

    async fn deduplicate(&self) -> Result<usize> {
        let snapshot: Vec<(Uuid, Pattern)> = {
            let index = self.inner.index.read().unwrap();
            index.iter().map(|(id, p)| (*id, p.clone())).collect()
        };
        let (groups, _links) = dedup::deduplicate(&snapshot);
        let removed_count = groups.iter().map(|g| g.removed.len()).sum();

        if groups.is_empty() {
            return Ok(0);
        }

        let conn = self.inner.conn.lock().await;
        let mut index = self.inner.index.write().unwrap();
        for group in &groups {
            if let Some(survivor) = index.get_mut(&group.survivor) {
                survivor.set_tags(group.folded_tags.clone());
                let survivor_snapshot = survivor.clone();
                Store::write_row(&conn, self.inner.table, &survivor_snapshot)?;
            }
            for removed_id in &group.removed {
                index.remove(removed_id);
                Store::mark_removed(&conn, self.inner.table, *removed_id, group.survivor)?;
            }
        }

        Ok(removed_count)
    }
}

/// The proven-pattern collection.
pub struct PatternStore {
    store: Store,
}

impl PatternStore {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_floor(path, CoherencyConfig::default().floor_proven)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with_floor(CoherencyConfig::default().floor_proven)
    }

    /// Opens an on-disk Pattern store enforcing a caller-supplied coherency
    /// floor instead of the default (I1).
    pub fn open_with_floor(path: &Path, floor_proven: f64) -> Result<Self> {
        Ok(Self {
            store: Store::open(path, schema::PATTERNS_TABLE, Some(floor_proven))?,
        })
    }

    /// Opens an in-memory Pattern store enforcing a caller-supplied
    /// coherency floor instead of the default (I1).
    pub fn open_in_memory_with_floor(floor_proven: f64) -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory(schema::PATTERNS_TABLE, Some(floor_proven))?,
        })
    }

    pub async fn insert(&self, pattern: Pattern, strict_insert: bool) -> Result<InsertOutcome> {
        self.store.insert(pattern, strict_insert).await
    }

    pub fn get(&self, id: Uuid) -> Option<Pattern> {
        self.store.get(id)
    }

    pub fn get_by_name(&self, name: &str, language: Language) -> Option<Pattern> {
        self.store.get_by_name(name, language)
    }

    pub fn all(&self) -> Vec<Pattern> {
        self.store.all()
    }

    pub fn iter(&self, filter: &Filter) -> Vec<Pattern> {
        self.store.iter(filter)
    }

    pub async fn update<F>(&self, id: Uuid, f: F) -> Result<Pattern>
    where
        F: FnOnce(&mut Pattern),
    {
        self.store.update(id, f).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.store.delete(id).await
    }

    pub async fn delete_by_author(&self, author: &str) -> Result<usize> {
        self.store.delete_by_author(author).await
    }

    pub fn snapshot(&self) -> Vec<Pattern> {
        self.store.snapshot()
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub async fn deduplicate(&self) -> Result<usize> {
        self.store.deduplicate().await
    }
}

/// The unproven-candidate collection; same shape as [`PatternStore`], kept
/// as a distinct type so a Candidate can never be returned from a Pattern
/// query or vice versa.
pub struct CandidateStore {
    store: Store,
}

impl CandidateStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            store: Store::open(path, schema::CANDIDATES_TABLE, None)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            store: Store::open_in_memory(schema::CANDIDATES_TABLE, None)?,
        })
    }

    pub async fn insert(&self, pattern: Pattern) -> Result<InsertOutcome> {
        self.store.insert(pattern, false).await
    }

    pub fn get(&self, id: Uuid) -> Option<Pattern> {
        self.store.get(id)
    }

    pub fn all(&self) -> Vec<Pattern> {
        self.store.all()
    }

    pub fn iter(&self, filter: &Filter) -> Vec<Pattern> {
        self.store.iter(filter)
    }

    pub async fn update<F>(&self, id: Uuid, f: F) -> Result<Pattern>
    where
        F: FnOnce(&mut Pattern),
    {
        self.store.update(id, f).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.store.delete(id).await
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub async fn deduplicate(&self) -> Result<usize> {
        self.store.deduplicate().await
    }
}

/// Promotes a Candidate into the Pattern collection atomically from the
/// caller's point of view: removed from candidates only after the insert
/// into patterns succeeds.
pub async fn promote_candidate(
    candidates: &CandidateStore,
    patterns: &PatternStore,
    id: Uuid,
) -> Result<Pattern> {
    let candidate = candidates
        .get(id)
        .ok_or_else(|| Error::NotFound(id.to_string()))?;
    patterns.insert(candidate.clone(), false).await?;
    candidates.delete(id).await?;
    Ok(candidate)
}
