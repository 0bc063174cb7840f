/**
 * Portable Library Format
 *
 * DESIGN DECISION: Export is a filtered snapshot of `Pattern`'s own
 * serde shape wrapped in a versioned envelope; import replays each pattern
 * through the same `insert` path a live submission takes
 * WHY: `Pattern` already has a stable, versioned-by-convention JSON shape
 * (it's what every store row persists); reusing it for the on-disk
 * exchange format means there is exactly one serialization of a Pattern to
 * keep in sync, not two. Importing through `insert` rather than a raw row
 * write means dedup and the canonical-key merge rule apply to imported
 * data exactly as they do to anything else entering the store.
 *
 * REASONING CHAIN:
 * 1. `export` filters the live collection the same way `iter` does, then
 *    takes an optional cap
 * 2. `import` inserts each pattern non-strictly, so a name/language
 *    collision with existing data folds rather than errors
 * 3. Re-exporting immediately after import reproduces the same patterns
 *    modulo timestamps, as long as nothing merged during the import
 *
 * PATTERN: Versioned JSON envelope + replay-through-insert import
 */

use crate::error::Result;
use crate::pattern::Pattern;
use crate::store::{Filter, InsertOutcome, PatternStore};
use serde::{Deserialize, Serialize};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortableLibrary {
    pub version: u32,
    pub patterns: Vec<Pattern>,
}

/// Report of an [`import`] pass.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub inserted: usize,
    pub merged: usize,
}

/// Snapshots `store`'s proven collection into a portable envelope, applying
/// `filter` and then `limit` (0 means unlimited) the same way a search
/// would.
pub fn export(store: &PatternStore, filter: &Filter, limit: usize) -> PortableLibrary {
    let mut patterns = store.iter(filter);
    patterns.sort_by(|a, b| a.id().cmp(&b.id()));
    if limit > 0 {
        patterns.truncate(limit);
    }
    PortableLibrary {
        version: FORMAT_VERSION,
        patterns,
    }
}

/// Replays every pattern in `library` through `store.insert`, folding
/// canonical-key collisions per the store's own merge rule rather than
/// rejecting them.
pub async fn import(store: &PatternStore, library: PortableLibrary) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for pattern in library.patterns {
        match store.insert(pattern, false).await? {
            InsertOutcome::Inserted(_) => report.inserted += 1,
            InsertOutcome::Merged { .. } => report.merged += 1,
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coherency::{CoherencyBreakdown, CoherencyScore, CoherencyWeights};
    use crate::pattern::{Language, PatternType};

    fn passing_coherency() -> CoherencyScore {
        CoherencyScore::calculate(
            CoherencyBreakdown {
                correctness: 0.85,
                simplicity: 0.8,
                relevance: 0.8,
                clarity: 0.8,
                nesting: 0.85,
                security: 0.85,
            },
            &CoherencyWeights::default(),
        )
        .unwrap()
    }

    fn sample(name: &str) -> Pattern {
        Pattern::builder()
            .name(name)
            .code(format!("function {name}() {{ return 1; }}"))
            .language(Language::Javascript)
            .description("a sample pattern")
            .pattern_type(PatternType::Utility)
            .coherency_score(passing_coherency())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_export_then_import_round_trips_without_merge() {
        let source = PatternStore::open_in_memory().unwrap();
        source.insert(sample("alpha"), false).await.unwrap();
        source.insert(sample("beta"), false).await.unwrap();

        let library = export(&source, &Filter::default(), 0);
        assert_eq!(library.version, FORMAT_VERSION);
        assert_eq!(library.patterns.len(), 2);

        let destination = PatternStore::open_in_memory().unwrap();
        let report = import(&destination, library).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.merged, 0);
        assert_eq!(destination.all().len(), 2);
    }

    #[tokio::test]
    async fn test_import_is_idempotent_on_replay() {
        let store = PatternStore::open_in_memory().unwrap();
        store.insert(sample("gamma"), false).await.unwrap();
        let library = export(&store, &Filter::default(), 0);

        let report = import(&store, library).await.unwrap();
        assert_eq!(report.merged, 1);
        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn test_export_respects_limit_and_filter() {
        let store = PatternStore::open_in_memory().unwrap();
        store.insert(sample("one"), false).await.unwrap();
        store.insert(sample("two"), false).await.unwrap();
        store.insert(sample("three"), false).await.unwrap();

        let limited = export(&store, &Filter::default(), 2);
        assert_eq!(limited.patterns.len(), 2);
    }

    #[tokio::test]
    async fn test_import_rejects_sub_floor_pattern() {
        let weak = Pattern::builder()
            .name("weak")
            .code("function weak() { return 1; }")
            .language(Language::Javascript)
            .pattern_type(PatternType::Utility)
            .build()
            .unwrap(); // default coherency_score total is 0.0
        let library = PortableLibrary {
            version: FORMAT_VERSION,
            patterns: vec![weak],
        };

        let store = PatternStore::open_in_memory().unwrap();
        let err = import(&store, library).await.unwrap_err();
        assert!(matches!(err, crate::error::Error::ConstraintViolated(_)));
        assert_eq!(store.all().len(), 0);
    }
}
