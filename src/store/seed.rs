/**
 * Startup Seeding
 *
 * DESIGN DECISION: Seeding reads the same portable library format
 * import/export already use, walked recursively off disk, rather than a
 * bespoke bootstrap format
 * WHY: A fresh library shouldn't start empty if the operator has a folder
 * of proven patterns to bootstrap from, and reusing the portable format
 * means the same file that seeds a new install is also what `export`
 * produces — one format, two entry points.
 *
 * REASONING CHAIN:
 * 1. `seed_from_dir` walks every `*.json` file under `dir`
 * 2. Each file is parsed as a `PortableLibrary` and replayed through
 *    `portable::import`, so dedup applies exactly as it would to any
 *    other import
 * 3. A directory that doesn't exist is not an error — seeding is best
 *    effort, not a hard startup dependency
 *
 * PATTERN: Directory walk + replay through the existing import path
 */

use crate::error::Result;
use crate::store::portable::{self, ImportReport, PortableLibrary};
use crate::store::PatternStore;
use std::path::Path;
use walkdir::WalkDir;

/// Seeds `store` from every `*.json` portable library under `dir`. Returns
/// an empty, zeroed report (rather than an error) when `dir` doesn't exist.
pub async fn seed_from_dir(store: &PatternStore, dir: &Path) -> Result<ImportReport> {
    let mut total = ImportReport::default();
    if !dir.exists() {
        tracing::debug!(dir = %dir.display(), "seed directory absent, skipping");
        return Ok(total);
    }

    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|e| e.to_str()) == Some("json"))
    {
        let contents = std::fs::read_to_string(entry.path())?;
        let library: PortableLibrary = serde_json::from_str(&contents)?;
        let count = library.patterns.len();
        let report = portable::import(store, library).await?;
        tracing::info!(
            file = %entry.path().display(),
            patterns = count,
            inserted = report.inserted,
            merged = report.merged,
            "seeded patterns from file"
        );
        total.inserted += report.inserted;
        total.merged += report.merged;
    }

    Ok(total)
}
