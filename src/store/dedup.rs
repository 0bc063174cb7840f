/**
 * Dedup Protocol
 *
 * DESIGN DECISION: Group by canonical key first, then fold in
 * near-duplicates found by token-Jaccard similarity
 * WHY: Exact (name, language) collisions are cheap and common (two
 * submissions of "debounce"); near-duplicates (same logic, renamed) need a
 * content-level check. Token-Jaccard on a normalized token multiset gets
 * most of the value without the indexing machinery a full MinHash banding
 * pass buys at scale — the search engine's MinHash index narrows candidate
 * pairs before this check runs at scale; for deduplicate() passes it runs
 * directly.
 *
 * REASONING CHAIN:
 * 1. Canonical-key groups always point to one survivor
 * 2. Within a language, near-duplicate pairs (Jaccard >= 0.9) join the
 *    same group
 * 3. Cross-language near-duplicates are linked (recorded), never merged
 * 4. The highest coherencyScore.total in a group survives; ties keep the
 *    earliest createdAt
 * 5. Folding unions tags and sums reliability/vote counts into the
 *    survivor
 *
 * PATTERN: Canonical-key grouping + similarity folding
 */

use crate::pattern::{Language, Pattern};
use rayon::prelude::*;
use std::collections::HashSet;
use uuid::Uuid;

const NEAR_DUPLICATE_THRESHOLD: f64 = 0.9;

/// Outcome of folding one group of duplicates into a survivor.
pub struct DedupGroup {
    pub survivor: Uuid,
    pub removed: Vec<Uuid>,
    pub folded_tags: Vec<String>,
    pub folded_usage_count: u64,
    pub folded_success_count: u64,
}

/// Cross-language near-duplicate link (recorded, not merged).
pub struct CrossLanguageLink {
    pub a: Uuid,
    pub b: Uuid,
    pub similarity: f64,
}

fn token_multiset(code: &str) -> HashSet<String> {
    code.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Computes dedup groups and cross-language links over `patterns`.
/// `patterns` must all belong to the same collection (Pattern or
/// Candidate) — the Store calls this once per collection.
pub fn deduplicate(patterns: &[(Uuid, Pattern)]) -> (Vec<DedupGroup>, Vec<CrossLanguageLink>) {
    // Tokenizing is the expensive, embarrassingly parallel part of a dedup
    // pass; the O(n^2) Jaccard comparison below stays sequential since it's
    // already bounded by NEAR_DUPLICATE_THRESHOLD short-circuiting per pair.
    let tokens: Vec<HashSet<String>> = patterns.par_iter().map(|(_, p)| token_multiset(p.code())).collect();

    let mut same_language_groups: Vec<Vec<usize>> = Vec::new();
    let mut assigned = vec![false; patterns.len()];
    let mut links = Vec::new();

    for i in 0..patterns.len() {
        if assigned[i] {
            continue;
        }
        let mut group = vec![i];
        assigned[i] = true;
        for j in (i + 1)..patterns.len() {
            if assigned[j] {
                continue;
            }
            let (_, pi) = &patterns[i];
            let (_, pj) = &patterns[j];
            let sim = jaccard(&tokens[i], &tokens[j]);
            if sim >= NEAR_DUPLICATE_THRESHOLD {
                if pi.language() == pj.language() {
                    group.push(j);
                    assigned[j] = true;
                } else {
                    links.push(CrossLanguageLink {
                        a: patterns[i].0,
                        b: patterns[j].0,
                        similarity: sim,
                    });
                }
            }
        }
        same_language_groups.push(group);
    }

    let mut groups = Vec::new();
    for indices in same_language_groups {
        if indices.len() < 2 {
            continue;
        }
        let survivor_idx = *indices
            .iter()
            .max_by(|&&a, &&b| {
                let pa = &patterns[a].1;
                let pb = &patterns[b].1;
                pa.coherency_score()
                    .total()
                    .partial_cmp(&pb.coherency_score().total())
                    .unwrap()
                    .then(pb.created_at().cmp(&pa.created_at()))
            })
            .unwrap();

        let survivor = patterns[survivor_idx].0;
        let removed: Vec<Uuid> = indices
            .iter()
            .filter(|&&i| i != survivor_idx)
            .map(|&i| patterns[i].0)
            .collect();

        let mut folded_tags = Vec::new();
        let mut folded_usage_count = 0u64;
        let mut folded_success_count = 0u64;
        for &i in &indices {
            let p = &patterns[i].1;
            folded_usage_count += p.reliability().usage_count;
            folded_success_count += p.reliability().success_count;
            for tag in p.tags() {
                if !folded_tags.contains(tag) {
                    folded_tags.push(tag.clone());
                }
            }
        }

        groups.push(DedupGroup {
            survivor,
            removed,
            folded_tags,
            folded_usage_count,
            folded_success_count,
        });
    }

    (groups, links)
}

/// Canonical-key collision check used by insert() before relying on the
/// database's UNIQUE index to reject the write.
pub fn canonical_collision(name: &str, language: Language, existing: &[(Uuid, Pattern)]) -> Option<Uuid> {
    let key = name.to_ascii_lowercase();
    existing
        .iter()
        .find(|(_, p)| p.canonical_key() == (key.clone(), language))
        .map(|(id, _)| *id)
}
