/**
 * Search Ranker
 *
 * DESIGN DECISION: One linear score combining textual match, intent
 * boost, and coherency, penalized for staleness and over-evolution
 * WHY: Context-boosted ranking (recency, domain fit) already proved out
 * well for this codebase's indexed search; this keeps that shape and
 * swaps the embedding-based relevance signal for MinHash/textual overlap
 *
 * REASONING CHAIN:
 * 1. `matchScore = 0.6*textual + 0.2*intentBoost + 0.2*coherency.total`
 * 2. Staleness penalty ramps linearly from 0 at 30 days unused to 0.15 at
 *    180 days unused
 * 3. Over-evolution penalty charges 0.05 per child fork past the third,
 *    capped at 0.20 — heavily-forked patterns are probably stale originals
 * 4. Ties break on successCount, then updatedAt, both descending
 *
 * PATTERN: Linear weighted ranking with decay penalties
 */

use crate::pattern::Pattern;
use crate::search::intent::Intent;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RankedResult {
    pub pattern_id: Uuid,
    pub match_score: f64,
}

fn token_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

fn textual_match(term: &str, pattern: &Pattern) -> f64 {
    let query_tokens = token_set(term);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let haystack = format!(
        "{} {} {}",
        pattern.name(),
        pattern.description(),
        pattern.tags().join(" ")
    );
    let haystack_tokens = token_set(&haystack);
    let overlap = query_tokens.intersection(&haystack_tokens).count() as f64;
    (overlap / query_tokens.len() as f64).min(1.0)
}

fn intent_boost(intent: &Intent, pattern: &Pattern) -> f64 {
    if intent.intents.is_empty() {
        return 0.0;
    }
    let best = intent
        .intents
        .iter()
        .map(|i| {
            let name_hit = pattern.tags().iter().any(|t| t.eq_ignore_ascii_case(&i.name));
            if name_hit {
                i.confidence
            } else {
                0.0
            }
        })
        .fold(0.0_f64, f64::max);

    let language_match = intent
        .language
        .map(|lang| if lang == pattern.language() { 1.0 } else { 0.0 })
        .unwrap_or(0.0);

    (best * 0.7 + language_match * 0.3).min(1.0)
}

fn staleness_penalty(pattern: &Pattern, now: DateTime<Utc>) -> f64 {
    let last_used = pattern.last_used_at().unwrap_or(pattern.created_at());
    let days_unused = (now - last_used).num_days().max(0) as f64;
    if days_unused <= 30.0 {
        0.0
    } else if days_unused >= 180.0 {
        0.15
    } else {
        0.15 * (days_unused - 30.0) / 150.0
    }
}

fn fork_counts(patterns: &[Pattern]) -> HashMap<Uuid, u32> {
    let mut counts = HashMap::new();
    for p in patterns {
        if let Some(parent) = p.lineage().parent_pattern {
            *counts.entry(parent).or_insert(0) += 1;
        }
    }
    counts
}

fn over_evolution_penalty(children: u32) -> f64 {
    if children <= 3 {
        0.0
    } else {
        (0.05 * (children - 3) as f64).min(0.20)
    }
}

/// Ranks `patterns` against `term`/`intent`, descending by `matchScore`,
/// ties broken by successCount then updatedAt (both descending).
pub fn rank(patterns: &[Pattern], term: &str, intent: &Intent, now: DateTime<Utc>) -> Vec<RankedResult> {
    let forks = fork_counts(patterns);

    let mut results: Vec<(RankedResult, u64, DateTime<Utc>)> = patterns
        .iter()
        .map(|p| {
            let textual = textual_match(term, p);
            let boost = intent_boost(intent, p);
            let coherency = p.coherency_score().total();
            let raw = 0.6 * textual + 0.2 * boost + 0.2 * coherency;
            let penalty = staleness_penalty(p, now) + over_evolution_penalty(*forks.get(&p.id()).unwrap_or(&0));
            let score = (raw - penalty).max(0.0);
            (
                RankedResult {
                    pattern_id: p.id(),
                    match_score: score,
                },
                p.reliability().success_count,
                p.updated_at(),
            )
        })
        .collect();

    results.sort_by(|a, b| {
        b.0.match_score
            .partial_cmp(&a.0.match_score)
            .unwrap()
            .then(b.1.cmp(&a.1))
            .then(b.2.cmp(&a.2))
    });

    results.into_iter().map(|(r, _, _)| r).collect()
}
