/**
 * Search Engine
 *
 * DESIGN DECISION: Three composable layers — lexical token overlap,
 * MinHash-estimated semantic similarity, and intent-aware ranking — with
 * `search()` exposing the first two directly and `smartSearch()` layering
 * the third on top
 * WHY: A plain keyword search is fast and predictable but misses
 * intent ("rate limit a function" should surface "debounce"); the
 * MinHash layer gets a cheap semantic proxy without an embedding model,
 * and intent-aware ranking is reserved for the smart entry point so the
 * plain `search()` stays cheap and simple to reason about
 *
 * PATTERN: Layered lexical/semantic/hybrid search with intent-boosted
 * ranking on top (keeps the hot-cache/context-boost shape this module is
 * generalized from, minus the ONNX embedding backend)
 */

pub mod intent;
pub mod minhash;
pub mod ranker;

use crate::pattern::{Language, Pattern};
use crate::store::{Filter, PatternStore, StoreStats};
use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Lexical,
    Semantic,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub mode: SearchMode,
    pub language: Option<Language>,
    pub limit: usize,
    pub min_coherency: Option<f64>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            language: None,
            limit: 20,
            min_coherency: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub pattern_id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct SmartSearchResult {
    pub corrections: Vec<String>,
    pub intent: intent::Intent,
    pub results: Vec<ranker::RankedResult>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FederatedSearchStats {
    pub local: StoreStats,
    pub remotes: Vec<StoreStats>,
    pub combined_total: usize,
}

fn lexical_score(term: &str, pattern: &Pattern) -> f64 {
    let query_tokens: Vec<&str> = term.split_whitespace().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let haystack = format!(
        "{} {} {}",
        pattern.name().to_ascii_lowercase(),
        pattern.description().to_ascii_lowercase(),
        pattern.tags().join(" ").to_ascii_lowercase()
    );
    let hits = query_tokens
        .iter()
        .filter(|t| haystack.contains(&t.to_ascii_lowercase()))
        .count() as f64;
    (hits / query_tokens.len() as f64).min(1.0)
}

fn semantic_score(term: &str, pattern: &Pattern) -> f64 {
    let query_sig = minhash::signature(term);
    let pattern_sig = minhash::signature(pattern.code());
    let score = minhash::estimate_similarity(&query_sig, &pattern_sig);
    if score > 0.0 {
        tracing::trace!(
            pattern = %pattern.name(),
            fingerprint = %minhash::fingerprint_hex(&pattern_sig),
            score,
            "semantic match"
        );
    }
    score
}

/// Suggests spelling corrections by finding the closest known tag when the
/// query has no token overlap with it (a lightweight edit-distance check,
/// not a full spellchecker).
fn suggest_corrections(term: &str, patterns: &[Pattern]) -> Vec<String> {
    let mut tag_frequency: HashMap<String, usize> = HashMap::new();
    for p in patterns {
        for tag in p.tags() {
            *tag_frequency.entry(tag.clone()).or_insert(0) += 1;
        }
    }
    let query_tokens: Vec<String> = term.split_whitespace().map(|t| t.to_ascii_lowercase()).collect();
    let mut corrections = Vec::new();
    for token in &query_tokens {
        for tag in tag_frequency.keys() {
            if tag != token && levenshtein(token, tag) == 1 {
                corrections.push(tag.clone());
            }
        }
    }
    corrections.sort();
    corrections.dedup();
    corrections
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        dp[0][j] = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1).min(dp[i][j - 1] + 1).min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[a.len()][b.len()]
}

pub struct SearchEngine<'a> {
    patterns: &'a PatternStore,
}

impl<'a> SearchEngine<'a> {
    pub fn new(patterns: &'a PatternStore) -> Self {
        Self { patterns }
    }

    /// Lexical/semantic/hybrid search over the proven collection.
    pub fn search(&self, term: &str, opts: &SearchOptions) -> Vec<SearchResult> {
        let filter = Filter {
            language: opts.language,
            min_coherency: opts.min_coherency,
            ..Default::default()
        };
        let candidates = self.patterns.iter(&filter);

        let mut results: Vec<SearchResult> = candidates
            .iter()
            .map(|p| {
                let score = match opts.mode {
                    SearchMode::Lexical => lexical_score(term, p),
                    SearchMode::Semantic => semantic_score(term, p),
                    SearchMode::Hybrid => {
                        0.55 * lexical_score(term, p) + 0.45 * semantic_score(term, p)
                    }
                };
                SearchResult {
                    pattern_id: p.id(),
                    score,
                }
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        results.truncate(opts.limit);
        results
    }

    /// Intent-aware search: parses `term`, ranks with staleness/over-
    /// evolution penalties, and suggests near-miss tag corrections.
    pub fn smart_search(&self, term: &str, opts: &SearchOptions) -> SmartSearchResult {
        let filter = Filter {
            language: opts.language,
            min_coherency: opts.min_coherency,
            ..Default::default()
        };
        let candidates = self.patterns.iter(&filter);
        let parsed_intent = intent::parse(term);
        let mut ranked = ranker::rank(&candidates, term, &parsed_intent, Utc::now());
        ranked.truncate(opts.limit);

        let corrections = suggest_corrections(term, &candidates);
        let suggestions = if ranked.is_empty() {
            vec!["try a shorter or more general query".to_string()]
        } else {
            Vec::new()
        };

        SmartSearchResult {
            corrections,
            intent: parsed_intent,
            results: ranked,
            suggestions,
        }
    }

    /// Aggregate stats across the local store and any remote summaries the
    /// federation layer supplies; no result content crosses the wire here.
    pub fn federated_search(local: StoreStats, remotes: Vec<StoreStats>) -> FederatedSearchStats {
        let combined_total = local.total + remotes.iter().map(|r| r.total).sum::<usize>();
        FederatedSearchStats {
            local,
            remotes,
            combined_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coherency::{CoherencyBreakdown, CoherencyScore, CoherencyWeights};
    use crate::pattern::PatternType;

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

    fn sample(name: &str, description: &str, tags: Vec<&str>) -> Pattern {
        Pattern::builder()
            .name(name)
            .code(format!("function {name}() {{ return 1; }}"))
            .language(Language::Javascript)
            .description(description)
            .tags(tags.into_iter().map(String::from).collect())
            .pattern_type(PatternType::Utility)
            .coherency_score(passing_coherency())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_lexical_search_finds_matching_pattern() {
        let store = PatternStore::open_in_memory().unwrap();
        store
            .insert(sample("debounce", "debounce a function call", vec!["timing"]), false)
            .await
            .unwrap();
        store
            .insert(sample("stack", "a LIFO data structure", vec!["data-structure"]), false)
            .await
            .unwrap();

        let engine = SearchEngine::new(&store);
        let results = engine.search(
            "debounce function",
            &SearchOptions {
                mode: SearchMode::Lexical,
                ..Default::default()
            },
        );
        assert!(!results.is_empty());
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn test_smart_search_returns_intent() {
        let store = PatternStore::open_in_memory().unwrap();
        store
            .insert(sample("validate_email", "validate an email address", vec!["validate"]), false)
            .await
            .unwrap();

        let engine = SearchEngine::new(&store);
        let result = engine.smart_search("validate an email", &SearchOptions::default());
        assert!(result.intent.intents.iter().any(|i| i.name == "validate"));
    }

    #[test]
    fn test_federated_search_sums_totals() {
        let local = StoreStats {
            total: 5,
            ..Default::default()
        };
        let remote = StoreStats {
            total: 3,
            ..Default::default()
        };
        let combined = SearchEngine::federated_search(local, vec![remote]);
        assert_eq!(combined.combined_total, 8);
    }
}
