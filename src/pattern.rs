/**
 * Pattern & Candidate Data Model
 *
 * DESIGN DECISION: Closed record with private fields and typed getters,
 * built through a fluent builder
 * WHY: Open maps let fields accrete untyped over time; a closed record
 * with an `extensions` escape hatch keeps forward-compatibility without
 * the untyped-map footgun, and keeps invariant enforcement in one place
 * instead of scattered across call sites.
 *
 * REASONING CHAIN:
 * 1. Private fields + getters mean every read goes through a stable API
 * 2. The builder validates on `.build()`, so an invalid Pattern cannot exist
 * 3. `Candidate` mirrors `Pattern` field-for-field but lives in a separate
 *    collection, implemented as a thin wrapper rather than a duplicate of
 *    every field so the two shapes stay in lockstep
 *
 * PATTERN: Builder + typed-getter record
 */

use crate::coherency::CoherencyScore;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Closed enumeration of source languages a Pattern can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Javascript,
    Typescript,
    Python,
    Go,
    Rust,
    Java,
    C,
    Cpp,
    Csharp,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Python => "python",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Csharp => "csharp",
            Language::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "javascript" | "js" => Language::Javascript,
            "typescript" | "ts" => Language::Typescript,
            "python" | "py" => Language::Python,
            "go" | "golang" => Language::Go,
            "rust" | "rs" => Language::Rust,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" | "cxx" => Language::Cpp,
            "csharp" | "c#" | "cs" => Language::Csharp,
            _ => Language::Unknown,
        }
    }
}

/// Pattern classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternType {
    Utility,
    Algorithm,
    DesignPattern,
    Validation,
    DataStructure,
    Other,
}

/// Complexity bucket derived from code during evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

/// How a Pattern came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMethod {
    Seed,
    Submit,
    Evolve,
    Variant,
    Transpile,
    Synthesize,
    Heal,
}

impl Default for GenerationMethod {
    fn default() -> Self {
        GenerationMethod::Seed
    }
}

/// Usage and bug-report signal accumulated by a Pattern over time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Reliability {
    pub usage_count: u64,
    pub success_count: u64,
    pub bug_reports: u64,
    pub healing_rate: f64,
}

impl Reliability {
    /// `successCount / max(1, usageCount)` — the reliability component the
    /// Resolver's fit formula reads.
    pub fn success_ratio(&self) -> f64 {
        self.success_count as f64 / self.usage_count.max(1) as f64
    }

    /// Record a single use; `success_count` only ever moves alongside
    /// `usage_count`, so it can never exceed it.
    pub fn record_use(&mut self, success: bool) {
        self.usage_count += 1;
        if success {
            self.success_count += 1;
        }
    }
}

/// Upvote/downvote tally plus the per-voter weights that produced it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VoteTally {
    pub upvotes: u64,
    pub downvotes: u64,
    /// `voterId -> signed weight applied at vote time`.
    pub voter_weights: HashMap<String, f64>,
}

impl VoteTally {
    /// `Σ weight(voter)` signed by vote direction.
    pub fn vote_score(&self) -> f64 {
        self.voter_weights.values().sum()
    }

    pub fn record_vote(&mut self, voter_id: &str, direction: i8, weight: f64) {
        if direction > 0 {
            self.upvotes += 1;
        } else {
            self.downvotes += 1;
        }
        self.voter_weights
            .insert(voter_id.to_string(), weight * direction.signum() as f64);
    }
}

/// Optional lineage pointer: at most one parent, recorded with the method
/// that produced this pattern from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lineage {
    pub parent_pattern: Option<Uuid>,
    pub generation_method: GenerationMethod,
}

/// The unit of long-term memory: a proven, named, scored piece of code.
///
/// Fields are private; construct through [`Pattern::builder`] and read
/// through the typed getters below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    id: Uuid,
    name: String,
    code: String,
    language: Language,
    description: String,
    tags: Vec<String>,
    test_code: Option<String>,
    pattern_type: PatternType,
    complexity: Complexity,
    coherency_score: CoherencyScore,
    reliability: Reliability,
    votes: VoteTally,
    lineage: Lineage,
    author: String,
    extensions: HashMap<String, String>,
    covenant_sealed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_used_at: Option<DateTime<Utc>>,
}

impl Pattern {
    pub fn builder() -> PatternBuilder {
        PatternBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn code(&self) -> &str {
        &self.code
    }
    pub fn language(&self) -> Language {
        self.language
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn tags(&self) -> &[String] {
        &self.tags
    }
    pub fn test_code(&self) -> Option<&str> {
        self.test_code.as_deref()
    }
    pub fn pattern_type(&self) -> PatternType {
        self.pattern_type
    }
    pub fn complexity(&self) -> Complexity {
        self.complexity
    }
    pub fn coherency_score(&self) -> &CoherencyScore {
        &self.coherency_score
    }
    pub fn reliability(&self) -> &Reliability {
        &self.reliability
    }
    pub fn votes(&self) -> &VoteTally {
        &self.votes
    }
    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }
    pub fn author(&self) -> &str {
        &self.author
    }
    pub fn extensions(&self) -> &HashMap<String, String> {
        &self.extensions
    }
    /// Whether the covenant check sealed this pattern at evaluation time (I7).
    pub fn covenant_sealed(&self) -> bool {
        self.covenant_sealed
    }
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    /// Canonical dedup key: `(lowercase(name), language)`.
    pub fn canonical_key(&self) -> (String, Language) {
        (self.name.to_ascii_lowercase(), self.language)
    }

    /// `true` when fewer than three non-blank lines remain — a candidate
    /// for cleanup during the Lifecycle Improve phase.
    pub fn is_stub(&self) -> bool {
        self.code.lines().filter(|l| !l.trim().is_empty()).count() <= 3
    }

    pub fn set_code(&mut self, code: String) {
        self.code = code;
        self.updated_at = Utc::now();
    }

    pub fn set_coherency_score(&mut self, score: CoherencyScore) {
        self.coherency_score = score;
        self.updated_at = Utc::now();
    }

    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = tags;
        self.updated_at = Utc::now();
    }

    pub fn union_tags(&mut self, other: &[String]) {
        for tag in other {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
            }
        }
        self.updated_at = Utc::now();
    }

    pub fn record_use(&mut self, success: bool) {
        self.reliability.record_use(success);
        self.last_used_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }

    pub fn record_vote(&mut self, voter_id: &str, direction: i8, weight: f64) {
        self.votes.record_vote(voter_id, direction, weight);
        self.updated_at = Utc::now();
    }

    pub fn record_healing(&mut self, new_code: String, new_score: CoherencyScore) {
        self.code = new_code;
        self.coherency_score = new_score;
        self.reliability.healing_rate = (self.reliability.healing_rate * 0.8) + 0.2;
        self.updated_at = Utc::now();
    }
}

/// Fluent constructor for [`Pattern`]; validates non-empty name/code on
/// `.build()` and defaults every optional field.
#[derive(Default)]
pub struct PatternBuilder {
    id: Option<Uuid>,
    name: Option<String>,
    code: Option<String>,
    language: Option<Language>,
    description: String,
    tags: Vec<String>,
    test_code: Option<String>,
    pattern_type: Option<PatternType>,
    complexity: Option<Complexity>,
    coherency_score: Option<CoherencyScore>,
    reliability: Reliability,
    votes: VoteTally,
    parent_pattern: Option<Uuid>,
    generation_method: GenerationMethod,
    author: String,
    extensions: HashMap<String, String>,
    covenant_sealed: Option<bool>,
    created_at: Option<DateTime<Utc>>,
}

impl PatternBuilder {
    pub fn id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
    pub fn language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
    pub fn test_code(mut self, test_code: impl Into<String>) -> Self {
        self.test_code = Some(test_code.into());
        self
    }
    pub fn pattern_type(mut self, pattern_type: PatternType) -> Self {
        self.pattern_type = Some(pattern_type);
        self
    }
    pub fn complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }
    pub fn coherency_score(mut self, score: CoherencyScore) -> Self {
        self.coherency_score = Some(score);
        self
    }
    pub fn reliability(mut self, reliability: Reliability) -> Self {
        self.reliability = reliability;
        self
    }
    pub fn parent_pattern(mut self, parent: Uuid) -> Self {
        self.parent_pattern = Some(parent);
        self
    }
    pub fn generation_method(mut self, method: GenerationMethod) -> Self {
        self.generation_method = method;
        self
    }
    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
    /// Sets the covenant-seal bit directly. Defaults to `true` when unset,
    /// since hand-built fixtures and synthesizer output that never ran
    /// through the evaluator aren't violating anything by construction.
    pub fn covenant_sealed(mut self, sealed: bool) -> Self {
        self.covenant_sealed = Some(sealed);
        self
    }

    pub fn build(self) -> Result<Pattern> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| Error::ValidationRejected("pattern name is required".to_string()))?;
        let code = self
            .code
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::ValidationRejected("pattern code is required".to_string()))?;

        let now = Utc::now();
        Ok(Pattern {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            name,
            code,
            language: self.language.unwrap_or(Language::Unknown),
            description: self.description,
            tags: self.tags,
            test_code: self.test_code,
            pattern_type: self.pattern_type.unwrap_or(PatternType::Other),
            complexity: self.complexity.unwrap_or(Complexity::Medium),
            coherency_score: self.coherency_score.unwrap_or_default(),
            reliability: self.reliability,
            votes: self.votes,
            lineage: Lineage {
                parent_pattern: self.parent_pattern,
                generation_method: self.generation_method,
            },
            author: self.author,
            extensions: self.extensions,
            covenant_sealed: self.covenant_sealed.unwrap_or(true),
            created_at: self.created_at.unwrap_or(now),
            updated_at: now,
            last_used_at: None,
        })
    }
}

/// An unproven but coherent piece of code awaiting test synthesis and
/// promotion. Shares Pattern's exact shape via composition rather than
/// duplicating every field — a Candidate never appears in proven search
/// results, and vice versa, enforced by the Store keeping the two in
/// separate tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    inner: Pattern,
}

impl Candidate {
    pub fn new(pattern: Pattern) -> Self {
        Self { inner: pattern }
    }

    pub fn pattern(&self) -> &Pattern {
        &self.inner
    }

    pub fn pattern_mut(&mut self) -> &mut Pattern {
        &mut self.inner
    }

    /// Promote to a Pattern once a synthesized test passes or an operator
    /// forces it. The transition itself (remove-from-candidates,
    /// insert-into-patterns) is the Store's responsibility so it can be
    /// atomic.
    pub fn promote(self) -> Pattern {
        self.inner
    }
}

/// Error→fix memory: same lifecycle, different shape, not search-indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugPattern {
    pub id: Uuid,
    pub error_class: String,
    pub error_category: String,
    pub fix_code: String,
    pub times_applied: u64,
    pub times_resolved: u64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DebugPattern {
    pub fn new(
        error_class: impl Into<String>,
        error_category: impl Into<String>,
        fix_code: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            error_class: error_class.into(),
            error_category: error_category.into(),
            fix_code: fix_code.into(),
            times_applied: 0,
            times_resolved: 0,
            confidence: 0.5,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_application(&mut self, resolved: bool) {
        self.times_applied += 1;
        if resolved {
            self.times_resolved += 1;
        }
        self.confidence = self.times_resolved as f64 / self.times_applied.max(1) as f64;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pattern() -> Pattern {
        Pattern::builder()
            .name("debounce")
            .code("function debounce(fn, ms) { let t; return (...a) => { clearTimeout(t); t = setTimeout(() => fn(...a), ms); }; }")
            .language(Language::Javascript)
            .description("debounce a function call")
            .tags(vec!["timing".to_string(), "utility".to_string()])
            .pattern_type(PatternType::Utility)
            .complexity(Complexity::Low)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_name_and_code() {
        let err = Pattern::builder().name("x").build().unwrap_err();
        assert!(matches!(err, Error::ValidationRejected(_)));
    }

    #[test]
    fn test_canonical_key_is_lowercase() {
        let p = sample_pattern();
        assert_eq!(
            p.canonical_key(),
            ("debounce".to_string(), Language::Javascript)
        );
    }

    #[test]
    fn test_reliability_bounds_preserved() {
        let mut reliability = Reliability::default();
        reliability.record_use(true);
        reliability.record_use(false);
        reliability.record_use(true);
        assert!(reliability.success_count <= reliability.usage_count);
        assert_eq!(reliability.success_count, 2);
        assert_eq!(reliability.usage_count, 3);
    }

    #[test]
    fn test_vote_score_accounting() {
        let mut votes = VoteTally::default();
        votes.record_vote("voter-a", 1, 1.0);
        votes.record_vote("voter-b", -1, 1.6);
        assert_eq!(votes.upvotes, 1);
        assert_eq!(votes.downvotes, 1);
        assert!((votes.vote_score() - (-0.6)).abs() < 1e-9);
    }

    #[test]
    fn test_candidate_promotion_preserves_fields() {
        let pattern = sample_pattern();
        let id = pattern.id();
        let candidate = Candidate::new(pattern);
        let promoted = candidate.promote();
        assert_eq!(promoted.id(), id);
    }

    #[test]
    fn test_stub_detection() {
        let stub = Pattern::builder()
            .name("noop")
            .code("fn noop() {}")
            .build()
            .unwrap();
        assert!(stub.is_stub());

        let real = sample_pattern();
        assert!(!real.is_stub());
    }

    #[test]
    fn test_language_parse_roundtrip() {
        for lang in [
            Language::Javascript,
            Language::Typescript,
            Language::Python,
            Language::Go,
            Language::Rust,
            Language::Java,
            Language::C,
            Language::Cpp,
            Language::Csharp,
        ] {
            assert_eq!(Language::parse(lang.as_str()), lang);
        }
    }
}
