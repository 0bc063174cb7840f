/**
 * Coherency Evaluator
 *
 * DESIGN DECISION: A pure function of (code, language hint, test code)
 * that always returns a score, never panics, and only refuses to score
 * when the input is truly unscoreable
 * WHY: Every other component — Store on insert, Resolver on EVOLVE,
 * Reflector on each SERF iteration, Lifecycle on promote — calls through
 * this one gate, so its contract has to be total over well-formed input
 *
 * REASONING CHAIN:
 * 1. Language is inferred when not given, from syntactic cues
 * 2. Six dimensions are scored independently (metrics.rs)
 * 3. The covenant check runs once over the combined text (covenant.rs)
 * 4. `total` is the weighted sum; `valid` requires covenant sealed AND
 *    total above the caller-supplied minimum (defaults to
 *    `resolver.default_min_coherency`)
 * 5. Feedback is only generated when rejected, to keep the accepted path
 *    cheap
 *
 * PATTERN: Predicate-gate + weighted-dimension scorer (generalizes the
 * validation checklist this module is grounded on from a pattern-quality
 * gate into a coherency-and-covenant gate)
 */

pub mod covenant;
pub mod metrics;

use crate::coherency::{CoherencyBreakdown, CoherencyScore, CoherencyWeights};
use crate::config::CovenantConfig;
use crate::error::{Error, Result};
use crate::pattern::{Complexity, Language, PatternType};
use covenant::{Violation, ViolationSeverity};
use serde::{Deserialize, Serialize};

/// Optional, injectable capability for executing `testCode` against `code`
/// in an isolated sandbox. No concrete implementation ships in this crate
/// — running arbitrary code in nine languages is infrastructure a host
/// application supplies, not something this library can assume exists.
/// Absent a runner, correctness defaults to the spec's neutral 0.5 when
/// test code is present but unexecuted.
pub trait TestRunner: Send + Sync {
    fn run(&self, code: &str, test_code: &str, language: Language) -> Result<bool>;
}

/// Line-keyed, actionable rejection feedback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub dimension: String,
    pub line_hint: Option<u32>,
    pub suggestion: String,
}

/// Output of [`Evaluator::evaluate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub valid: bool,
    pub coherency_score: CoherencyScore,
    pub language: Language,
    pub pattern_type: PatternType,
    pub complexity: Complexity,
    pub covenant_sealed: bool,
    pub violations: Vec<Violation>,
    pub feedback: Vec<Feedback>,
}

/// Optional hints the caller may already know, sparing re-inference.
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions<'a> {
    pub language: Option<Language>,
    pub test_code: Option<&'a str>,
    pub description: &'a str,
    pub min_coherency: f64,
}

pub struct Evaluator {
    weights: CoherencyWeights,
    covenant: CovenantConfig,
    test_runner: Option<Box<dyn TestRunner>>,
}

impl Evaluator {
    pub fn new(weights: CoherencyWeights, covenant: CovenantConfig) -> Self {
        Self {
            weights,
            covenant,
            test_runner: None,
        }
    }

    pub fn with_test_runner(mut self, runner: Box<dyn TestRunner>) -> Self {
        self.test_runner = Some(runner);
        self
    }

    /// Scores `code` across the six coherency dimensions, runs the
    /// covenant check, and classifies language/type/complexity.
    ///
    /// Fails with [`Error::EvaluationFailure`] only when the language
    /// cannot be inferred and the code is empty or whitespace; otherwise
    /// always returns a score, even a rejecting one.
    pub fn evaluate(&self, code: &str, opts: EvaluateOptions) -> Result<EvaluationResult> {
        let trimmed = code.trim();
        let language = opts.language.unwrap_or_else(|| metrics::infer_language(code));
        if trimmed.is_empty() && language == Language::Unknown {
            return Err(Error::EvaluationFailure(
                "language unidentifiable and code is empty".to_string(),
            ));
        }

        let combined = format!("{} {}", opts.description, code);
        let violations = covenant::check(&combined);
        let sealed = covenant::is_sealed(&violations, self.covenant.strict);

        let correctness = self.correctness_score(code, opts.test_code, language);
        let security = security_score(&violations);

        let breakdown = CoherencyBreakdown {
            correctness,
            simplicity: metrics::simplicity_score(code),
            relevance: metrics::relevance_score(code, opts.description),
            clarity: metrics::clarity_score(code),
            nesting: metrics::nesting_score(code),
            security,
        };

        tracing::debug!(
            correctness,
            simplicity = breakdown.simplicity,
            relevance = breakdown.relevance,
            clarity = breakdown.clarity,
            nesting = breakdown.nesting,
            security,
            "coherency dimensions scored"
        );
        if !violations.is_empty() {
            tracing::warn!(count = violations.len(), sealed, "covenant violations found");
        }

        let coherency_score = CoherencyScore::calculate(breakdown, &self.weights)?;
        let cyclomatic = metrics::cyclomatic_complexity(code);
        let nesting_depth = metrics::max_nesting_depth(code);
        let complexity = metrics::classify_complexity(cyclomatic, nesting_depth);
        let pattern_type = infer_pattern_type(code);

        let valid = sealed && coherency_score.meets_threshold(opts.min_coherency);

        let feedback = if valid {
            Vec::new()
        } else {
            build_feedback(&breakdown, &violations, sealed, opts.min_coherency, coherency_score.total())
        };

        Ok(EvaluationResult {
            valid,
            coherency_score,
            language,
            pattern_type,
            complexity,
            covenant_sealed: sealed,
            violations,
            feedback,
        })
    }

    fn correctness_score(&self, code: &str, test_code: Option<&str>, language: Language) -> f64 {
        match (test_code, &self.test_runner) {
            (Some(test), Some(runner)) => match runner.run(code, test, language) {
                Ok(true) => 1.0,
                Ok(false) => 0.0,
                Err(_) => 0.5,
            },
            _ => 0.5,
        }
    }
}

fn security_score(violations: &[Violation]) -> f64 {
    let mut score = 1.0;
    for v in violations {
        score -= match v.severity {
            ViolationSeverity::Critical => 0.5,
            ViolationSeverity::High => 0.3,
            ViolationSeverity::Medium => 0.1,
        };
    }
    score.max(0.0)
}

fn infer_pattern_type(code: &str) -> PatternType {
    if code.contains("struct ") || code.contains("class ") {
        if code.contains("impl ") || code.contains("def __") {
            PatternType::DesignPattern
        } else {
            PatternType::DataStructure
        }
    } else if code.contains("assert") || code.contains("validate") || code.contains("check_") {
        PatternType::Validation
    } else if code.contains("sort") || code.contains("search") || code.contains("recurse") {
        PatternType::Algorithm
    } else if code.lines().count() < 15 {
        PatternType::Utility
    } else {
        PatternType::Other
    }
}

fn build_feedback(
    breakdown: &CoherencyBreakdown,
    violations: &[Violation],
    sealed: bool,
    min_coherency: f64,
    total: f64,
) -> Vec<Feedback> {
    let mut feedback = Vec::new();

    if !sealed {
        for v in violations
            .iter()
            .filter(|v| v.severity == ViolationSeverity::Critical)
        {
            feedback.push(Feedback {
                dimension: "security".to_string(),
                line_hint: None,
                suggestion: format!("{}: {}", v.predicate, v.message),
            });
        }
    }

    if total < min_coherency {
        let dims = [
            ("correctness", breakdown.correctness),
            ("simplicity", breakdown.simplicity),
            ("relevance", breakdown.relevance),
            ("clarity", breakdown.clarity),
            ("nesting", breakdown.nesting),
            ("security", breakdown.security),
        ];
        if let Some((name, _)) = dims.iter().min_by(|a, b| a.1.partial_cmp(&b.1).unwrap()) {
            feedback.push(Feedback {
                dimension: name.to_string(),
                line_hint: None,
                suggestion: format!("{name} is the weakest dimension; improve it before resubmitting"),
            });
        }
    }

    feedback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CovenantConfig;

    fn evaluator() -> Evaluator {
        Evaluator::new(CoherencyWeights::default(), CovenantConfig::default())
    }

    #[test]
    fn test_clean_simple_code_is_valid() {
        let result = evaluator()
            .evaluate(
                "fn add(a: i32, b: i32) -> i32 { a + b }",
                EvaluateOptions {
                    description: "add two integers",
                    min_coherency: 0.3,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(result.valid);
        assert!(result.covenant_sealed);
        assert_eq!(result.language, Language::Rust);
    }

    #[test]
    fn test_covenant_violation_invalidates() {
        let result = evaluator()
            .evaluate(
                "let q = \"SELECT * FROM users WHERE name = \" + name;",
                EvaluateOptions {
                    description: "lookup a user",
                    min_coherency: 0.1,
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!result.valid);
        assert!(!result.covenant_sealed);
        assert!(!result.feedback.is_empty());
    }

    #[test]
    fn test_empty_unidentifiable_code_errors() {
        let err = evaluator()
            .evaluate("   ", EvaluateOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::EvaluationFailure(_)));
    }

    #[test]
    fn test_correctness_neutral_without_test_runner() {
        let result = evaluator()
            .evaluate(
                "fn f() {}",
                EvaluateOptions {
                    test_code: Some("assert!(f() == ())"),
                    min_coherency: 0.0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.coherency_score.breakdown().correctness, 0.5);
    }

    struct AlwaysPass;
    impl TestRunner for AlwaysPass {
        fn run(&self, _code: &str, _test_code: &str, _language: Language) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn test_correctness_uses_injected_runner() {
        let evaluator = evaluator().with_test_runner(Box::new(AlwaysPass));
        let result = evaluator
            .evaluate(
                "fn f() {}",
                EvaluateOptions {
                    test_code: Some("assert!(true)"),
                    min_coherency: 0.0,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.coherency_score.breakdown().correctness, 1.0);
    }
}
