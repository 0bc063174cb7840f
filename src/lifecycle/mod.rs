/**
 * Lifecycle Engine
 *
 * DESIGN DECISION: Three non-overlapping phases (Improve, Optimize,
 * Evolve) run in sequence inside one cycle, guarded by a try-lock so a
 * second `run_cycle` call while one is in flight fails fast instead of
 * queuing silently
 * WHY: Healing, promotion, and regression detection all read/write the
 * same pattern collection; letting two cycles interleave would race each
 * other's view of "what's low-coherency right now". This generalizes this
 * codebase's single-connection event-tracking discipline from passive
 * counting to an active maintenance loop over the store.
 *
 * REASONING CHAIN:
 * 1. Improve: heal the lowest-coherency patterns first, capped at
 *    `maxHealsPerRun`; auto-promote candidates that already clear the
 *    proven floor; delete stubs; normalize tags — each gated by its own
 *    config flag
 * 2. Optimize: detect unused/near-duplicate/still-low-coherency patterns
 *    and fold near-duplicates via the store's own dedup pass; everything
 *    else surfaces as a recommendation string, not an automatic action
 * 3. Evolve: compare each pattern's current success ratio against the
 *    snapshot taken at the end of the previous cycle; a drop of 0.3 or
 *    more is a regression; a pattern with 5+ uses and a success ratio
 *    under 0.4 gets a healing attempt
 * 4. Feedback/submission/registration counters independently track when a
 *    multiple of 10/5/25 is crossed; the engine reports the trigger, the
 *    host decides whether to call `run_cycle`
 *
 * PATTERN: Non-overlapping three-phase maintenance loop over counters +
 * store
 */

pub mod counters;

use crate::error::{Error, Result};
use crate::evaluator::{EvaluateOptions, Evaluator};
use crate::generator::Generator;
use crate::pattern::Pattern;
use crate::reflector;
use crate::store::{CandidateStore, PatternStore};
use chrono::Utc;
use counters::Counters;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock as StdRwLock;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

const HISTORY_CAPACITY: usize = 50;
const REGRESSION_DROP: f64 = 0.3;
const LOW_SUCCESS_RATE_FLOOR: f64 = 0.4;
const LOW_SUCCESS_MIN_USES: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Feedback,
    Submission,
    Registration,
}

#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub healed: usize,
    pub promoted: usize,
    pub stubs_removed: usize,
    pub retagged: usize,
    pub deduplicated: usize,
    pub regressions_detected: usize,
    pub regressions_healed: usize,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LifecycleStatus {
    pub feedback_count: u64,
    pub submission_count: u64,
    pub registration_count: u64,
    pub cycle_count: u64,
    pub enabled: bool,
}

pub struct LifecycleEngine<'a> {
    patterns: &'a PatternStore,
    candidates: &'a CandidateStore,
    counters: Counters,
    feedback_trigger: u64,
    submission_trigger: u64,
    registration_trigger: u64,
    max_heals_per_run: usize,
    auto_retag: bool,
    auto_clean: bool,
    floor_proven: f64,
    cycle_lock: AsyncMutex<()>,
    history: StdRwLock<VecDeque<CycleReport>>,
    enabled: AtomicBool,
}

impl<'a> LifecycleEngine<'a> {
    pub fn new(
        patterns: &'a PatternStore,
        candidates: &'a CandidateStore,
        counters: Counters,
        lifecycle: crate::config::LifecycleConfig,
        floor_proven: f64,
    ) -> Self {
        Self {
            patterns,
            candidates,
            counters,
            feedback_trigger: lifecycle.feedback_trigger,
            submission_trigger: lifecycle.submission_trigger,
            registration_trigger: lifecycle.registration_trigger,
            max_heals_per_run: lifecycle.max_heals_per_run,
            auto_retag: lifecycle.auto_retag,
            auto_clean: lifecycle.auto_clean,
            floor_proven,
            cycle_lock: AsyncMutex::new(()),
            history: StdRwLock::new(VecDeque::with_capacity(HISTORY_CAPACITY)),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn start(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> Result<LifecycleStatus> {
        Ok(LifecycleStatus {
            feedback_count: self.counters.get_count("feedback_count").await?,
            submission_count: self.counters.get_count("submission_count").await?,
            registration_count: self.counters.get_count("registration_count").await?,
            cycle_count: self.counters.get_count("cycle_count").await?,
            enabled: self.is_enabled(),
        })
    }

    /// Bumps the named trigger counter; `true` means the counter just
    /// crossed a multiple of its configured threshold.
    pub async fn record(&self, trigger: Trigger) -> Result<bool> {
        let (key, step) = match trigger {
            Trigger::Feedback => ("feedback_count", self.feedback_trigger),
            Trigger::Submission => ("submission_count", self.submission_trigger),
            Trigger::Registration => ("registration_count", self.registration_trigger),
        };
        let (_, triggered) = self.counters.bump(key, step).await?;
        Ok(triggered)
    }

    pub fn history(&self) -> Vec<CycleReport> {
        self.history.read().unwrap().iter().cloned().collect()
    }

    /// Runs Improve, Optimize, then Evolve once. Fails with
    /// [`Error::Conflict`] if a cycle is already in flight rather than
    /// queuing behind it.
    pub async fn run_cycle(&self, evaluator: &Evaluator, generator: Option<&dyn Generator>) -> Result<CycleReport> {
        let _guard = self
            .cycle_lock
            .try_lock()
            .map_err(|_| Error::Conflict("a lifecycle cycle is already running".to_string()))?;

        let (healed, promoted, stubs_removed, retagged) = self.improve(evaluator, generator).await?;
        let (deduplicated, mut recommendations) = self.optimize().await?;
        let (regressions_detected, regressions_healed) = self.evolve(evaluator, generator).await?;

        let report = CycleReport {
            healed,
            promoted,
            stubs_removed,
            retagged,
            deduplicated,
            regressions_detected,
            regressions_healed,
            recommendations: std::mem::take(&mut recommendations),
        };

        {
            let mut history = self.history.write().unwrap();
            if history.len() >= HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(report.clone());
        }

        self.counters.bump("cycle_count", 0).await?;
        tracing::info!(
            healed,
            promoted,
            stubs_removed,
            retagged,
            deduplicated,
            regressions_detected,
            regressions_healed,
            "lifecycle cycle complete"
        );

        Ok(report)
    }

    async fn improve(
        &self,
        evaluator: &Evaluator,
        generator: Option<&dyn Generator>,
    ) -> Result<(usize, usize, usize, usize)> {
        let mut healed = 0;
        if let Some(generator) = generator {
            let mut low_coherency: Vec<Pattern> = self
                .patterns
                .all()
                .into_iter()
                .filter(|p| p.coherency_score().total() < self.floor_proven)
                .collect();
            low_coherency.sort_by(|a, b| {
                a.coherency_score()
                    .total()
                    .partial_cmp(&b.coherency_score().total())
                    .unwrap()
            });

            for pattern in low_coherency.into_iter().take(self.max_heals_per_run) {
                if self.heal_pattern(&pattern, evaluator, generator).await? {
                    healed += 1;
                }
            }
        }

        let mut promoted = 0;
        for candidate in self.candidates.all() {
            if self.auto_promotes(&candidate, evaluator).await? {
                match crate::store::promote_candidate(self.candidates, self.patterns, candidate.id()).await {
                    Ok(_) => promoted += 1,
                    Err(Error::ConstraintViolated(reason)) => {
                        tracing::debug!(candidate_id = %candidate.id(), %reason, "candidate cleared the auto-promote gate but failed the store's own invariant check");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        let mut stubs_removed = 0;
        if self.auto_clean {
            for pattern in self.patterns.all() {
                if pattern.is_stub() {
                    self.patterns.delete(pattern.id()).await?;
                    stubs_removed += 1;
                }
            }
        }

        let mut retagged = 0;
        if self.auto_retag {
            for pattern in self.patterns.all() {
                let normalized = normalize_tags(pattern.tags());
                if normalized != pattern.tags() {
                    self.patterns.update(pattern.id(), |p| p.set_tags(normalized)).await?;
                    retagged += 1;
                }
            }
        }

        Ok((healed, promoted, stubs_removed, retagged))
    }

    async fn optimize(&self) -> Result<(usize, Vec<String>)> {
        let mut recommendations = Vec::new();
        let now = Utc::now();

        let unused = self
            .patterns
            .all()
            .iter()
            .filter(|p| {
                let last = p.last_used_at().unwrap_or(p.created_at());
                (now - last).num_days() >= 180
            })
            .count();
        if unused > 0 {
            recommendations.push(format!("{unused} pattern(s) unused for 180+ days; consider archiving"));
        }

        let deduplicated = self.patterns.deduplicate().await?;
        if deduplicated > 0 {
            recommendations.push(format!("merged {deduplicated} near-duplicate pattern(s)"));
        }

        let still_low = self
            .patterns
            .all()
            .iter()
            .filter(|p| p.coherency_score().total() < self.floor_proven)
            .count();
        if still_low > 0 {
            recommendations.push(format!(
                "{still_low} pattern(s) remain below the coherency floor after this run's heal cap"
            ));
        }

        Ok((deduplicated, recommendations))
    }

    async fn evolve(&self, evaluator: &Evaluator, generator: Option<&dyn Generator>) -> Result<(usize, usize)> {
        let previous = self.counters.load_success_ratios().await?;
        let mut current: HashMap<Uuid, f64> = HashMap::new();
        let mut regressions = 0;
        let mut regressions_healed = 0;

        for pattern in self.patterns.all() {
            let ratio = pattern.reliability().success_ratio();
            current.insert(pattern.id(), ratio);

            if let Some(&prev) = previous.get(&pattern.id()) {
                if ratio - prev <= -REGRESSION_DROP {
                    regressions += 1;
                }
            }

            if pattern.reliability().usage_count >= LOW_SUCCESS_MIN_USES && ratio < LOW_SUCCESS_RATE_FLOOR {
                if let Some(generator) = generator {
                    if self.heal_pattern(&pattern, evaluator, generator).await? {
                        regressions_healed += 1;
                    }
                }
            }
        }

        self.counters.snapshot_success_ratios(&current).await?;
        Ok((regressions, regressions_healed))
    }

    /// Whether `candidate` clears the automatic promotion gate: a
    /// synthesized test that actually passed, or (absent test code)
    /// coherency alone. A present-but-failing or inconclusive test means
    /// no auto-promotion, regardless of coherency.
    async fn auto_promotes(&self, candidate: &Pattern, evaluator: &Evaluator) -> Result<bool> {
        let Some(test_code) = candidate.test_code() else {
            return Ok(candidate.coherency_score().total() >= self.floor_proven);
        };

        let evaluation = evaluator.evaluate(
            candidate.code(),
            EvaluateOptions {
                language: Some(candidate.language()),
                test_code: Some(test_code),
                description: candidate.description(),
                min_coherency: 0.0,
            },
        )?;
        Ok(evaluation.coherency_score.breakdown().correctness >= 1.0)
    }

    /// Promotes `candidate_id` regardless of test outcome — the operator
    /// override `Candidate::promote`'s contract names. The store's own
    /// coherency-floor and covenant-seal gates still apply; this only
    /// bypasses the test-pass requirement `improve` enforces automatically.
    pub async fn force_promote(&self, candidate_id: Uuid) -> Result<Pattern> {
        crate::store::promote_candidate(self.candidates, self.patterns, candidate_id).await
    }

    /// Runs one SERF pass over `pattern`'s code, committing only if the
    /// improvement clears +0.02 and the result is covenant-sealed — the
    /// same commit gate the Resolver's EVOLVE path uses.
    async fn heal_pattern(&self, pattern: &Pattern, evaluator: &Evaluator, generator: &dyn Generator) -> Result<bool> {
        let before = pattern.coherency_score().total();
        let target = (before + 0.1).max(0.8).min(1.0);
        let description = pattern.description().to_string();

        let outcome = reflector::reflect(
            pattern.code(),
            target,
            3,
            |code| {
                let desc = description.clone();
                async move {
                    let evaluation = evaluator.evaluate(
                        &code,
                        EvaluateOptions {
                            description: &desc,
                            min_coherency: 0.0,
                            ..Default::default()
                        },
                    )?;
                    Ok(reflector::EvalOutcome {
                        score: evaluation.coherency_score.total(),
                        issues: evaluation.feedback.iter().map(|f| f.suggestion.clone()).collect(),
                    })
                }
            },
            |code, issues, _i| async move { generator.refine(&code, &issues).await },
        )
        .await?;

        let final_eval = evaluator.evaluate(
            &outcome.code,
            EvaluateOptions {
                description: pattern.description(),
                min_coherency: 0.0,
                ..Default::default()
            },
        )?;

        if outcome.score - before >= 0.02 && final_eval.covenant_sealed {
            self.patterns
                .update(pattern.id(), |p| p.record_healing(outcome.code.clone(), final_eval.coherency_score.clone()))
                .await?;
            Ok(true)
        } else {
            tracing::debug!(pattern_id = %pattern.id(), before, after = outcome.score, "heal attempt did not clear the commit bar");
            Ok(false)
        }
    }
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for tag in tags {
        let normalized = tag.trim().to_ascii_lowercase();
        if !normalized.is_empty() && !seen.contains(&normalized) {
            seen.push(normalized);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coherency::{CoherencyBreakdown, CoherencyScore, CoherencyWeights};
    use crate::config::{CovenantConfig, LifecycleConfig};
    use crate::generator::{GenerateRequest, GenerateResponse};
    use crate::pattern::{Language, PatternType};
    use async_trait::async_trait;

    fn weak_pattern(name: &str) -> Pattern {
        let breakdown = CoherencyBreakdown {
            correctness: 0.2,
            simplicity: 0.2,
            relevance: 0.2,
            clarity: 0.2,
            nesting: 0.2,
            security: 0.2,
        };
        let score = CoherencyScore::calculate(breakdown, &CoherencyWeights::default()).unwrap();
        Pattern::builder()
            .name(name)
            .code("function f(a) { return a }")
            .language(Language::Javascript)
            .description("a weak pattern")
            .pattern_type(PatternType::Utility)
            .coherency_score(score)
            .build()
            .unwrap()
    }

    struct TightenGenerator;

    #[async_trait]
    impl Generator for TightenGenerator {
        async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
            Ok(GenerateResponse {
                code: format!("// {}\nfn generated() {{}}", request.description),
                test_code: None,
            })
        }

        async fn refine(&self, code: &str, _issues: &[String]) -> Result<String> {
            Ok(format!("{code}\n/// documents the contract\nfn helper() -> bool {{ true }}"))
        }
    }

    #[tokio::test]
    async fn test_record_trigger_fires_on_threshold() {
        let patterns = PatternStore::open_in_memory().unwrap();
        let candidates = CandidateStore::open_in_memory().unwrap();
        let engine = LifecycleEngine::new(
            &patterns,
            &candidates,
            counters::Counters::open_in_memory().unwrap(),
            LifecycleConfig::default(),
            0.6,
        );
        let mut triggered_at = None;
        for i in 1..=10 {
            if engine.record(Trigger::Feedback).await.unwrap() {
                triggered_at = Some(i);
            }
        }
        assert_eq!(triggered_at, Some(10));
    }

    #[tokio::test]
    async fn test_run_cycle_promotes_passing_candidate() {
        let patterns = PatternStore::open_in_memory().unwrap();
        let candidates = CandidateStore::open_in_memory().unwrap();

        let breakdown = CoherencyBreakdown {
            correctness: 1.0,
            simplicity: 1.0,
            relevance: 1.0,
            clarity: 1.0,
            nesting: 1.0,
            security: 1.0,
        };
        let score = CoherencyScore::calculate(breakdown, &CoherencyWeights::default()).unwrap();
        let candidate = Pattern::builder()
            .name("ready")
            .code("function ready() { return true; }")
            .language(Language::Javascript)
            .coherency_score(score)
            .build()
            .unwrap();
        candidates.insert(candidate).await.unwrap();

        let engine = LifecycleEngine::new(
            &patterns,
            &candidates,
            counters::Counters::open_in_memory().unwrap(),
            LifecycleConfig::default(),
            0.6,
        );
        let evaluator = Evaluator::new(CoherencyWeights::default(), CovenantConfig::default());
        let report = engine.run_cycle(&evaluator, None).await.unwrap();

        assert_eq!(report.promoted, 1);
        assert_eq!(patterns.all().len(), 1);
        assert_eq!(candidates.all().len(), 0);
    }

    #[tokio::test]
    async fn test_run_cycle_heals_low_coherency_pattern() {
        // Seeded through a lenient store floor to simulate a pattern that
        // predates an operator raising `floor_proven` to 0.6 — exactly the
        // drift the Improve phase's heal pass exists to catch.
        let patterns = PatternStore::open_in_memory_with_floor(0.0).unwrap();
        let candidates = CandidateStore::open_in_memory().unwrap();
        patterns.insert(weak_pattern("weak"), false).await.unwrap();

        let engine = LifecycleEngine::new(
            &patterns,
            &candidates,
            counters::Counters::open_in_memory().unwrap(),
            LifecycleConfig::default(),
            0.6,
        );
        let evaluator = Evaluator::new(CoherencyWeights::default(), CovenantConfig::default());
        let generator = TightenGenerator;
        let report = engine.run_cycle(&evaluator, Some(&generator)).await.unwrap();

        assert!(report.healed <= 1);
    }

    struct AlwaysPass;
    impl crate::evaluator::TestRunner for AlwaysPass {
        fn run(&self, _code: &str, _test_code: &str, _language: Language) -> Result<bool> {
            Ok(true)
        }
    }

    struct AlwaysFail;
    impl crate::evaluator::TestRunner for AlwaysFail {
        fn run(&self, _code: &str, _test_code: &str, _language: Language) -> Result<bool> {
            Ok(false)
        }
    }

    fn candidate_with_test(name: &str, coherency_total: f64) -> Pattern {
        let breakdown = CoherencyBreakdown {
            correctness: coherency_total,
            simplicity: coherency_total,
            relevance: coherency_total,
            clarity: coherency_total,
            nesting: coherency_total,
            security: coherency_total,
        };
        let score = CoherencyScore::calculate(breakdown, &CoherencyWeights::default()).unwrap();
        Pattern::builder()
            .name(name)
            .code("function f() { return true; }")
            .language(Language::Javascript)
            .description("a candidate with a synthesized test")
            .pattern_type(PatternType::Utility)
            .test_code("assert(f() === true)")
            .coherency_score(score)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_cycle_promotes_candidate_with_passing_test() {
        let patterns = PatternStore::open_in_memory().unwrap();
        let candidates = CandidateStore::open_in_memory().unwrap();
        candidates.insert(candidate_with_test("passes", 0.8)).await.unwrap();

        let engine = LifecycleEngine::new(
            &patterns,
            &candidates,
            counters::Counters::open_in_memory().unwrap(),
            LifecycleConfig::default(),
            0.6,
        );
        let evaluator = Evaluator::new(CoherencyWeights::default(), CovenantConfig::default())
            .with_test_runner(Box::new(AlwaysPass));
        let report = engine.run_cycle(&evaluator, None).await.unwrap();

        assert_eq!(report.promoted, 1);
        assert_eq!(patterns.all().len(), 1);
    }

    #[tokio::test]
    async fn test_run_cycle_does_not_promote_candidate_with_failing_test() {
        let patterns = PatternStore::open_in_memory().unwrap();
        let candidates = CandidateStore::open_in_memory().unwrap();
        // Coherency alone (0.9) clears the floor, but a failing synthesized
        // test blocks auto-promotion regardless.
        let candidate = candidate_with_test("fails", 0.9);
        let id = candidate.id();
        candidates.insert(candidate).await.unwrap();

        let engine = LifecycleEngine::new(
            &patterns,
            &candidates,
            counters::Counters::open_in_memory().unwrap(),
            LifecycleConfig::default(),
            0.6,
        );
        let evaluator = Evaluator::new(CoherencyWeights::default(), CovenantConfig::default())
            .with_test_runner(Box::new(AlwaysFail));
        let report = engine.run_cycle(&evaluator, None).await.unwrap();

        assert_eq!(report.promoted, 0);
        assert_eq!(patterns.all().len(), 0);
        assert!(candidates.get(id).is_some());
    }

    #[tokio::test]
    async fn test_force_promote_bypasses_test_gate() {
        let patterns = PatternStore::open_in_memory().unwrap();
        let candidates = CandidateStore::open_in_memory().unwrap();
        let candidate = candidate_with_test("forced", 0.9);
        let id = candidate.id();
        candidates.insert(candidate).await.unwrap();

        let engine = LifecycleEngine::new(
            &patterns,
            &candidates,
            counters::Counters::open_in_memory().unwrap(),
            LifecycleConfig::default(),
            0.6,
        );
        let promoted = engine.force_promote(id).await.unwrap();

        assert_eq!(promoted.id(), id);
        assert!(patterns.get(id).is_some());
        assert!(candidates.get(id).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_cycle_runs_are_rejected() {
        let patterns = PatternStore::open_in_memory().unwrap();
        let candidates = CandidateStore::open_in_memory().unwrap();
        let engine = LifecycleEngine::new(
            &patterns,
            &candidates,
            counters::Counters::open_in_memory().unwrap(),
            LifecycleConfig::default(),
            0.6,
        );
        let evaluator = Evaluator::new(CoherencyWeights::default(), CovenantConfig::default());
        let _guard = engine.cycle_lock.lock().await;
        let err = engine.run_cycle(&evaluator, None).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }
}
