/**
 * Resolver — PULL / EVOLVE / GENERATE decision procedure
 *
 * DESIGN DECISION: Score the top-K smart-search candidates by a single
 * `fit` number that blends textual match, coherency, reliability, and
 * community vote signal, then route on two fixed thresholds
 * WHY: A caller asking "give me code for X" shouldn't have to separately
 * search, evaluate, and decide whether to reuse or regenerate — this
 * generalizes a flat match-then-decide confidence comparison into a
 * three-way routing decision
 *
 * REASONING CHAIN:
 * 1. smartSearch supplies up to five ranked candidates; no results means
 *    there is nothing to evolve or pull, so the decision is GENERATE
 *    without ever surfacing `NoCandidates` as an error
 * 2. Each candidate's `fit = 0.45*matchScore + 0.30*coherency.total +
 *    0.15*reliability + 0.10*voteScore`
 * 3. `fit >= tauPull` and a language match (when one was requested) pulls
 *    the pattern as-is
 * 4. `fit >= tauEvolve` heals the best candidate toward the requested
 *    description via the reflection loop, when a generator is available
 *    and the caller didn't opt out of healing
 * 5. Otherwise, GENERATE — the best candidates ride along as alternatives
 *
 * PATTERN: Top-K score-and-route decision procedure
 */

use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::evaluator::{EvaluateOptions, Evaluator};
use crate::generator::Generator;
use crate::pattern::{Language, Pattern};
use crate::reflector::{self, StopReason};
use crate::search::{SearchEngine, SearchMode, SearchOptions};
use crate::store::PatternStore;
use chrono::Utc;
use rand::seq::SliceRandom;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Pull,
    Evolve,
    Generate,
}

/// A request to resolve a description into working code: pull a proven
/// pattern, heal a near-miss, or fall back to generation.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub description: String,
    pub tags: Vec<String>,
    pub language: Option<Language>,
    /// Whether an EVOLVE decision should actually run the healing loop
    /// inline (requires a `Generator`) or just report the decision.
    pub heal: bool,
    /// Floor a candidate's `coherencyScore.total` must clear to be
    /// considered at all. `None` falls back to the resolver's configured
    /// `default_min_coherency`.
    pub min_coherency: Option<f64>,
}

impl Default for ResolveRequest {
    fn default() -> Self {
        Self {
            description: String::new(),
            tags: Vec::new(),
            language: None,
            heal: true,
            min_coherency: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealingReport {
    pub converged: bool,
    pub iterations: u32,
    pub stop_reason: StopReason,
    pub before_score: f64,
    pub after_score: f64,
}

#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub decision: Decision,
    pub confidence: f64,
    pub pattern: Option<Pattern>,
    pub healed_code: Option<String>,
    pub healing: Option<HealingReport>,
    pub alternatives: Vec<Uuid>,
    pub whisper: Option<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoherencyTier {
    Low,
    Mid,
    High,
}

impl CoherencyTier {
    fn classify(total: f64) -> Self {
        if total < 0.35 {
            CoherencyTier::Low
        } else if total < 0.65 {
            CoherencyTier::Mid
        } else {
            CoherencyTier::High
        }
    }
}

const WHISPERS_LOW: &[&str] = &[
    "this one's rough around the edges, read it before you trust it",
    "barely proven; treat it as a starting point, not an answer",
];
const WHISPERS_MID: &[&str] = &[
    "solid enough to reach for, worth a once-over on the edge cases",
    "proven but not polished",
];
const WHISPERS_HIGH: &[&str] = &[
    "well-worn and reliable",
    "this one's earned its keep",
];

fn pick_whisper(tier: CoherencyTier) -> String {
    let pool = match tier {
        CoherencyTier::Low => WHISPERS_LOW,
        CoherencyTier::Mid => WHISPERS_MID,
        CoherencyTier::High => WHISPERS_HIGH,
    };
    pool.choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("")
        .to_string()
}

fn recency_boost(pattern: &Pattern) -> f64 {
    let last = pattern.last_used_at().unwrap_or(pattern.created_at());
    let days_unused = (Utc::now() - last).num_days().max(0) as f64;
    (1.0 - (days_unused.min(180.0) / 180.0)).max(0.0)
}

fn reliability_score(pattern: &Pattern) -> f64 {
    let r = pattern.reliability();
    let healing_penalty = r.healing_rate.clamp(0.0, 1.0);
    0.6 * r.success_ratio() + 0.3 * (1.0 - healing_penalty) + 0.1 * recency_boost(pattern)
}

fn vote_component(pattern: &Pattern) -> f64 {
    let votes = pattern.votes();
    let total = (votes.upvotes + votes.downvotes).max(1) as f64;
    let normalized = (votes.vote_score() / total).clamp(-1.0, 1.0);
    (normalized + 1.0) / 2.0
}

fn fit_score(pattern: &Pattern, match_score: f64) -> f64 {
    0.45 * match_score
        + 0.30 * pattern.coherency_score().total()
        + 0.15 * reliability_score(pattern)
        + 0.10 * vote_component(pattern)
}

pub struct Resolver<'a> {
    patterns: &'a PatternStore,
    config: ResolverConfig,
}

impl<'a> Resolver<'a> {
    pub fn new(patterns: &'a PatternStore, config: ResolverConfig) -> Self {
        Self { patterns, config }
    }

    /// Routes `request` to PULL, EVOLVE, or GENERATE.
    pub async fn resolve(
        &self,
        request: ResolveRequest,
        evaluator: &Evaluator,
        generator: Option<&dyn Generator>,
    ) -> Result<ResolveOutcome> {
        let search_opts = SearchOptions {
            mode: SearchMode::Hybrid,
            language: request.language,
            limit: 5,
            min_coherency: Some(
                request
                    .min_coherency
                    .unwrap_or(self.config.default_min_coherency),
            ),
        };
        let smart = SearchEngine::new(self.patterns).smart_search(&request.description, &search_opts);

        if smart.results.is_empty() {
            return Ok(ResolveOutcome {
                decision: Decision::Generate,
                confidence: 0.0,
                pattern: None,
                healed_code: None,
                healing: None,
                alternatives: Vec::new(),
                whisper: None,
                reasoning: "no candidates matched the request; generating fresh code".to_string(),
            });
        }

        let mut scored: Vec<(Uuid, f64, f64)> = smart
            .results
            .iter()
            .filter_map(|ranked| {
                self.patterns
                    .get(ranked.pattern_id)
                    .map(|p| (p.id(), fit_score(&p, ranked.match_score), ranked.match_score))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        if scored.is_empty() {
            return Ok(ResolveOutcome {
                decision: Decision::Generate,
                confidence: 0.0,
                pattern: None,
                healed_code: None,
                healing: None,
                alternatives: Vec::new(),
                whisper: None,
                reasoning: "ranked candidates vanished from the store before lookup; generating fresh code".to_string(),
            });
        }

        let (best_id, best_fit, _best_match) = scored[0];
        let best_pattern = self
            .patterns
            .get(best_id)
            .ok_or_else(|| Error::NotFound(best_id.to_string()))?;
        let alternatives: Vec<Uuid> = scored.iter().skip(1).map(|(id, _, _)| *id).collect();
        let tier = CoherencyTier::classify(best_pattern.coherency_score().total());
        let whisper = Some(pick_whisper(tier));
        let language_match = request.language.map(|l| l == best_pattern.language()).unwrap_or(true);

        if best_fit >= self.config.tau_pull && language_match {
            return Ok(ResolveOutcome {
                decision: Decision::Pull,
                confidence: best_fit,
                pattern: Some(best_pattern),
                healed_code: None,
                healing: None,
                alternatives,
                whisper,
                reasoning: format!("fit {best_fit:.2} meets pull threshold {:.2}", self.config.tau_pull),
            });
        }

        if best_fit >= self.config.tau_evolve {
            if !request.heal {
                return Ok(ResolveOutcome {
                    decision: Decision::Evolve,
                    confidence: best_fit,
                    pattern: Some(best_pattern),
                    healed_code: None,
                    healing: None,
                    alternatives,
                    whisper,
                    reasoning: format!(
                        "fit {best_fit:.2} meets evolve threshold {:.2}; caller opted out of healing",
                        self.config.tau_evolve
                    ),
                });
            }

            let Some(generator) = generator else {
                return Ok(ResolveOutcome {
                    decision: Decision::Evolve,
                    confidence: best_fit,
                    pattern: Some(best_pattern),
                    healed_code: None,
                    healing: None,
                    alternatives,
                    whisper,
                    reasoning: format!(
                        "fit {best_fit:.2} meets evolve threshold {:.2}; no generator injected to heal with",
                        self.config.tau_evolve
                    ),
                });
            };

            let before_score = best_pattern.coherency_score().total();
            let target = (before_score + 0.1).max(0.8).min(1.0);
            let description = request.description.clone();

            let outcome = reflector::reflect(
                best_pattern.code(),
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
                    description: &request.description,
                    min_coherency: 0.0,
                    ..Default::default()
                },
            )?;
            let improved_enough = outcome.score - before_score >= 0.02 && final_eval.covenant_sealed;
            let healing = HealingReport {
                converged: outcome.converged,
                iterations: outcome.iterations,
                stop_reason: outcome.stop_reason,
                before_score,
                after_score: outcome.score,
            };

            return Ok(ResolveOutcome {
                decision: Decision::Evolve,
                confidence: best_fit,
                pattern: Some(best_pattern),
                healed_code: if improved_enough { Some(outcome.code) } else { None },
                healing: Some(healing),
                alternatives,
                whisper,
                reasoning: if improved_enough {
                    format!("healed from {before_score:.2} to {:.2}", outcome.score)
                } else {
                    format!(
                        "healing attempt improved {before_score:.2} to only {:.2}, below the +0.02 commit bar",
                        outcome.score
                    )
                },
            });
        }

        Ok(ResolveOutcome {
            decision: Decision::Generate,
            confidence: best_fit,
            pattern: None,
            healed_code: None,
            healing: None,
            alternatives: scored.into_iter().map(|(id, _, _)| id).collect(),
            whisper,
            reasoning: format!(
                "best fit {best_fit:.2} falls below evolve threshold {:.2}",
                self.config.tau_evolve
            ),
        })
    }
}
