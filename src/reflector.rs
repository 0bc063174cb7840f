/**
 * Reflector — SERF (self-reflection) loop
 *
 * DESIGN DECISION: A pure iterate-evaluate-refine loop with three stop
 * conditions (converged, stuck, regressed) plus a bounded iteration cap,
 * driven by injected async evaluate/refine steps
 * WHY: Healing has to terminate — a refine step that doesn't improve
 * anything, or oscillates, must not loop forever; this generalizes the
 * claimed-vs-actual iterative tracking this module is grounded on from
 * confidence calibration to code-coherency refinement. Evaluate/refine are
 * async because refine ultimately calls out to an injected `Generator`.
 *
 * REASONING CHAIN:
 * 1. Evaluate code_i; score_i >= target → converged, stop
 * 2. code_i == code_{i-1} (refine produced nothing new) → stuck, stop
 * 3. score_i <= two most recent prior scores → regressed, stop, keep best
 * 4. Otherwise refine and continue, up to maxLoops
 * 5. Always return the best-scoring iteration's code, never the last one
 *    blindly
 *
 * PATTERN: Bounded iterative refinement loop with explicit termination
 * reasons
 */

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Converged,
    Stuck,
    Regressed,
    MaxLoops,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub score: f64,
    pub issues: Vec<String>,
    pub code_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectOutcome {
    pub code: String,
    pub score: f64,
    pub converged: bool,
    pub iterations: u32,
    pub history: Vec<IterationRecord>,
    pub stop_reason: StopReason,
}

/// One evaluation of a code candidate: its score and the issues that
/// justify it (fed to `refine` on the next loop).
pub struct EvalOutcome {
    pub score: f64,
    pub issues: Vec<String>,
}

/// Runs the SERF loop: `evaluate` scores a candidate, `refine` proposes
/// the next one from the current code and issue list. Both are async so
/// the Resolver (EVOLVE healing) and the Lifecycle engine (Improve phase)
/// can supply whatever Evaluator/Generator pairing they hold.
pub async fn reflect<E, EvalFut, R, RefineFut>(
    code: &str,
    target: f64,
    max_loops: u32,
    mut evaluate: E,
    mut refine: R,
) -> Result<ReflectOutcome>
where
    E: FnMut(String) -> EvalFut,
    EvalFut: Future<Output = Result<EvalOutcome>>,
    R: FnMut(String, Vec<String>, u32) -> RefineFut,
    RefineFut: Future<Output = Result<String>>,
{
    let mut current = code.to_string();
    let mut history: Vec<IterationRecord> = Vec::new();
    let mut best_code = code.to_string();
    let mut best_score = f64::MIN;
    let mut stop_reason = StopReason::MaxLoops;
    let mut converged = false;
    let mut iterations = 0;

    for i in 0..max_loops {
        iterations = i + 1;
        let outcome = evaluate(current.clone()).await?;
        history.push(IterationRecord {
            score: outcome.score,
            issues: outcome.issues.clone(),
            code_length: current.len(),
        });

        if outcome.score > best_score {
            best_score = outcome.score;
            best_code = current.clone();
        }

        if outcome.score >= target {
            converged = true;
            stop_reason = StopReason::Converged;
            break;
        }

        if history.len() >= 2 {
            let previous = history[history.len() - 2].score;
            if outcome.score <= previous {
                stop_reason = StopReason::Regressed;
                break;
            }
        }

        let next = refine(current.clone(), outcome.issues, i).await?;
        if next == current {
            stop_reason = StopReason::Stuck;
            break;
        }
        current = next;
    }

    Ok(ReflectOutcome {
        code: best_code,
        score: best_score,
        converged,
        iterations,
        history,
        stop_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_converges_when_target_met() {
        let scores = [0.4, 0.9];
        let call = AtomicUsize::new(0);
        let outcome = reflect(
            "v0",
            0.8,
            3,
            |_code| {
                let i = call.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(EvalOutcome {
                        score: scores[i],
                        issues: vec!["low coherency".to_string()],
                    })
                }
            },
            |code, _issues, i| async move { Ok(format!("{code}-refined{i}")) },
        )
        .await
        .unwrap();

        assert!(outcome.converged);
        assert_eq!(outcome.stop_reason, StopReason::Converged);
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn test_stuck_when_refine_returns_identical_code() {
        let outcome = reflect(
            "same",
            0.9,
            3,
            |_code| async move {
                Ok(EvalOutcome {
                    score: 0.3,
                    issues: vec![],
                })
            },
            |code, _issues, _i| async move { Ok(code) },
        )
        .await
        .unwrap();

        assert!(!outcome.converged);
        assert_eq!(outcome.stop_reason, StopReason::Stuck);
    }

    #[tokio::test]
    async fn test_max_loops_returns_best_iteration() {
        let scores = [0.5, 0.6, 0.55];
        let call = AtomicUsize::new(0);
        let outcome = reflect(
            "v0",
            0.99,
            3,
            |_code| {
                let i = call.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(EvalOutcome {
                        score: scores[i],
                        issues: vec![],
                    })
                }
            },
            |code, _issues, i| async move { Ok(format!("{code}-{i}")) },
        )
        .await
        .unwrap();

        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 3);
    }

    #[tokio::test]
    async fn test_regression_stops_and_keeps_best() {
        let scores = [0.5, 0.6, 0.2];
        let call = AtomicUsize::new(0);
        let outcome = reflect(
            "v0",
            0.99,
            5,
            |_code| {
                let i = call.fetch_add(1, Ordering::SeqCst);
                async move {
                    Ok(EvalOutcome {
                        score: scores[i],
                        issues: vec![],
                    })
                }
            },
            |code, _issues, i| async move { Ok(format!("{code}-{i}")) },
        )
        .await
        .unwrap();

        assert_eq!(outcome.stop_reason, StopReason::Regressed);
        assert_eq!(outcome.code, "v0-0");
    }
}
