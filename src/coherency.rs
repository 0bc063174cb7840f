/**
 * Coherency Scoring Module
 *
 * DESIGN DECISION: Six weighted dimensions, each in [0.0, 1.0], summed to a
 * single total
 * WHY: A single "does this work" boolean throws away the gradient a
 * Resolver needs to choose between PULL, EVOLVE, and GENERATE; a flat
 * weighted sum keeps the scoring auditable (each dimension independently
 * inspectable) while still collapsing to one comparable number
 *
 * REASONING CHAIN:
 * 1. Each dimension contributes to the total based on a fixed weight
 * 2. Weights sum to 1.0, validated once at config load, not per-call
 * 3. All dimension scores must be in [0.0, 1.0]
 * 4. Total is clamped to [0.0, 1.0] to absorb floating-point drift
 * 5. Security carries real weight (0.15) because a covenant violation
 *    should visibly drag a pattern's score down even before the covenant
 *    gate rejects it outright
 *
 * PATTERN: Weighted-dimension scoring with transparent breakdown
 */

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Per-dimension weights; must sum to 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoherencyWeights {
    pub correctness: f64,
    pub simplicity: f64,
    pub relevance: f64,
    pub clarity: f64,
    pub nesting: f64,
    pub security: f64,
}

impl Default for CoherencyWeights {
    fn default() -> Self {
        Self {
            correctness: 0.30,
            simplicity: 0.15,
            relevance: 0.15,
            clarity: 0.15,
            nesting: 0.10,
            security: 0.15,
        }
    }
}

impl CoherencyWeights {
    pub fn sum(&self) -> f64 {
        self.correctness
            + self.simplicity
            + self.relevance
            + self.clarity
            + self.nesting
            + self.security
    }

    pub fn validate(&self) -> Result<()> {
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(Error::Internal(format!(
                "coherency weights must sum to 1.0, got {:.4}",
                self.sum()
            )));
        }
        Ok(())
    }
}

/// Individual dimension scores, each in [0.0, 1.0].
///
/// - `correctness`: does the code plausibly do what it claims (test pass
///   rate when test code exists, static-analysis heuristics otherwise).
/// - `simplicity`: inverse of raw size/branching complexity.
/// - `relevance`: how well tags/description match the intent that
///   produced this score.
/// - `clarity`: naming and structure heuristics (identifier length,
///   comment presence, consistent formatting).
/// - `nesting`: inverse of maximum block nesting depth.
/// - `security`: covenant-scan outcome, 1.0 when clean, reduced per
///   violation severity (but not the covenant gate itself — that is a
///   separate pass/fail check).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct CoherencyBreakdown {
    pub correctness: f64,
    pub simplicity: f64,
    pub relevance: f64,
    pub clarity: f64,
    pub nesting: f64,
    pub security: f64,
}

impl CoherencyBreakdown {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("correctness", self.correctness),
            ("simplicity", self.simplicity),
            ("relevance", self.relevance),
            ("clarity", self.clarity),
            ("nesting", self.nesting),
            ("security", self.security),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::EvaluationFailure(format!(
                    "dimension {name} out of range: {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Complete coherency score: total plus the per-dimension breakdown that
/// produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoherencyScore {
    total: f64,
    breakdown: CoherencyBreakdown,
}

impl Default for CoherencyScore {
    fn default() -> Self {
        Self {
            total: 0.0,
            breakdown: CoherencyBreakdown::default(),
        }
    }
}

impl CoherencyScore {
    /// Weighted sum of `breakdown` under `weights`, clamped to [0.0, 1.0].
    pub fn calculate(breakdown: CoherencyBreakdown, weights: &CoherencyWeights) -> Result<Self> {
        breakdown.validate()?;
        weights.validate()?;

        let total = breakdown.correctness * weights.correctness
            + breakdown.simplicity * weights.simplicity
            + breakdown.relevance * weights.relevance
            + breakdown.clarity * weights.clarity
            + breakdown.nesting * weights.nesting
            + breakdown.security * weights.security;

        Ok(Self {
            total: total.clamp(0.0, 1.0),
            breakdown,
        })
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn breakdown(&self) -> &CoherencyBreakdown {
        &self.breakdown
    }

    /// `total >= threshold`. The Store uses this against `floor_proven` to
    /// gate Candidate→Pattern promotion.
    pub fn meets_threshold(&self, threshold: f64) -> bool {
        self.total >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perfect_breakdown() -> CoherencyBreakdown {
        CoherencyBreakdown {
            correctness: 1.0,
            simplicity: 1.0,
            relevance: 1.0,
            clarity: 1.0,
            nesting: 1.0,
            security: 1.0,
        }
    }

    #[test]
    fn test_perfect_score_is_one() {
        let score = CoherencyScore::calculate(perfect_breakdown(), &CoherencyWeights::default())
            .unwrap();
        assert!((score.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_score_is_zero() {
        let score =
            CoherencyScore::calculate(CoherencyBreakdown::default(), &CoherencyWeights::default())
                .unwrap();
        assert_eq!(score.total(), 0.0);
    }

    #[test]
    fn test_out_of_range_dimension_rejected() {
        let mut breakdown = perfect_breakdown();
        breakdown.security = 1.5;
        let err = CoherencyScore::calculate(breakdown, &CoherencyWeights::default()).unwrap_err();
        assert!(matches!(err, Error::EvaluationFailure(_)));
    }

    #[test]
    fn test_bad_weights_rejected() {
        let weights = CoherencyWeights {
            correctness: 0.5,
            simplicity: 0.5,
            relevance: 0.5,
            clarity: 0.0,
            nesting: 0.0,
            security: 0.0,
        };
        let err = CoherencyScore::calculate(perfect_breakdown(), &weights).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[test]
    fn test_meets_threshold() {
        let score = CoherencyScore::calculate(perfect_breakdown(), &CoherencyWeights::default())
            .unwrap();
        assert!(score.meets_threshold(0.6));
        assert!(!score.meets_threshold(1.1));
    }
}
