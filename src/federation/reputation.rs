/**
 * Voter Reputation
 *
 * DESIGN DECISION: A single scalar reputation in [0, inf), starting at 1.0,
 * nudged by vote accuracy rather than a point-based karma system
 * WHY: Votes are supposed to predict whether a pattern's reliability will
 * hold up; a voter who is consistently right earns more influence over
 * future votes, a voter whose picks get rejected loses some. A bounded
 * multiplier derived from reputation (not reputation itself) is what
 * actually weights a vote, so reputation can grow without a vote ever
 * swamping the tally.
 *
 * REASONING CHAIN:
 * 1. `weight = clamp(log2(1 + reputation) * 0.6 + 0.4, 0.1, 5.0)` — log
 *    growth means early reputation gains matter more than later ones
 * 2. An accurate vote (the pattern's reliability later moved the direction
 *    the voter picked) adds `0.1 * min(1, |direction * deltaReliability|)`
 * 3. A rejected submission from this voter subtracts a flat 0.05
 * 4. Reputation never goes negative; weight never collapses to zero, so a
 *    low-reputation voter still counts for something
 *
 * PATTERN: Log-scaled reputation weighting over a plain scored record
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const ACCURACY_GAIN: f64 = 0.1;
const REJECTION_PENALTY: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    id: String,
    reputation: f64,
    votes_cast: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Voter {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            reputation: 1.0,
            votes_cast: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_row(id: String, reputation: f64, votes_cast: u64, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            reputation,
            votes_cast,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn reputation(&self) -> f64 {
        self.reputation
    }

    pub fn votes_cast(&self) -> u64 {
        self.votes_cast
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The signed weight a vote cast by this voter carries right now.
    pub fn weight(&self) -> f64 {
        ((1.0 + self.reputation).log2() * 0.6 + 0.4).clamp(0.1, 5.0)
    }

    pub fn record_vote_cast(&mut self) {
        self.votes_cast += 1;
        self.updated_at = Utc::now();
    }

    /// The pattern this voter weighed in on later moved its reliability in
    /// the direction the voter picked — reward proportional to how much.
    pub fn record_accurate_vote(&mut self, direction: i8, delta_reliability: f64) {
        let magnitude = (direction as f64 * delta_reliability).abs().min(1.0);
        self.reputation += ACCURACY_GAIN * magnitude;
        self.updated_at = Utc::now();
    }

    /// A pattern this voter submitted was rejected by the Evaluator.
    pub fn record_rejected_submission(&mut self) {
        self.reputation = (self.reputation - REJECTION_PENALTY).max(0.0);
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_reputation_is_one() {
        let voter = Voter::new("alice");
        assert_eq!(voter.reputation(), 1.0);
        assert!((voter.weight() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_accurate_vote_increases_reputation() {
        let mut voter = Voter::new("bob");
        voter.record_accurate_vote(1, 0.4);
        assert!(voter.reputation() > 1.0);
        assert!((voter.reputation() - 1.04).abs() < 1e-9);
    }

    #[test]
    fn test_rejection_penalty_floors_at_zero() {
        let mut voter = Voter::new("carol");
        for _ in 0..30 {
            voter.record_rejected_submission();
        }
        assert_eq!(voter.reputation(), 0.0);
    }

    #[test]
    fn test_weight_is_bounded() {
        let mut voter = Voter::new("dave");
        for _ in 0..10_000 {
            voter.record_accurate_vote(1, 1.0);
        }
        assert!(voter.weight() <= 5.0);
    }
}
