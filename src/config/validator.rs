/**
 * Configuration Validator
 *
 * DESIGN DECISION: Separate validation module from config structs
 * WHY: Structural defaults (serde) and semantic validation (weights sum
 * to 1.0, thresholds ordered correctly) are different concerns
 */

use super::Config;
use crate::error::{Error, Result};

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &Config) -> Result<()> {
        let w = &config.coherency.weights;
        let sum =
            w.correctness + w.simplicity + w.relevance + w.clarity + w.nesting + w.security;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(Error::Internal(format!(
                "coherency weights must sum to 1.0, got {:.4}",
                sum
            )));
        }

        if config.resolver.tau_evolve > config.resolver.tau_pull {
            return Err(Error::Internal(
                "resolver.tau_evolve must be <= resolver.tau_pull".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&config.coherency.floor_proven) {
            return Err(Error::Internal(
                "coherency.floor_proven must be in [0, 1]".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoherencyWeightsConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_bad_weights_rejected() {
        let mut config = Config::default();
        config.coherency.weights = CoherencyWeightsConfig {
            correctness: 0.5,
            simplicity: 0.5,
            relevance: 0.5,
            clarity: 0.0,
            nesting: 0.0,
            security: 0.0,
        };
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut config = Config::default();
        config.resolver.tau_evolve = 0.9;
        config.resolver.tau_pull = 0.5;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
