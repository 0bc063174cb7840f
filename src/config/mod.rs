/**
 * Configuration Module
 *
 * DESIGN DECISION: Layered configuration — built-in defaults, then an
 * optional TOML file, then environment variable overrides
 * WHY: Local-first operation needs a config that works with zero setup
 * (defaults), is easy to commit to a repo (`oracle.toml`), and is easy to
 * override per-deployment without editing files (env vars) — the same
 * later-wins layering discipline as the hierarchical config this is
 * descended from, flattened from four tiers to the two this system needs.
 *
 * REASONING CHAIN:
 * 1. Defaults live in each sub-config's `Default` impl, so a bare
 *    `Config::default()` is always a valid, fully-specified configuration.
 * 2. `oracle.toml` under the store root overrides defaults when present.
 * 3. `ORACLE_<SECTION>_<KEY>` environment variables override the file.
 * 4. Resolution order: env > file > defaults (last one applied wins).
 *
 * PATTERN: Layered configuration resolution
 */

pub mod validator;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use validator::ConfigValidator;

/// Complete Remembrance Oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub seed: SeedConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub coherency: CoherencyConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub reflect: ReflectConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub covenant: CovenantConfig,
    #[serde(default)]
    pub federation: FederationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            seed: SeedConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            coherency: CoherencyConfig::default(),
            resolver: ResolverConfig::default(),
            reflect: ReflectConfig::default(),
            lifecycle: LifecycleConfig::default(),
            covenant: CovenantConfig::default(),
            federation: FederationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub root_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(".remembrance"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedConfig {
    pub auto: bool,
    /// Directory scanned for `*.json` portable libraries at startup, relative
    /// to the store root unless absolute. `None` disables scanning even when
    /// `auto` is set.
    pub dir: Option<PathBuf>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            auto: true,
            dir: Some(PathBuf::from("seed")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub enabled: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sliding window size in seconds.
    pub window_secs: u64,
    pub max_requests_reads: u32,
    pub max_requests_submissions: u32,
    pub max_requests_deletions: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: 60,
            max_requests_reads: 100,
            max_requests_submissions: 5,
            max_requests_deletions: 3,
        }
    }
}

/// Coherency dimension weights; must sum to 1.0 (validated at load time).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoherencyConfig {
    pub weights: CoherencyWeightsConfig,
    /// Minimum `coherencyScore.total` for a Pattern to be considered proven (I1).
    pub floor_proven: f64,
}

impl Default for CoherencyConfig {
    fn default() -> Self {
        Self {
            weights: CoherencyWeightsConfig::default(),
            floor_proven: 0.6,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoherencyWeightsConfig {
    pub correctness: f64,
    pub simplicity: f64,
    pub relevance: f64,
    pub clarity: f64,
    pub nesting: f64,
    pub security: f64,
}

impl Default for CoherencyWeightsConfig {
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

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub tau_pull: f64,
    pub tau_evolve: f64,
    pub default_min_coherency: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tau_pull: 0.85,
            tau_evolve: 0.55,
            default_min_coherency: 0.55,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReflectConfig {
    pub max_loops: u32,
    pub target: f64,
}

impl Default for ReflectConfig {
    fn default() -> Self {
        Self {
            max_loops: 3,
            target: 0.8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LifecycleConfig {
    pub feedback_trigger: u64,
    pub submission_trigger: u64,
    pub registration_trigger: u64,
    pub max_heals_per_run: usize,
    pub auto_retag: bool,
    pub auto_sync: bool,
    pub auto_clean: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            feedback_trigger: 10,
            submission_trigger: 5,
            registration_trigger: 25,
            max_heals_per_run: 20,
            auto_retag: true,
            auto_sync: false,
            auto_clean: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CovenantConfig {
    pub strict: bool,
}

impl Default for CovenantConfig {
    fn default() -> Self {
        Self { strict: false }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FederationConfig {
    pub remote_timeout_ms: u64,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 30_000,
        }
    }
}

/// Loads and merges configuration from defaults, an optional TOML file, and
/// environment variable overrides.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration: defaults, then `<root>/oracle.toml` if present,
    /// then `ORACLE_*` environment overrides.
    pub fn load(root_dir: &Path) -> Result<Config> {
        let mut config = Config::default();
        config.store.root_dir = root_dir.to_path_buf();

        let toml_path = root_dir.join("oracle.toml");
        if toml_path.exists() {
            let contents = std::fs::read_to_string(&toml_path)?;
            config = toml::from_str(&contents)?;
            config.store.root_dir = root_dir.to_path_buf();
        }

        Self::apply_env_overrides(&mut config);
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Default store root: `.remembrance` under the user's home directory,
    /// falling back to the current directory when home can't be resolved.
    pub fn default_root_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".remembrance"))
            .unwrap_or_else(|| PathBuf::from(".remembrance"))
    }

    fn apply_env_overrides(config: &mut Config) {
        let env: HashMap<String, String> = std::env::vars().collect();

        if let Some(v) = env.get("ORACLE_STORE_ROOT_DIR") {
            config.store.root_dir = PathBuf::from(v);
        }
        if let Some(v) = bool_env(&env, "ORACLE_SEED_AUTO") {
            config.seed.auto = v;
        }
        if let Some(v) = env.get("ORACLE_SEED_DIR") {
            config.seed.dir = Some(PathBuf::from(v));
        }
        if let Some(v) = bool_env(&env, "ORACLE_AUTH_ENABLED") {
            config.auth.enabled = v;
        }
        if let Some(v) = float_env(&env, "ORACLE_RESOLVER_TAU_PULL") {
            config.resolver.tau_pull = v;
        }
        if let Some(v) = float_env(&env, "ORACLE_RESOLVER_TAU_EVOLVE") {
            config.resolver.tau_evolve = v;
        }
        if let Some(v) = float_env(&env, "ORACLE_REFLECT_TARGET") {
            config.reflect.target = v;
        }
        if let Some(v) = env
            .get("ORACLE_REFLECT_MAX_LOOPS")
            .and_then(|s| s.parse().ok())
        {
            config.reflect.max_loops = v;
        }
        if let Some(v) = bool_env(&env, "ORACLE_COVENANT_STRICT") {
            config.covenant.strict = v;
        }
        if let Some(v) = env
            .get("ORACLE_FEDERATION_REMOTE_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
        {
            config.federation.remote_timeout_ms = v;
        }
    }
}

fn bool_env(env: &HashMap<String, String>, key: &str) -> Option<bool> {
    env.get(key).and_then(|v| v.parse().ok())
}

fn float_env(env: &HashMap<String, String>, key: &str) -> Option<f64> {
    env.get(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = CoherencyWeightsConfig::default();
        let sum = w.correctness + w.simplicity + w.relevance + w.clarity + w.nesting + w.security;
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_env_override_root_dir() {
        std::env::set_var("ORACLE_STORE_ROOT_DIR", "/tmp/oracle-test-root");
        let mut config = Config::default();
        ConfigLoader::apply_env_overrides(&mut config);
        assert_eq!(
            config.store.root_dir,
            PathBuf::from("/tmp/oracle-test-root")
        );
        std::env::remove_var("ORACLE_STORE_ROOT_DIR");
    }
}
