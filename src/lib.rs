/**
 * Remembrance Oracle
 *
 * DESIGN DECISION: Modular architecture with separate concerns for pattern
 * representation, coherency scoring, storage, search, resolution, healing,
 * lifecycle management, and federation
 * WHY: Each of these is independently testable and independently evolves —
 * scoring weights change without touching storage, the resolver's
 * PULL/EVOLVE/GENERATE policy changes without touching the store's
 * merge-on-duplicate behavior, federation's acceptance rule is the same
 * Evaluator gate every other entry point uses
 *
 * REASONING CHAIN:
 * 1. Pattern representation and storage (pattern.rs, store/) are the
 *    foundation every other module reads or writes through
 * 2. Coherency scoring (coherency.rs, evaluator/) is the one gate code must
 *    clear to become a Pattern, used identically by Store::insert,
 *    Resolver's EVOLVE path, the Lifecycle engine's heal/promote phases,
 *    and federation submission
 * 3. Search (search/) and resolution (resolver.rs) sit above the store,
 *    answering "what do we already know" and "PULL, EVOLVE, or GENERATE"
 * 4. Reflection (reflector.rs) is the shared SERF healing loop that both
 *    the resolver and the lifecycle engine drive
 * 5. Lifecycle (lifecycle/) and federation (federation/) are the
 *    self-management and peer-sharing layers built on top of everything
 *    else
 * 6. Error handling centralized in error.rs provides consistent error
 *    semantics across every layer
 *
 * PATTERN: Layered library — representation, scoring gate, storage,
 * search/resolve, self-healing, self-management, federation
 */

pub mod coherency;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod federation;
pub mod generator;
pub mod lifecycle;
pub mod pattern;
pub mod reflector;
pub mod resolver;
pub mod search;
pub mod store;

// DESIGN DECISION: Re-export primary types at crate root
// WHY: Ergonomic imports for library consumers (use remembrance_oracle::Pattern)
//
// REASONING CHAIN:
// 1. Users should import Pattern, not remembrance_oracle::pattern::Pattern
// 2. Reduces import verbosity across calling code
// 3. Standard Rust library practice (std::io::Error vs std::Error)
// 4. Mirrors the flat re-export surface this crate is descended from

pub use error::{Error, Result};

pub use pattern::{
    Candidate, Complexity, DebugPattern, GenerationMethod, Language, Lineage, Pattern,
    PatternBuilder, PatternType, Reliability, VoteTally,
};

pub use coherency::{CoherencyBreakdown, CoherencyScore, CoherencyWeights};

pub use evaluator::{EvaluateOptions, EvaluationResult, Evaluator, Feedback, TestRunner};
pub use evaluator::covenant::{Violation, ViolationSeverity};

pub use store::{CandidateStore, Filter, InsertOutcome, PatternStore, StoreStats};
pub use store::portable::{ImportReport, PortableLibrary};
pub use store::seed::seed_from_dir;

pub use search::{
    FederatedSearchStats, SearchEngine, SearchMode, SearchOptions, SearchResult,
    SmartSearchResult,
};

pub use resolver::{Decision, HealingReport, ResolveOutcome, ResolveRequest, Resolver};

pub use reflector::{EvalOutcome, IterationRecord, ReflectOutcome, StopReason};

pub use generator::{GenerateRequest, GenerateResponse, Generator};

pub use lifecycle::{CycleReport, LifecycleEngine, LifecycleStatus, Trigger};
pub use lifecycle::counters::Counters;

pub use federation::{
    FederationNode, PullCommunityOptions, RemoteSearchHit, ShareOptions, SubmitMeta,
    SyncDirection, SyncReport, VoteOutcome, VoterStore,
};
pub use federation::remote::{RemotePeer, RemotePullFilter};
pub use federation::reputation::Voter;
pub use federation::rate_limit::{Category, IdempotencyGuard, RateLimiter};

pub use concurrency::{retry, Breaker, Breakers, CancelToken, RetryPolicy};

pub use config::{Config, ConfigLoader, ConfigValidator};

// DESIGN DECISION: Semantic versioning with compile-time version constants
// WHY: Hosts embedding this library (CLI, editor plugin, service) need to
// log and report which version they're running against

pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Returns the library version as a semantic version string.
///
/// # Examples
///
/// ```rust
/// use remembrance_oracle::version;
/// println!("Remembrance Oracle v{}", version());
/// ```
pub fn version() -> String {
    format!("{}.{}.{}", VERSION_MAJOR, VERSION_MINOR, VERSION_PATCH)
}
