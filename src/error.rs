/**
 * Error Handling Module
 *
 * DESIGN DECISION: Centralized error kinds using thiserror for consistent error semantics
 * WHY: Library code must never panic; every fallible operation returns a Result
 *
 * REASONING CHAIN:
 * 1. Each error variant corresponds to one of the named error kinds of the system
 * 2. thiserror derives Display without hand-written boilerplate
 * 3. Centralized error types enable consistent handling across evaluator, store,
 *    resolver, lifecycle, and federation
 * 4. From impls enable ? propagation from serde_json, std::io, and rusqlite
 * 5. Retry/backoff policy keys off the error *kind* (Transient vs Fatal vs
 *    CircuitOpen), so variants are grouped that way below
 *
 * PATTERN: Rust error handling best practices
 */

use thiserror::Error as ThisError;

/// Primary error type for the Remembrance Oracle.
///
/// Variants are grouped by the error kinds named in the component design:
/// validation/duplicate/not-found/conflict outcomes from the store and
/// evaluator, transient/circuit-open outcomes from federation and the
/// generator adapter, and a fatal kind for integrity failures.
#[derive(ThisError, Debug, Clone)]
pub enum Error {
    /// Evaluator returned `valid=false` or the covenant did not seal.
    /// Not retryable; caller should act on `violations`/`feedback`.
    #[error("pattern rejected: {0}")]
    ValidationRejected(String),

    /// Insertion would violate the (name, language) uniqueness invariant.
    /// Surfaced as a merge outcome carrying the surviving id, not a hard
    /// failure, unless the caller opted into `strictInsert`.
    #[error("duplicate pattern, merged into {surviving_id}")]
    Duplicate { surviving_id: String },

    /// A referenced identifier (pattern, candidate, voter, remote) is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// A concurrent modification lost a compare-and-set race.
    /// Caller may retry up to 3 times.
    #[error("conflict updating {0}, retry")]
    Conflict(String),

    /// Network, lock-busy, or timeout failure. Retryable with backoff up to
    /// the circuit-breaker threshold.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Integrity check failed or storage is corrupt. Non-retryable; the
    /// affected subsystem should be marked degraded.
    #[error("fatal: {0}")]
    Fatal(String),

    /// A circuit breaker has opened after repeated transient failures.
    #[error("circuit open for {operation}, retry after {retry_after_secs}s")]
    CircuitOpen {
        operation: String,
        retry_after_secs: u64,
    },

    /// The code/test pair could not even be scored: the language could not
    /// be inferred and the code is empty or whitespace.
    #[error("evaluation failed: {0}")]
    EvaluationFailure(String),

    /// Library holds no candidates to resolve against; surfaced by the
    /// resolver as `decision=GENERATE`, not propagated as an error to
    /// external callers, but used internally to short-circuit scoring.
    #[error("no candidates available")]
    NoCandidates,

    /// Generic I/O error (config file, seed directory, etc.).
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON/TOML (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Rate limit exceeded at a federation endpoint.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Unexpected internal error; should not occur in normal operation.
    #[error("internal error: {0}")]
    Internal(String),

    /// A store write would violate a standing invariant on the proven
    /// collection: sub-floor coherency (I1) or an unsealed covenant (I7).
    #[error("constraint violated: {0}")]
    ConstraintViolated(String),
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a caller should retry this error with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Conflict(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("row".to_string()),
            other => Error::Fatal(format!("database error: {}", other)),
        }
    }
}
