/**
 * Cancellation, Retry & Circuit Breaking
 *
 * DESIGN DECISION: Three small, independent primitives — a cooperative
 * cancellation token, a backoff-driven retry helper, and a per-operation
 * circuit breaker registry — rather than one combined "resilience" type
 * WHY: Long-running operations (SERF loops, lifecycle cycles, remote
 * search, Generator calls) need to be told to stop; transient failures
 * (lock contention, a flaky remote) need backoff; a remote that keeps
 * failing needs to stop being tried at all for a while. These are
 * different concerns with different lifetimes — a token belongs to one
 * call, a breaker belongs to an operation name and outlives any single call
 *
 * REASONING CHAIN:
 * 1. `CancelToken` mirrors the `tokio::sync::Notify`-based cancellation
 *    token already used in this codebase's workflow engine, generalized
 *    off `parking_lot` (not part of this crate's dependency stack) onto
 *    `std::sync::RwLock`
 * 2. `retry` wraps a fallible async operation with exponential backoff and
 *    jitter, stopping early on a non-retryable error or cancellation
 * 3. `Breaker` tracks consecutive failures for one named operation; once
 *    the failure count crosses the threshold it opens and fast-fails with
 *    `Error::CircuitOpen` until the cooldown elapses, then allows one trial
 *    call through (half-open) before closing again on success
 * 4. `Breakers` is the per-node registry, one `Breaker` per operation name,
 *    so a flaky remote doesn't degrade calls to a healthy one
 *
 * PATTERN: Cooperative cancellation token + backoff retry + circuit breaker
 * registry
 */

use crate::error::{Error, Result};
use rand::Rng;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

const CONSECUTIVE_FAILURE_THRESHOLD: u32 = 5;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(60);

/// A token for cooperative cancellation, shareable across tasks. Every
/// clone observes the same cancellation; child tokens are cancelled
/// whenever their parent is.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: StdRwLock<bool>,
    notify: Notify,
    parent: Option<CancelToken>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: StdRwLock::new(false),
                notify: Notify::new(),
                parent: None,
            }),
        }
    }

    /// A token that is cancelled whenever `self` is, in addition to
    /// however it is cancelled directly.
    pub fn child_token(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: StdRwLock::new(false),
                notify: Notify::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    pub fn cancel(&self) {
        *self.inner.cancelled.write().unwrap() = true;
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        if *self.inner.cancelled.read().unwrap() {
            return true;
        }
        self.inner.parent.as_ref().map(CancelToken::is_cancelled).unwrap_or(false)
    }

    /// Resolves once this token (or an ancestor) is cancelled. Returns
    /// immediately if already cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff parameters for [`retry`]. Distinguishes network-bound calls
/// (Generator, federation remotes) from local I/O (store, config) per the
/// two named retry budgets.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn network() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    pub fn local_io() -> Self {
        Self {
            base: Duration::from_millis(100),
            cap: Duration::from_secs(60),
            max_retries: 3,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.cap);
        let jitter_ms = rand::thread_rng().gen_range(0..=capped.as_millis().max(1) as u64 / 4);
        capped + Duration::from_millis(jitter_ms)
    }
}

/// Retries `op` under `policy` while its error is retryable and `token`
/// hasn't fired, sleeping with exponential backoff and jitter between
/// attempts. Gives up and returns the last error once `max_retries` is
/// exhausted, the error is non-retryable, or the token cancels first.
pub async fn retry<F, Fut, T>(policy: RetryPolicy, token: &CancelToken, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(Error::Transient("cancelled".to_string()));
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => return Err(Error::Transient("cancelled".to_string())),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-operation circuit breaker. Opens after
/// [`CONSECUTIVE_FAILURE_THRESHOLD`] consecutive failures; after
/// [`BREAKER_COOLDOWN`] it allows exactly one trial call through
/// (half-open) and closes again on success or re-opens on failure.
pub struct Breaker {
    operation: String,
    consecutive_failures: AtomicU32,
    state: StdRwLock<BreakerState>,
    opened_at: StdRwLock<Option<Instant>>,
    trial_in_flight: std::sync::atomic::AtomicBool,
}

impl Breaker {
    fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            consecutive_failures: AtomicU32::new(0),
            state: StdRwLock::new(BreakerState::Closed),
            opened_at: StdRwLock::new(None),
            trial_in_flight: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Checks whether a call should proceed, flipping Open to HalfOpen
    /// once the cooldown has elapsed and reserving the single trial slot.
    fn admit(&self) -> Result<bool> {
        let state = *self.state.read().unwrap();
        match state {
            BreakerState::Closed => Ok(false),
            BreakerState::HalfOpen => {
                if self
                    .trial_in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    Ok(true)
                } else {
                    Err(Error::CircuitOpen {
                        operation: self.operation.clone(),
                        retry_after_secs: BREAKER_COOLDOWN.as_secs(),
                    })
                }
            }
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .read()
                    .unwrap()
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= BREAKER_COOLDOWN {
                    *self.state.write().unwrap() = BreakerState::HalfOpen;
                    self.admit()
                } else {
                    Err(Error::CircuitOpen {
                        operation: self.operation.clone(),
                        retry_after_secs: (BREAKER_COOLDOWN - elapsed).as_secs(),
                    })
                }
            }
        }
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.trial_in_flight.store(false, Ordering::SeqCst);
        *self.state.write().unwrap() = BreakerState::Closed;
    }

    fn record_failure(&self) {
        self.trial_in_flight.store(false, Ordering::SeqCst);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= CONSECUTIVE_FAILURE_THRESHOLD || *self.state.read().unwrap() == BreakerState::HalfOpen {
            *self.state.write().unwrap() = BreakerState::Open;
            *self.opened_at.write().unwrap() = Some(Instant::now());
        }
    }

    /// Runs `op` if the breaker admits a call, recording success/failure
    /// against the consecutive-failure count.
    pub async fn call<F, Fut, T>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.admit()?;
        match op().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }
}

/// Registry of [`Breaker`]s keyed by operation name, one per
/// federation/generator call site so a single flaky remote doesn't trip
/// calls to every other one.
pub struct Breakers {
    breakers: StdRwLock<HashMap<String, Arc<Breaker>>>,
}

impl Breakers {
    pub fn new() -> Self {
        Self {
            breakers: StdRwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, operation: &str) -> Arc<Breaker> {
        if let Some(breaker) = self.breakers.read().unwrap().get(operation) {
            return breaker.clone();
        }
        let mut breakers = self.breakers.write().unwrap();
        breakers
            .entry(operation.to_string())
            .or_insert_with(|| Arc::new(Breaker::new(operation)))
            .clone()
    }
}

impl Default for Breakers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as StdAtomicU32;

    #[tokio::test]
    async fn test_cancel_token_propagates_to_children() {
        let parent = CancelToken::new();
        let child = parent.child_token();
        assert!(!child.is_cancelled());
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(50), token.cancelled())
            .await
            .expect("should resolve without waiting");
    }

    #[tokio::test]
    async fn test_retry_gives_up_on_non_retryable_error() {
        let calls = Arc::new(StdAtomicU32::new(0));
        let token = CancelToken::new();
        let result: Result<()> = retry(RetryPolicy::local_io(), &token, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::ValidationRejected("bad input".to_string()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = Arc::new(StdAtomicU32::new(0));
        let token = CancelToken::new();
        let policy = RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(10),
            max_retries: 3,
        };
        let result = retry(policy, &token, || {
            let calls = calls.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::Transient("flaky".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_breaker_opens_after_threshold_and_fast_fails() {
        let breaker = Breaker::new("remote-x");
        for _ in 0..CONSECUTIVE_FAILURE_THRESHOLD {
            let _ = breaker
                .call(|| async { Err::<(), Error>(Error::Transient("down".to_string())) })
                .await;
        }
        let err = breaker
            .call(|| async { Ok::<(), Error>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CircuitOpen { .. }));
    }

    #[test]
    fn test_breakers_registry_is_keyed_independently() {
        let registry = Breakers::new();
        let a = registry.get("remote-a");
        let b = registry.get("remote-b");
        a.record_failure();
        assert_eq!(a.consecutive_failures.load(Ordering::SeqCst), 1);
        assert_eq!(b.consecutive_failures.load(Ordering::SeqCst), 0);
    }
}
