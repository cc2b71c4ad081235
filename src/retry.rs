//! Retry engine
//!
//! Runs a fallible operation under a [`RetryPolicy`] until it succeeds, exhausts its attempt
//! budget, or runs out of time.
//!
//! Semantics:
//! - `max_attempts` counts total attempts (initial try + retries) and is at least 1.
//! - The global timeout is checked before every attempt, the first included. Once it has
//!   elapsed the engine returns [`RetryError::DeadlineExceeded`], regardless of `retry_on`.
//! - Each attempt runs as its own tokio task so the per-attempt timeout holds even for
//!   operations that never yield. A timed-out attempt is aborted on a best-effort basis and
//!   abandoned; the engine never waits for it to stop.
//! - `retry_on` is the retryable set. Empty means every failure is retried; otherwise a
//!   failure (timeouts and panics included) is retried only if some entry matches it.
//! - Backoff is consulted once per retry with the number of the attempt that just failed.
//! - On exhaustion the *last* failure is returned, normalized into [`RetryError`].
//!
//! Invariants:
//! - Attempts never exceed `max_attempts`, and at most one attempt is in flight per execution.
//! - Every spawned attempt is aborted when `execute` returns or its future is dropped.
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use tenacious::{Backoff, RetryError, RetryOn, RetryPolicy};
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("oops")]
//! struct MyErr;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<MyErr>::builder()
//!     .max_attempts(3) // total attempts
//!     .backoff(Backoff::exponential(Duration::from_millis(10), 2.0).unwrap())
//!     .retry_on(RetryOn::any_error())
//!     .with_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//! let result: Result<(), RetryError<MyErr>> = policy.execute(|| async { Err(MyErr) }).await;
//! assert!(result.unwrap_err().is_operation());
//! # });
//! ```

use crate::error::{AttemptFailure, RetryError, RetryOn};
use crate::{Backoff, Sleeper, TokioSleeper};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Immutable retry configuration; build one with [`RetryPolicy::builder`].
///
/// Cloning is cheap and a policy can be shared by any number of concurrent executions.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    backoff: Backoff,
    retry_on: Arc<[RetryOn<E>]>,
    global_timeout: Option<Duration>,
    per_attempt_timeout: Option<Duration>,
    sleeper: Arc<dyn Sleeper>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            backoff: self.backoff.clone(),
            retry_on: Arc::clone(&self.retry_on),
            global_timeout: self.global_timeout,
            per_attempt_timeout: self.per_attempt_timeout,
            sleeper: Arc::clone(&self.sleeper),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("retry_on", &self.retry_on)
            .field("global_timeout", &self.global_timeout)
            .field("per_attempt_timeout", &self.per_attempt_timeout)
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

/// Where one execution currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Pending,
    Attempting,
    BackingOff,
    Succeeded,
    Failed,
    TimedOut,
}

impl Phase {
    fn is_terminal(self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed | Phase::TimedOut)
    }
}

/// Per-execution bookkeeping. Lives for one `execute` call and is never shared.
#[derive(Debug)]
struct ExecutionState<E> {
    started: Instant,
    attempt: u32,
    last_failure: Option<AttemptFailure<E>>,
    phase: Phase,
}

impl<E> ExecutionState<E> {
    fn new() -> Self {
        Self { started: Instant::now(), attempt: 0, last_failure: None, phase: Phase::Pending }
    }

    fn transition(&mut self, next: Phase) {
        debug_assert!(!self.phase.is_terminal(), "left terminal phase {:?}", self.phase);
        tracing::trace!(attempt = self.attempt, from = ?self.phase, to = ?next, "retry phase");
        self.phase = next;
    }
}

/// Aborts the attempt task when dropped, so every exit path releases it.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn join_failure<E>(err: JoinError, attempt: u32) -> AttemptFailure<E> {
    match err.try_into_panic() {
        Ok(payload) => AttemptFailure::Panicked { attempt, message: panic_message(&*payload) },
        // Aborted from outside, e.g. runtime shutdown.
        Err(_) => AttemptFailure::Cancelled { attempt },
    }
}

impl<E> RetryPolicy<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Construct a new builder with defaults.
    pub fn builder() -> RetryPolicyBuilder<E> {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn retry_on(&self) -> &[RetryOn<E>] {
        &self.retry_on
    }

    pub fn global_timeout(&self) -> Option<Duration> {
        self.global_timeout
    }

    pub fn per_attempt_timeout(&self) -> Option<Duration> {
        self.per_attempt_timeout
    }

    /// Execute an async operation with retry semantics.
    ///
    /// Each call of `operation` produces one attempt, spawned onto the current tokio runtime.
    /// Side-effecting operations simply return `Ok(())`.
    pub async fn execute<T, Fut, Op>(&self, mut operation: Op) -> Result<T, RetryError<E>>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        Op: FnMut() -> Fut + Send,
    {
        self.run(move || tokio::spawn(operation()), None).await
    }

    /// Like [`execute`](Self::execute), additionally observing the caller's `cancel` token.
    ///
    /// Cancellation while an attempt or backoff is pending is recorded as the attempt's failure
    /// and goes through `retry_on` like any other failure, but no new attempt or wait is
    /// started once the token has fired. The token is never reset, so the caller still sees it
    /// cancelled after this returns.
    pub async fn execute_with_cancel<T, Fut, Op>(
        &self,
        mut operation: Op,
        cancel: &CancellationToken,
    ) -> Result<T, RetryError<E>>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        Op: FnMut() -> Fut + Send,
    {
        self.run(move || tokio::spawn(operation()), Some(cancel)).await
    }

    /// Execute a synchronous operation, running each attempt on tokio's blocking pool.
    ///
    /// Blocking attempts cannot be interrupted: a timed-out attempt keeps running in the
    /// background until it returns, and its result is discarded. The operation may therefore run
    /// concurrently with its own retry, hence `Fn + Sync`.
    pub async fn execute_blocking<T, Op>(&self, operation: Op) -> Result<T, RetryError<E>>
    where
        T: Send + 'static,
        Op: Fn() -> Result<T, E> + Send + Sync + 'static,
    {
        let operation = Arc::new(operation);
        self.run(
            move || {
                let operation = Arc::clone(&operation);
                tokio::task::spawn_blocking(move || (*operation)())
            },
            None,
        )
        .await
    }

    async fn run<T, L>(
        &self,
        mut launch: L,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, RetryError<E>>
    where
        T: Send + 'static,
        L: FnMut() -> JoinHandle<Result<T, E>> + Send,
    {
        let mut state = ExecutionState::new();

        while state.attempt < self.max_attempts {
            state.attempt += 1;
            let attempt = state.attempt;

            if let Some(deadline) = self.global_timeout {
                let elapsed = state.started.elapsed();
                if elapsed > deadline {
                    state.transition(Phase::TimedOut);
                    tracing::warn!(
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        deadline_ms = deadline.as_millis() as u64,
                        "retry deadline exceeded"
                    );
                    return Err(RetryError::DeadlineExceeded {
                        attempts: attempt - 1,
                        elapsed,
                        deadline,
                    });
                }
            }

            state.transition(Phase::Attempting);
            let failure = match cancel {
                // Never launch once the caller has cancelled.
                Some(token) if token.is_cancelled() => AttemptFailure::Cancelled { attempt },
                _ => match self.attempt(launch(), attempt, cancel).await {
                    Ok(value) => {
                        state.transition(Phase::Succeeded);
                        if attempt > 1 {
                            tracing::debug!(attempt, "retry succeeded");
                        }
                        return Ok(value);
                    }
                    Err(failure) => failure,
                },
            };

            let retry = self.should_retry(&failure, attempt);
            if !retry {
                tracing::debug!(attempt, error = %failure, "not retrying");
                state.last_failure = Some(failure);
                break;
            }

            let delay = self.backoff.next_delay(attempt)?;
            tracing::debug!(
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "attempt failed, backing off"
            );
            state.last_failure = Some(failure);
            state.transition(Phase::BackingOff);

            if !self.backoff_wait(delay, cancel).await {
                tracing::debug!(attempt, "cancelled during backoff");
                state.last_failure = Some(AttemptFailure::Cancelled { attempt });
                break;
            }
        }

        state.transition(Phase::Failed);
        let attempts = state.attempt;
        match state.last_failure {
            Some(failure) => {
                tracing::warn!(attempts, error = %failure, "retry gave up");
                Err(failure.into_retry_error(attempts))
            }
            // Only reachable with a zero attempt budget, which `build` rejects.
            None => Err(RetryError::InvalidPolicy(BuildError::InvalidMaxAttempts(
                self.max_attempts,
            ))),
        }
    }

    /// Wait for one launched attempt, bounded by the per-attempt timeout and `cancel`.
    async fn attempt<T>(
        &self,
        handle: JoinHandle<Result<T, E>>,
        attempt: u32,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, AttemptFailure<E>> {
        let mut task = AbortOnDrop(handle);
        let started = Instant::now();
        let limit = self.per_attempt_timeout;

        let bounded = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, &mut task.0).await.map_err(|_| limit),
                None => Ok((&mut task.0).await),
            }
        };

        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(AttemptFailure::Cancelled { attempt }),
                outcome = bounded => outcome,
            },
            None => bounded.await,
        };

        match outcome {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(AttemptFailure::Operation(e)),
            Ok(Err(join_err)) => Err(join_failure(join_err, attempt)),
            Err(timeout) => {
                tracing::debug!(attempt, timeout_ms = timeout.as_millis() as u64, "attempt timed out");
                Err(AttemptFailure::Timeout { attempt, elapsed: started.elapsed(), timeout })
            }
        }
    }

    /// Sleep between attempts. Returns `false` if `cancel` fired first.
    ///
    /// A zero delay skips the sleeper entirely; a zero-length timer still costs a tick.
    async fn backoff_wait(&self, delay: Duration, cancel: Option<&CancellationToken>) -> bool {
        match cancel {
            Some(token) if token.is_cancelled() => false,
            _ if delay.is_zero() => true,
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => false,
                _ = self.sleeper.sleep(delay) => true,
            },
            None => {
                self.sleeper.sleep(delay).await;
                true
            }
        }
    }

    fn should_retry(&self, failure: &AttemptFailure<E>, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }
        self.retry_on.is_empty() || self.retry_on.iter().any(|kind| kind.matches(failure))
    }
}

/// Builder for `RetryPolicy`.
///
/// Every setter overrides the previous value except [`retry_on`](Self::retry_on), which adds to
/// the retryable set.
pub struct RetryPolicyBuilder<E> {
    max_attempts: u32,
    backoff: Backoff,
    retry_on: Vec<RetryOn<E>>,
    global_timeout: Option<Duration>,
    per_attempt_timeout: Option<Duration>,
    sleeper: Arc<dyn Sleeper>,
}

/// Errors produced while building a retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// `max_attempts` must be > 0.
    #[error("max_attempts must be > 0 (got {0})")]
    InvalidMaxAttempts(u32),
    /// A zero per-attempt timeout would fail every attempt.
    #[error("per-attempt timeout must be greater than zero")]
    ZeroAttemptTimeout,
}

impl<E> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create a builder with defaults: one attempt, no delay, retry on anything, no timeouts.
    pub fn new() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::default(),
            retry_on: Vec::new(),
            global_timeout: None,
            per_attempt_timeout: None,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Set total attempts (initial + retries). Must be > 0.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set backoff strategy.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Add a failure kind to the retryable set.
    pub fn retry_on(mut self, kind: RetryOn<E>) -> Self {
        self.retry_on.push(kind);
        self
    }

    /// Shorthand for `retry_on(RetryOn::error(predicate))`.
    pub fn retry_if<F>(self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_on(RetryOn::error(predicate))
    }

    /// Budget for the whole execution, checked before each attempt. A running attempt or
    /// backoff wait is not cut short; pair with a per-attempt timeout to bound hangs.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.global_timeout = Some(timeout);
        self
    }

    /// Budget for each individual attempt.
    pub fn with_per_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.per_attempt_timeout = Some(timeout);
        self
    }

    /// Provide a custom sleeper implementation.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Build the retry policy, validating inputs.
    pub fn build(self) -> Result<RetryPolicy<E>, BuildError> {
        if self.max_attempts == 0 {
            return Err(BuildError::InvalidMaxAttempts(0));
        }
        if self.per_attempt_timeout == Some(Duration::ZERO) {
            return Err(BuildError::ZeroAttemptTimeout);
        }
        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: self.backoff,
            retry_on: self.retry_on.into(),
            global_timeout: self.global_timeout,
            per_attempt_timeout: self.per_attempt_timeout,
            sleeper: self.sleeper,
        })
    }

    /// Build the policy and run `operation` under it.
    ///
    /// An invalid configuration is reported as [`RetryError::InvalidPolicy`] without invoking
    /// the operation.
    pub async fn execute<T, Fut, Op>(self, operation: Op) -> Result<T, RetryError<E>>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        Op: FnMut() -> Fut + Send,
    {
        self.build()?.execute(operation).await
    }
}

impl<E> Default for RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
