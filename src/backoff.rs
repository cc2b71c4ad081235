//! Backoff strategies for the retry engine.
//!
//! A backoff maps the number of the attempt that just failed to the wait before the next one.
//! Attempt numbers are 1-based: `next_delay(1)` is the pause between the first and second
//! attempt. `0` is outside the contract and rejected with [`BackoffError::InvalidAttempt`].
//!
//! | strategy | delay for attempt `n` |
//! |---|---|
//! | [`Backoff::fixed`] | `d` |
//! | [`Backoff::linear`] | `initial + step * (n - 1)` |
//! | [`Backoff::exponential`] | `initial * multiplier^(n - 1)` |
//! | [`Backoff::random`] | uniform in `[min, max]` |
//! | [`Backoff::exponential_with_jitter`] | uniform in `[0, initial * multiplier^(n - 1)]` |
//!
//! Example
//! ```rust
//! use std::time::Duration;
//! use tenacious::Backoff;
//!
//! let backoff = Backoff::exponential(Duration::from_millis(100), 2.0).unwrap();
//! assert_eq!(backoff.next_delay(1).unwrap(), Duration::from_millis(100));
//! assert_eq!(backoff.next_delay(2).unwrap(), Duration::from_millis(200));
//! assert_eq!(backoff.next_delay(3).unwrap(), Duration::from_millis(400));
//! assert!(backoff.next_delay(0).is_err());
//! ```
//!
//! Overflow behavior: linear and exponential computations saturate to `MAX_BACKOFF` (1 day).

use crate::jitter::{self, Jitter};
use rand::{rng, Rng};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Maximum delay used when calculations overflow (1 day).
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors returned by backoff configuration and evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackoffError {
    /// Attempt numbers start at 1.
    #[error("attempt numbers start at 1 (got {0})")]
    InvalidAttempt(u32),
    /// A bounded-random range whose upper bound is below its lower bound.
    #[error("max delay ({max:?}) must be >= min delay ({min:?})")]
    InvalidRange { min: Duration, max: Duration },
    /// Exponential growth factors must be finite and non-negative.
    #[error("multiplier must be finite and non-negative (got {0})")]
    InvalidMultiplier(f64),
}

/// Trait implemented by all backoff strategies.
///
/// Implementations must be stateless from the caller's point of view: one strategy value is
/// shared by every execution of a policy, possibly concurrently.
pub trait BackoffStrategy: Send + Sync + fmt::Debug {
    fn next_delay(&self, attempt: u32) -> Result<Duration, BackoffError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FixedBackoff {
    delay: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinearBackoff {
    initial: Duration,
    step: Duration,
}

impl LinearBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        self.step
            .checked_mul(attempt - 1)
            .and_then(|growth| self.initial.checked_add(growth))
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
}

impl ExponentialBackoff {
    fn new(initial: Duration, multiplier: f64) -> Result<Self, BackoffError> {
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(BackoffError::InvalidMultiplier(multiplier));
        }
        Ok(Self { initial, multiplier })
    }

    fn delay(&self, attempt: u32) -> Duration {
        if self.initial.is_zero() {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let nanos = self.initial.as_nanos() as f64 * self.multiplier.powi(exponent);
        if !nanos.is_finite() || nanos >= MAX_BACKOFF.as_nanos() as f64 {
            return MAX_BACKOFF;
        }
        Duration::from_nanos(nanos as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RandomBackoff {
    min: Duration,
    max: Duration,
}

/// Closure-backed strategy; see [`Backoff::from_fn`].
struct FnBackoff<F>(F);

impl<F> fmt::Debug for FnBackoff<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnBackoff(<closure>)")
    }
}

impl<F> BackoffStrategy for FnBackoff<F>
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn next_delay(&self, attempt: u32) -> Result<Duration, BackoffError> {
        Ok((self.0)(attempt))
    }
}

#[derive(Debug, Clone)]
enum BackoffKind {
    Fixed(FixedBackoff),
    Linear(LinearBackoff),
    Exponential(ExponentialBackoff),
    Random(RandomBackoff),
    Custom(Arc<dyn BackoffStrategy>),
}

/// Backoff strategy handed to a retry policy.
///
/// Cheap to clone; custom strategies are shared behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Backoff {
    kind: BackoffKind,
    jitter: Jitter,
}

impl Backoff {
    fn from_kind(kind: BackoffKind) -> Self {
        Self { kind, jitter: Jitter::None }
    }

    /// Constant delay between every attempt.
    pub fn fixed(delay: Duration) -> Self {
        Self::from_kind(BackoffKind::Fixed(FixedBackoff { delay }))
    }

    /// `initial` after the first failure, growing by `step` for each later one.
    pub fn linear(initial: Duration, step: Duration) -> Self {
        Self::from_kind(BackoffKind::Linear(LinearBackoff { initial, step }))
    }

    /// `initial` after the first failure, multiplied by `multiplier` for each later one.
    ///
    /// Fails if `multiplier` is negative, NaN, or infinite.
    pub fn exponential(initial: Duration, multiplier: f64) -> Result<Self, BackoffError> {
        let exp = ExponentialBackoff::new(initial, multiplier)?;
        Ok(Self::from_kind(BackoffKind::Exponential(exp)))
    }

    /// Uniformly random delay in `[min, max]`, inclusive on both ends.
    ///
    /// Fails with [`BackoffError::InvalidRange`] if `max < min`. A zero-width range is valid and
    /// always yields `min`.
    pub fn random(min: Duration, max: Duration) -> Result<Self, BackoffError> {
        if max < min {
            return Err(BackoffError::InvalidRange { min, max });
        }
        Ok(Self::from_kind(BackoffKind::Random(RandomBackoff { min, max })))
    }

    /// Exponential backoff with full jitter: uniform in `[0, initial * multiplier^(n - 1)]`.
    pub fn exponential_with_jitter(
        initial: Duration,
        multiplier: f64,
    ) -> Result<Self, BackoffError> {
        Ok(Self::exponential(initial, multiplier)?.with_jitter(Jitter::Full))
    }

    /// Wrap a caller-defined strategy.
    pub fn custom<S>(strategy: S) -> Self
    where
        S: BackoffStrategy + 'static,
    {
        Self::from_kind(BackoffKind::Custom(Arc::new(strategy)))
    }

    /// Build a strategy from a plain function of the attempt number.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::custom(FnBackoff(f))
    }

    /// Randomize every delay produced by this strategy.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Jitter applied on top of the base delay.
    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Delay to wait after attempt number `attempt` (1-based) failed.
    pub fn next_delay(&self, attempt: u32) -> Result<Duration, BackoffError> {
        let mut rng = rng();
        self.next_delay_with_rng(attempt, &mut rng)
    }

    /// Same as [`Backoff::next_delay`] but drawing randomness from `rng` (for testing).
    pub fn next_delay_with_rng<R: Rng>(
        &self,
        attempt: u32,
        rng: &mut R,
    ) -> Result<Duration, BackoffError> {
        if attempt == 0 {
            return Err(BackoffError::InvalidAttempt(attempt));
        }
        let base = match &self.kind {
            BackoffKind::Fixed(fixed) => fixed.delay,
            BackoffKind::Linear(linear) => linear.delay(attempt),
            BackoffKind::Exponential(exp) => exp.delay(attempt),
            BackoffKind::Random(random) => jitter::uniform(random.min, random.max, rng),
            BackoffKind::Custom(strategy) => strategy.next_delay(attempt)?,
        };
        Ok(self.jitter.apply_with_rng(base, rng))
    }
}

impl Default for Backoff {
    /// No wait between attempts.
    fn default() -> Self {
        Self::fixed(Duration::ZERO)
    }
}

impl BackoffStrategy for Backoff {
    fn next_delay(&self, attempt: u32) -> Result<Duration, BackoffError> {
        Backoff::next_delay(self, attempt)
    }
}
