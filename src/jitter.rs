//! Jitter strategies to decorrelate concurrent retriers
//!
//! When to use which strategy:
//! - `None`: deterministic delays for tests or tightly controlled workflows.
//! - `Full`: uniform in `[0, delay]`, spreads load the most. This is what
//!   [`Backoff::exponential_with_jitter`](crate::Backoff::exponential_with_jitter) uses.
//! - `Equal`: uniform in `[delay/2, delay]`, keeps a floor while adding randomness.
//!
//! Notes:
//! - RNG: uses `rand`'s thread-local RNG by default; deterministic RNGs can be injected via
//!   `apply_with_rng`.
//! - Precision: sampling happens at nanosecond resolution; durations beyond `u64::MAX`
//!   nanoseconds saturate instead of panicking.
//!
//! Example:
//! ```rust
//! use tenacious::Jitter;
//! use std::time::Duration;
//!
//! let jittered = Jitter::full().apply(Duration::from_millis(100));
//! assert!(jittered <= Duration::from_millis(100));
//! ```

use rand::{rng, Rng};
use std::time::Duration;

/// Jitter strategy for randomizing backoff delays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Jitter {
    /// No jitter - use the exact backoff delay
    #[default]
    None,
    /// Full jitter: random between 0 and delay
    Full,
    /// Equal jitter: random between delay/2 and delay
    Equal,
}

impl Jitter {
    /// Create a full jitter strategy
    pub fn full() -> Self {
        Jitter::Full
    }

    /// Create an equal jitter strategy
    pub fn equal() -> Self {
        Jitter::Equal
    }

    /// Apply jitter to a delay duration
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rng();
        self.apply_with_rng(delay, &mut rng)
    }

    /// Apply jitter with a custom RNG (for testing)
    pub fn apply_with_rng<R: Rng>(&self, delay: Duration, rng: &mut R) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Full => uniform(Duration::ZERO, delay, rng),
            Jitter::Equal => uniform(delay / 2, delay, rng),
        }
    }
}

fn as_nanos_saturated(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}

/// Sample uniformly from the inclusive range `[low, high]`.
///
/// Degenerate ranges return `low` without touching the RNG. Callers guarantee `low <= high`.
pub(crate) fn uniform<R: Rng>(low: Duration, high: Duration, rng: &mut R) -> Duration {
    let low = as_nanos_saturated(low);
    let high = as_nanos_saturated(high);
    if high <= low {
        return Duration::from_nanos(low);
    }
    Duration::from_nanos(rng.random_range(low..=high))
}
