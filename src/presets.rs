//! Ready-made retry policies.
//!
//! Each preset returns a [`RetryPolicyBuilder`], so any setting can still be adjusted before
//! calling `build()`. Every number used here is a named constant of this module.
//!
//! ```rust
//! use std::time::Duration;
//! use tenacious::presets;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = presets::network_call::<std::io::Error>()
//!     .with_timeout(Duration::from_secs(10))
//!     .build()
//!     .unwrap();
//!
//! let body = policy.execute(|| async { Ok::<_, std::io::Error>("pong") }).await;
//! assert_eq!(body.unwrap(), "pong");
//! # });
//! ```
//!
//! ## Available Presets
//!
//! - [`network_call`]: remote calls (few attempts, jittered exponential backoff, timeouts retried)
//! - [`contended_resource`]: locks and optimistic concurrency (many quick, randomized retries)
//! - [`background_job`]: work nobody is waiting on (slow exponential backoff, long deadline)

use crate::{Backoff, Jitter, RetryOn, RetryPolicy, RetryPolicyBuilder};
use std::time::Duration;

pub const DEFAULT_RETRY_ATTEMPTS_NETWORK: u32 = 3;
pub const DEFAULT_BACKOFF_MILLIS_NETWORK: u64 = 100;
pub const DEFAULT_MULTIPLIER_NETWORK: f64 = 2.0;
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS_NETWORK: u64 = 5;
pub const DEFAULT_TIMEOUT_SECS_NETWORK: u64 = 30;

pub const DEFAULT_RETRY_ATTEMPTS_CONTENDED: u32 = 10;
pub const DEFAULT_MIN_BACKOFF_MILLIS_CONTENDED: u64 = 10;
pub const DEFAULT_MAX_BACKOFF_MILLIS_CONTENDED: u64 = 100;
pub const DEFAULT_TIMEOUT_SECS_CONTENDED: u64 = 5;

pub const DEFAULT_RETRY_ATTEMPTS_BACKGROUND: u32 = 8;
pub const DEFAULT_BACKOFF_SECS_BACKGROUND: u64 = 1;
pub const DEFAULT_MULTIPLIER_BACKGROUND: f64 = 2.0;
pub const DEFAULT_TIMEOUT_SECS_BACKGROUND: u64 = 10 * 60;

/// Remote call policy.
///
/// - **Attempts:** 3
/// - **Backoff:** exponential from 100ms, doubling, full jitter
/// - **Retries:** any operation error, plus per-attempt timeouts
/// - **Timeouts:** 5s per attempt, 30s overall
///
/// Panics and cancellations are not retried.
pub fn network_call<E>() -> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let backoff = Backoff::exponential_with_jitter(
        Duration::from_millis(DEFAULT_BACKOFF_MILLIS_NETWORK),
        DEFAULT_MULTIPLIER_NETWORK,
    )
    .expect("valid network backoff");

    RetryPolicy::builder()
        .max_attempts(DEFAULT_RETRY_ATTEMPTS_NETWORK)
        .backoff(backoff)
        .retry_on(RetryOn::any_error())
        .retry_on(RetryOn::Timeout)
        .with_per_attempt_timeout(Duration::from_secs(DEFAULT_ATTEMPT_TIMEOUT_SECS_NETWORK))
        .with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS_NETWORK))
}

/// Contended resource policy (lock acquisition, compare-and-swap loops).
///
/// - **Attempts:** 10
/// - **Backoff:** uniformly random in 10..=100ms so competing callers spread out
/// - **Retries:** every failure
/// - **Timeouts:** 5s overall, none per attempt
pub fn contended_resource<E>() -> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let backoff = Backoff::random(
        Duration::from_millis(DEFAULT_MIN_BACKOFF_MILLIS_CONTENDED),
        Duration::from_millis(DEFAULT_MAX_BACKOFF_MILLIS_CONTENDED),
    )
    .expect("valid contended backoff");

    RetryPolicy::builder()
        .max_attempts(DEFAULT_RETRY_ATTEMPTS_CONTENDED)
        .backoff(backoff)
        .with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS_CONTENDED))
}

/// Background job policy.
///
/// - **Attempts:** 8
/// - **Backoff:** exponential from 1s, doubling, equal jitter
/// - **Retries:** every failure
/// - **Timeouts:** 10 minutes overall, none per attempt
pub fn background_job<E>() -> RetryPolicyBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let backoff = Backoff::exponential(
        Duration::from_secs(DEFAULT_BACKOFF_SECS_BACKGROUND),
        DEFAULT_MULTIPLIER_BACKGROUND,
    )
    .expect("valid background backoff")
    .with_jitter(Jitter::Equal);

    RetryPolicy::builder()
        .max_attempts(DEFAULT_RETRY_ATTEMPTS_BACKGROUND)
        .backoff(backoff)
        .with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS_BACKGROUND))
}
