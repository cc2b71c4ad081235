//! Convenient re-exports for common retry types.
pub use crate::{
    backoff::{Backoff, BackoffError, BackoffStrategy, MAX_BACKOFF},
    error::{AttemptFailure, Classify, RetryError, RetryOn},
    jitter::Jitter,
    layer::{RetryLayer, RetryService},
    presets,
    retry::{BuildError, RetryPolicy, RetryPolicyBuilder},
    sleeper::{Sleeper, TokioSleeper},
    CancellationToken,
};
