#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # tenacious
//!
//! A retry execution engine for async Rust: run a fallible operation under a policy until it
//! succeeds, exhausts its attempt budget, or runs out of time.
//!
//! ## Features
//!
//! - **Attempt budget** counting the initial try and every retry
//! - **Backoff strategies**: fixed, linear, exponential, bounded random, exponential with jitter,
//!   or your own
//! - **Per-attempt timeouts** enforced on a spawned task, even for operations that never yield
//! - **Global deadline** checked before each attempt
//! - **Retry filters** by error predicate, error kind, timeout, cancellation, or panic
//! - **Cancellation** through `tokio_util`'s `CancellationToken`
//! - **Tower layer** for wrapping any `Service`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::time::Duration;
//! use tenacious::{Backoff, RetryOn, RetryPolicy};
//!
//! #[tokio::main]
//! async fn main() {
//!     let policy = RetryPolicy::<std::io::Error>::builder()
//!         .max_attempts(3)
//!         .backoff(Backoff::exponential_with_jitter(Duration::from_millis(10), 2.0).unwrap())
//!         .retry_on(RetryOn::kind(std::io::ErrorKind::ConnectionReset))
//!         .retry_on(RetryOn::Timeout)
//!         .with_per_attempt_timeout(Duration::from_secs(1))
//!         .with_timeout(Duration::from_secs(5))
//!         .build()
//!         .unwrap();
//!
//!     let answer = policy.execute(|| async { Ok::<_, std::io::Error>(42) }).await;
//!     assert_eq!(answer.unwrap(), 42);
//! }
//! ```

pub mod backoff;
pub mod error;
pub mod jitter;
pub mod layer;
pub mod prelude;
pub mod presets;
pub mod retry;
pub mod sleeper;

// Re-exports
pub use backoff::{Backoff, BackoffError, BackoffStrategy, MAX_BACKOFF};
pub use error::{AttemptFailure, Classify, RetryError, RetryOn};
pub use jitter::Jitter;
pub use layer::{RetryLayer, RetryService};
pub use retry::{BuildError, RetryPolicy, RetryPolicyBuilder};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use tokio_util::sync::CancellationToken;
