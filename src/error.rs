//! Failure types for the retry engine
//!
//! Three layers:
//! - [`AttemptFailure`]: why one attempt produced no value.
//! - [`RetryOn`]: an entry of a policy's retryable set, matched against attempt failures.
//! - [`RetryError`]: the terminal error returned by `execute` once the loop gives up.
use crate::backoff::BackoffError;
use crate::retry::BuildError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a single attempt that did not produce a value.
#[derive(Debug, Clone)]
pub enum AttemptFailure<E> {
    /// The operation returned an error.
    Operation(E),
    /// The per-attempt timeout elapsed first. The attempt was abandoned, not joined.
    Timeout { attempt: u32, elapsed: Duration, timeout: Duration },
    /// The caller's cancellation token fired while the attempt was pending.
    Cancelled { attempt: u32 },
    /// The operation panicked.
    Panicked { attempt: u32, message: String },
}

impl<E> AttemptFailure<E> {
    /// Borrow the operation error, if the attempt failed with one.
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Normalize into the terminal error reported after `attempts` attempts.
    pub(crate) fn into_retry_error(self, attempts: u32) -> RetryError<E> {
        match self {
            Self::Operation(e) => RetryError::Operation(e),
            Self::Timeout { elapsed, timeout, .. } => {
                RetryError::AttemptTimeout { attempts, elapsed, timeout }
            }
            Self::Cancelled { .. } => RetryError::Cancelled { attempts },
            Self::Panicked { message, .. } => RetryError::Panicked { attempts, message },
        }
    }
}

impl<E: fmt::Display> fmt::Display for AttemptFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(e) => write!(f, "{}", e),
            Self::Timeout { attempt, elapsed, timeout } => {
                write!(f, "attempt {} timed out after {:?} (limit: {:?})", attempt, elapsed, timeout)
            }
            Self::Cancelled { attempt } => write!(f, "attempt {} cancelled", attempt),
            Self::Panicked { attempt, message } => {
                write!(f, "attempt {} panicked: {}", attempt, message)
            }
        }
    }
}

/// Errors that can be sorted into comparable kinds, so policies can retry by kind.
///
/// ```rust
/// use std::io;
/// use tenacious::{RetryOn, RetryPolicy};
///
/// let policy = RetryPolicy::<io::Error>::builder()
///     .max_attempts(3)
///     .retry_on(RetryOn::kind(io::ErrorKind::ConnectionReset))
///     .retry_on(RetryOn::Timeout)
///     .build()
///     .unwrap();
/// # let _ = policy;
/// ```
pub trait Classify {
    type Kind: PartialEq + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

impl Classify for std::io::Error {
    type Kind = std::io::ErrorKind;

    fn kind(&self) -> std::io::ErrorKind {
        std::io::Error::kind(self)
    }
}

/// One entry of a policy's retryable set.
///
/// An empty set retries every failure. A non-empty set retries a failure only if some entry
/// matches it; timeouts, cancellations, and panics must be opted into explicitly.
pub enum RetryOn<E> {
    /// Operation errors accepted by the predicate.
    Error(Arc<dyn Fn(&E) -> bool + Send + Sync>),
    /// Per-attempt timeouts.
    Timeout,
    /// Cancellation observed while waiting on an attempt.
    Cancelled,
    /// Panicking operations.
    Panic,
}

impl<E> RetryOn<E> {
    /// Operation errors for which `predicate` returns true.
    pub fn error<F>(predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        RetryOn::Error(Arc::new(predicate))
    }

    /// Every operation error, but none of the engine-generated failures.
    pub fn any_error() -> Self
    where
        E: 'static,
    {
        Self::error(|_| true)
    }

    /// Operation errors whose [`Classify::kind`] equals `kind`.
    pub fn kind(kind: E::Kind) -> Self
    where
        E: Classify + 'static,
    {
        Self::error(move |e: &E| e.kind() == kind)
    }

    /// Whether this entry covers `failure`.
    pub fn matches(&self, failure: &AttemptFailure<E>) -> bool {
        match (self, failure) {
            (RetryOn::Error(predicate), AttemptFailure::Operation(e)) => predicate(e),
            (RetryOn::Timeout, AttemptFailure::Timeout { .. }) => true,
            (RetryOn::Cancelled, AttemptFailure::Cancelled { .. }) => true,
            (RetryOn::Panic, AttemptFailure::Panicked { .. }) => true,
            _ => false,
        }
    }
}

impl<E> Clone for RetryOn<E> {
    fn clone(&self) -> Self {
        match self {
            RetryOn::Error(predicate) => RetryOn::Error(Arc::clone(predicate)),
            RetryOn::Timeout => RetryOn::Timeout,
            RetryOn::Cancelled => RetryOn::Cancelled,
            RetryOn::Panic => RetryOn::Panic,
        }
    }
}

impl<E> fmt::Debug for RetryOn<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryOn::Error(_) => f.write_str("Error(<predicate>)"),
            RetryOn::Timeout => f.write_str("Timeout"),
            RetryOn::Cancelled => f.write_str("Cancelled"),
            RetryOn::Panic => f.write_str("Panic"),
        }
    }
}

/// Terminal error of a retried execution.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The last attempt failed with this operation error.
    #[error(transparent)]
    Operation(E),
    /// The last attempt exceeded the per-attempt timeout.
    #[error("attempt {attempts} timed out after {elapsed:?} (limit: {timeout:?})")]
    AttemptTimeout { attempts: u32, elapsed: Duration, timeout: Duration },
    /// The global timeout expired before the next attempt could start. Never retried.
    #[error("global timeout of {deadline:?} exceeded after {elapsed:?} ({attempts} attempts made)")]
    DeadlineExceeded { attempts: u32, elapsed: Duration, deadline: Duration },
    /// The caller's cancellation token fired; the token is left cancelled.
    #[error("retry cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
    /// The last attempt panicked.
    #[error("attempt {attempts} panicked: {message}")]
    Panicked { attempts: u32, message: String },
    /// The backoff strategy refused to produce a delay.
    #[error("backoff failed: {0}")]
    Backoff(#[from] BackoffError),
    /// The policy was invalid, so no attempt was possible.
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(#[from] BuildError),
}

impl<E> RetryError<E> {
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    pub fn is_attempt_timeout(&self) -> bool {
        matches!(self, Self::AttemptTimeout { .. })
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked { .. })
    }

    /// Get the operation error if this is an `Operation` variant
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the operation error if present.
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Attempts made before giving up, where the variant records it.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::AttemptTimeout { attempts, .. }
            | Self::DeadlineExceeded { attempts, .. }
            | Self::Cancelled { attempts }
            | Self::Panicked { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("{0}")]
    struct DummyError(&'static str);

    #[test]
    fn operation_error_is_transparent() {
        let err = RetryError::Operation(DummyError("persistent failure"));
        assert_eq!(err.to_string(), "persistent failure");
        assert!(err.is_operation());
        assert_eq!(err.into_operation(), Some(DummyError("persistent failure")));
    }

    #[test]
    fn deadline_display_mentions_budget() {
        let err: RetryError<DummyError> = RetryError::DeadlineExceeded {
            attempts: 4,
            elapsed: Duration::from_millis(210),
            deadline: Duration::from_millis(200),
        };
        let msg = err.to_string();
        assert!(msg.contains("global timeout"));
        assert!(msg.contains("200ms"));
        assert!(err.is_deadline_exceeded());
        assert_eq!(err.attempts(), Some(4));
        assert!(err.source().is_none());
    }

    #[test]
    fn invalid_policy_has_build_error_source() {
        let err: RetryError<DummyError> = BuildError::InvalidMaxAttempts(0).into();
        assert!(err.to_string().contains("max_attempts"));
        assert!(err.source().is_some());
        assert_eq!(err.attempts(), None);
    }

    #[test]
    fn attempt_failure_normalizes_to_terminal_error() {
        let timeout: AttemptFailure<DummyError> = AttemptFailure::Timeout {
            attempt: 2,
            elapsed: Duration::from_millis(101),
            timeout: Duration::from_millis(100),
        };
        assert!(timeout.is_timeout());
        let err = timeout.into_retry_error(2);
        assert!(err.is_attempt_timeout());
        assert_eq!(err.attempts(), Some(2));

        let panicked: AttemptFailure<DummyError> =
            AttemptFailure::Panicked { attempt: 1, message: "boom".into() };
        assert!(panicked.to_string().contains("boom"));
        assert!(panicked.into_retry_error(1).is_panic());

        let cancelled: AttemptFailure<DummyError> = AttemptFailure::Cancelled { attempt: 3 };
        assert!(cancelled.is_cancelled());
        assert!(cancelled.into_retry_error(3).is_cancelled());
    }

    #[test]
    fn retry_on_matches_only_its_kind() {
        let timeout: AttemptFailure<DummyError> = AttemptFailure::Timeout {
            attempt: 1,
            elapsed: Duration::from_millis(1),
            timeout: Duration::from_millis(1),
        };
        let op = AttemptFailure::Operation(DummyError("io"));

        assert!(RetryOn::<DummyError>::Timeout.matches(&timeout));
        assert!(!RetryOn::<DummyError>::Timeout.matches(&op));
        assert!(RetryOn::<DummyError>::any_error().matches(&op));
        assert!(!RetryOn::<DummyError>::any_error().matches(&timeout));

        let only_io = RetryOn::error(|e: &DummyError| e.0 == "io");
        assert!(only_io.matches(&op));
        assert!(!only_io.matches(&AttemptFailure::Operation(DummyError("db"))));
        assert!(only_io.clone().matches(&op));
    }

    #[test]
    fn retry_on_kind_uses_classify() {
        let reset = RetryOn::<io::Error>::kind(io::ErrorKind::ConnectionReset);
        let failure = AttemptFailure::Operation(io::Error::new(io::ErrorKind::ConnectionReset, "x"));
        assert!(reset.matches(&failure));

        let denied = AttemptFailure::Operation(io::Error::new(io::ErrorKind::PermissionDenied, "x"));
        assert!(!reset.matches(&denied));
        assert_eq!(format!("{:?}", reset), "Error(<predicate>)");
    }
}
