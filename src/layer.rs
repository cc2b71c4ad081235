//! Tower integration: run every call of a wrapped service through a [`RetryPolicy`].
//!
//! The request is cloned for each attempt and each attempt drives its own clone of the inner
//! service, so requests and services must be `Clone`.
//!
//! ```rust
//! use std::time::Duration;
//! use tenacious::{RetryLayer, RetryPolicy};
//! use tower::{service_fn, ServiceBuilder, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let policy = RetryPolicy::<std::io::Error>::builder()
//!     .max_attempts(3)
//!     .with_per_attempt_timeout(Duration::from_secs(1))
//!     .build()
//!     .unwrap();
//! let svc = ServiceBuilder::new()
//!     .layer(RetryLayer::new(policy))
//!     .service(service_fn(|name: &'static str| async move {
//!         Ok::<_, std::io::Error>(format!("hello {name}"))
//!     }));
//! assert_eq!(svc.oneshot("world").await.unwrap(), "hello world");
//! # });
//! ```

use crate::{RetryError, RetryPolicy};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::ServiceExt;
use tower_layer::Layer;
use tower_service::Service;

/// Tower-native retry layer.
pub struct RetryLayer<E> {
    policy: RetryPolicy<E>,
}

impl<E> RetryLayer<E> {
    pub fn new(policy: RetryPolicy<E>) -> Self {
        Self { policy }
    }
}

impl<E> Clone for RetryLayer<E> {
    fn clone(&self) -> Self {
        Self { policy: self.policy.clone() }
    }
}

impl<E> std::fmt::Debug for RetryLayer<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryLayer").field("policy", &self.policy).finish()
    }
}

impl<E> RetryPolicy<E> {
    /// Wrap this policy in a [`RetryLayer`].
    pub fn into_layer(self) -> RetryLayer<E> {
        RetryLayer::new(self)
    }
}

impl<S, E> Layer<S> for RetryLayer<E> {
    type Service = RetryService<S, E>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService { inner, policy: self.policy.clone() }
    }
}

/// Retry service produced by `RetryLayer`.
pub struct RetryService<S, E> {
    inner: S,
    policy: RetryPolicy<E>,
}

impl<S: Clone, E> Clone for RetryService<S, E> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), policy: self.policy.clone() }
    }
}

impl<S, E, Request> Service<Request> for RetryService<S, E>
where
    Request: Clone + Send + 'static,
    S: Service<Request, Error = E> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Future: Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    type Response = S::Response;
    type Error = RetryError<E>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(RetryError::Operation)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let policy = self.policy.clone();
        let inner = self.inner.clone();
        Box::pin(async move {
            policy
                .execute(move || {
                    let svc = inner.clone();
                    let req = req.clone();
                    async move { svc.oneshot(req).await }
                })
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InstantSleeper, RetryOn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceBuilder;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("flaky: {0}")]
    struct Flaky(usize);

    /// Fails the first `failures` calls, then doubles its input.
    #[derive(Clone)]
    struct FlakyService {
        failures: usize,
        calls: Arc<AtomicUsize>,
    }

    impl FlakyService {
        fn new(failures: usize) -> Self {
            Self { failures, calls: Arc::new(AtomicUsize::new(0)) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Service<u32> for FlakyService {
        type Response = u32;
        type Error = Flaky;
        type Future = futures::future::Ready<Result<u32, Flaky>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: u32) -> Self::Future {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                futures::future::ready(Err(Flaky(n)))
            } else {
                futures::future::ready(Ok(req * 2))
            }
        }
    }

    #[tokio::test]
    async fn layer_retries_failing_service() {
        let policy = RetryPolicy::<Flaky>::builder()
            .max_attempts(3)
            .with_sleeper(InstantSleeper)
            .build()
            .expect("builder");

        let inner = FlakyService::new(2);
        let svc = ServiceBuilder::new().layer(policy.into_layer()).service(inner.clone());

        assert_eq!(svc.oneshot(21).await.unwrap(), 42);
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn layer_surfaces_last_failure_when_exhausted() {
        let policy = RetryPolicy::<Flaky>::builder()
            .max_attempts(2)
            .with_sleeper(InstantSleeper)
            .build()
            .expect("builder");

        let inner = FlakyService::new(10);
        let svc = RetryLayer::new(policy).layer(inner.clone());

        let err = svc.oneshot(1).await.unwrap_err();
        assert_eq!(err.into_operation(), Some(Flaky(2)));
        assert_eq!(inner.calls(), 2);
    }

    #[tokio::test]
    async fn layer_respects_retry_filter() {
        let policy = RetryPolicy::<Flaky>::builder()
            .max_attempts(5)
            .retry_on(RetryOn::error(|e: &Flaky| e.0 > 1))
            .with_per_attempt_timeout(Duration::from_secs(1))
            .with_sleeper(InstantSleeper)
            .build()
            .expect("builder");

        let inner = FlakyService::new(10);
        let svc = RetryLayer::new(policy).layer(inner.clone());

        assert!(svc.oneshot(1).await.unwrap_err().is_operation());
        assert_eq!(inner.calls(), 1, "first failure is not retryable");
    }
}
