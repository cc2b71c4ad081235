use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::Ready;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenacious::{Backoff, InstantSleeper, RetryLayer, RetryPolicy};
use tower::{Service, ServiceBuilder};

// Succeeds on every call.
#[derive(Clone)]
struct EchoService;

impl Service<&'static str> for EchoService {
    type Response = &'static str;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: &'static str) -> Self::Future {
        futures::future::ready(Ok(req))
    }
}

// Fails on every call.
#[derive(Clone)]
struct FailingService {
    calls: Arc<AtomicUsize>,
}

impl Service<&'static str> for FailingService {
    type Response = &'static str;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: &'static str) -> Self::Future {
        self.calls.fetch_add(1, Ordering::Relaxed);
        futures::future::ready(Err(std::io::Error::new(std::io::ErrorKind::Other, "boom")))
    }
}

fn backoff_next_delay(c: &mut Criterion) {
    let exponential = Backoff::exponential(Duration::from_millis(100), 2.0).unwrap();
    let jittered = Backoff::exponential_with_jitter(Duration::from_millis(100), 2.0).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    c.bench_function("backoff_exponential_next_delay", |b| {
        b.iter(|| exponential.next_delay(black_box(12)).unwrap());
    });
    c.bench_function("backoff_exponential_jitter_next_delay", |b| {
        b.iter(|| jittered.next_delay_with_rng(black_box(12), &mut rng).unwrap());
    });
}

fn retry_success_path(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let policy = RetryPolicy::<std::io::Error>::builder().max_attempts(3).build().unwrap();
    let svc = ServiceBuilder::new().layer(RetryLayer::new(policy)).service(EchoService);

    c.bench_function("retry_layer_success", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box("request"))).await;
        });
    });
}

fn retry_exhaustion_path(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let policy = RetryPolicy::<std::io::Error>::builder()
        .max_attempts(3)
        .backoff(Backoff::fixed(Duration::from_millis(1)))
        .with_sleeper(InstantSleeper)
        .build()
        .unwrap();
    let svc = ServiceBuilder::new()
        .layer(RetryLayer::new(policy))
        .service(FailingService { calls: Arc::new(AtomicUsize::new(0)) });

    c.bench_function("retry_layer_exhaustion_3_attempts", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let _ = black_box(local_svc.call(black_box("request"))).await;
        });
    });
}

criterion_group!(benches, backoff_next_delay, retry_success_path, retry_exhaustion_path);
criterion_main!(benches);
