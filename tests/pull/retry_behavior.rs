//! Retry correctness: 5xx retries per policy, 4xx gives up immediately.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedflow_pull::{Backoff, Priority, PullingEngine, RetryPolicy, Schedule};

use super::support::{request, shared_factory, ScriptedTransport, Step};

#[tokio::test(flavor = "multi_thread")]
async fn server_errors_retry_until_success() {
    // 500, 500, then 200: with backoff [50ms, 150ms] and a cap of 3 the
    // transport must be called exactly three times.
    let transport = ScriptedTransport::new([
        Step::Status(500),
        Step::Status(500),
        Step::Ok(b"third time lucky".to_vec()),
    ]);
    let engine = PullingEngine::builder(shared_factory(Arc::clone(&transport)))
        .retry_policy(
            RetryPolicy::builder()
                .max_attempts(3)
                .backoff(Backoff::exponential(Duration::from_millis(50)).growth(3.0))
                .build(),
        )
        .build();
    let mut responses = engine.responses();

    engine.submit(request("/flaky", Priority::High)).unwrap();

    let response = tokio::time::timeout(Duration::from_secs(2), responses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.body(), b"third time lucky");
    assert_eq!(transport.calls(), 3);

    // Attempt spacing follows the backoff, at wakeup-tick granularity.
    let times = transport.call_times();
    assert!(times[1] - times[0] >= Duration::from_millis(45));
    assert!(times[2] - times[1] >= Duration::from_millis(140));
}

#[tokio::test(flavor = "multi_thread")]
async fn client_errors_give_up_without_retrying() {
    let gave_up_attempts = Arc::new(AtomicUsize::new(0));
    let gave_up_probe = Arc::clone(&gave_up_attempts);

    let transport = ScriptedTransport::new([Step::Status(404)]);
    let engine = PullingEngine::builder(shared_factory(Arc::clone(&transport)))
        .retry_policy(RetryPolicy::builder().max_attempts(5).build())
        .on_gave_up(move |attempts| {
            gave_up_probe.store(attempts as usize, Ordering::SeqCst);
        })
        .build();
    let mut responses = engine.responses();

    engine.submit(request("/missing", Priority::Medium)).unwrap();

    // No response is ever emitted for a given-up one-shot.
    assert!(
        tokio::time::timeout(Duration::from_millis(300), responses.recv())
            .await
            .is_err()
    );
    assert_eq!(transport.calls(), 1);
    assert_eq!(gave_up_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn exhausted_retries_emit_no_response() {
    let transport = ScriptedTransport::new([
        Step::Transport,
        Step::Transport,
        Step::Transport,
    ]);
    let engine = PullingEngine::builder(shared_factory(Arc::clone(&transport)))
        .retry_policy(
            RetryPolicy::builder()
                .max_attempts(3)
                .backoff(Backoff::constant(Duration::from_millis(20)))
                .build(),
        )
        .build();
    let mut responses = engine.responses();

    engine.submit(request("/down", Priority::Low)).unwrap();

    assert!(
        tokio::time::timeout(Duration::from_millis(500), responses.recv())
            .await
            .is_err()
    );
    assert_eq!(transport.calls(), 3);
    // The fingerprint is free again after the give-up.
    engine.submit(request("/down", Priority::Low)).unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn periodic_pull_retries_within_a_cycle_then_continues_ticking() {
    // One full cycle: 500, 500, 200 resolves at ~200ms; the next periodic
    // tick lands an interval after that and calls the transport a 4th time.
    let transport = ScriptedTransport::new([
        Step::Status(500),
        Step::Status(500),
        Step::Ok(b"cycle-1".to_vec()),
        Step::Ok(b"cycle-2".to_vec()),
    ]);
    let engine = PullingEngine::builder(shared_factory(Arc::clone(&transport)))
        .retry_policy(
            RetryPolicy::builder()
                .max_attempts(3)
                .backoff(Backoff::exponential(Duration::from_millis(50)).growth(3.0))
                .build(),
        )
        .build();
    let mut responses = engine.responses();

    let handle = engine
        .schedule_periodic(
            request("/scores", Priority::High),
            Schedule::every(Duration::from_millis(100)),
        )
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), responses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.body(), b"cycle-1");

    let second = tokio::time::timeout(Duration::from_secs(2), responses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.body(), b"cycle-2");
    assert_eq!(transport.calls(), 4);

    engine.cancel(handle);
}

#[tokio::test(flavor = "multi_thread")]
async fn per_request_policy_overrides_the_engine_default() {
    let transport = ScriptedTransport::new([Step::Status(500), Step::Ok(Vec::new())]);
    // Engine default would give up immediately; the request brings its own
    // policy that retries once.
    let engine = PullingEngine::builder(shared_factory(Arc::clone(&transport)))
        .retry_policy(RetryPolicy::builder().max_attempts(1).build())
        .build();
    let mut responses = engine.responses();

    let request = feedflow_pull::FeedRequest::builder("/feed", "feeds.example.com", 443)
        .retry_policy(Arc::new(
            RetryPolicy::builder()
                .max_attempts(2)
                .backoff(Backoff::constant(Duration::from_millis(20)))
                .build(),
        ))
        .build();
    engine.submit(request).unwrap();

    tokio::time::timeout(Duration::from_secs(2), responses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transport.calls(), 2);
}
