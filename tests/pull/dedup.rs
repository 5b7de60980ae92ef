//! De-duplication: the registry is consulted before any HTTP work.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedflow_pull::{Priority, PullingEngine, SubmitError};

use super::support::{request, shared_factory, ScriptedTransport, Step};

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_while_in_flight_is_dropped_and_transport_called_once() {
    // The first attempt is held open so the second submission collides with
    // an in-flight fingerprint.
    let transport = ScriptedTransport::new([Step::OkAfter(
        b"body".to_vec(),
        Duration::from_millis(100),
    )]);
    let engine = PullingEngine::builder(shared_factory(Arc::clone(&transport))).build();
    let mut responses = engine.responses();

    let first = request("/live/odds", Priority::High);
    let fingerprint = first.fingerprint();
    engine.submit(first).unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = request("/live/odds", Priority::High);
    let err = engine.submit(second).unwrap_err();
    assert_eq!(err, SubmitError::Duplicate { fingerprint });

    let response = tokio::time::timeout(Duration::from_secs(2), responses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.fingerprint(), fingerprint);
    assert_eq!(response.body(), b"body");
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_fingerprint_can_be_submitted_again() {
    let transport = ScriptedTransport::new([]);
    let engine = PullingEngine::builder(shared_factory(Arc::clone(&transport))).build();
    let mut responses = engine.responses();

    engine.submit(request("/feed", Priority::Medium)).unwrap();
    tokio::time::timeout(Duration::from_secs(2), responses.recv())
        .await
        .unwrap()
        .unwrap();

    // The one-shot entry was removed on success; the same identity is new
    // work now.
    engine.submit(request("/feed", Priority::Medium)).unwrap();
    tokio::time::timeout(Duration::from_secs(2), responses.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn distinct_tags_are_distinct_requests() {
    let transport = ScriptedTransport::new([]);
    let engine = PullingEngine::builder(shared_factory(Arc::clone(&transport))).build();
    let mut responses = engine.responses();

    let plain = feedflow_pull::FeedRequest::builder("/feed", "feeds.example.com", 443).build();
    let tagged = feedflow_pull::FeedRequest::builder("/feed", "feeds.example.com", 443)
        .tag("consumer-b")
        .build();
    engine.submit(plain).unwrap();
    engine.submit(tagged).unwrap();

    for _ in 0..2 {
        tokio::time::timeout(Duration::from_secs(2), responses.recv())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn dedup_events_fire_for_dropped_submissions() {
    let dropped = Arc::new(AtomicUsize::new(0));
    let dropped_probe = Arc::clone(&dropped);

    let transport = ScriptedTransport::new([Step::OkAfter(
        Vec::new(),
        Duration::from_millis(100),
    )]);
    let engine = PullingEngine::builder(shared_factory(transport))
        .on_request_deduplicated(move |_fingerprint| {
            dropped_probe.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    engine.submit(request("/feed", Priority::Low)).unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let _ = engine.submit(request("/feed", Priority::Low));
    let _ = engine.submit(request("/feed", Priority::Low));

    assert_eq!(dropped.load(Ordering::SeqCst), 2);
}
