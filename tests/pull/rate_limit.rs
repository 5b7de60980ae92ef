//! Priority isolation: saturating one class never delays another.

use std::sync::Arc;
use std::time::{Duration, Instant};

use feedflow_pull::{
    HttpTransport, Priority, PullingEngine, RateLimitConfig,
};

use super::support::{request, ScriptedTransport, Step};

#[tokio::test(flavor = "multi_thread")]
async fn saturated_low_class_does_not_delay_high() {
    // LOW pulls stall for a second each; HIGH resolves instantly. Each
    // class has its own transport, as the engine's factory contract
    // prescribes.
    let slow = ScriptedTransport::new(
        std::iter::repeat(Step::OkAfter(Vec::new(), Duration::from_secs(1))).take(10),
    );
    let fast = ScriptedTransport::new([]);

    let slow_for_factory = Arc::clone(&slow);
    let fast_for_factory = Arc::clone(&fast);
    let engine = PullingEngine::builder(move |priority| match priority {
        Priority::Low => Arc::clone(&slow_for_factory) as Arc<dyn HttpTransport>,
        _ => Arc::clone(&fast_for_factory) as Arc<dyn HttpTransport>,
    })
    .rate_limit(
        RateLimitConfig::builder()
            .cap(Priority::High, 2)
            .cap(Priority::Low, 2)
            .build(),
    )
    .build();
    let mut responses = engine.responses();

    for i in 0..10 {
        engine
            .submit(request(&format!("/bulk/{i}"), Priority::Low))
            .unwrap();
    }

    let started = Instant::now();
    let high = request("/live/score", Priority::High);
    let high_fingerprint = high.fingerprint();
    engine.submit(high).unwrap();

    // The HIGH response must arrive long before the LOW backlog drains
    // (which needs 5 serial seconds at cap 2).
    loop {
        let response = tokio::time::timeout(Duration::from_millis(500), responses.recv())
            .await
            .expect("high-priority response must not wait behind low traffic")
            .unwrap();
        if response.fingerprint() == high_fingerprint {
            break;
        }
    }
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "high-priority pull took {:?}",
        started.elapsed()
    );
    assert_eq!(fast.calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn class_cap_bounds_concurrent_dispatches() {
    let slow = ScriptedTransport::new(
        std::iter::repeat(Step::OkAfter(Vec::new(), Duration::from_millis(100))).take(6),
    );
    let slow_for_factory = Arc::clone(&slow);
    let engine = PullingEngine::builder(move |_| {
        Arc::clone(&slow_for_factory) as Arc<dyn HttpTransport>
    })
    .rate_limit(RateLimitConfig::builder().cap(Priority::Medium, 2).build())
    .build();

    for i in 0..6 {
        engine
            .submit(request(&format!("/feed/{i}"), Priority::Medium))
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // With a cap of 2 and a 100ms transport, only the first wave can have
    // reached the transport by now.
    assert!(
        slow.calls() <= 2,
        "expected at most 2 concurrent dispatches, transport saw {}",
        slow.calls()
    );
}
