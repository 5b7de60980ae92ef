//! Priority-aware feed pulling engine.
//!
//! The engine continuously pulls remote feeds over HTTP and publishes the
//! responses on a hot multicast stream. It owns four cooperating pieces:
//!
//! - **Registry** — de-duplicates submissions by fingerprint and tracks
//!   cooldowns, so at most one request per fingerprint is ever in flight.
//! - **Rate limiter** — an independent concurrency pool per priority class;
//!   saturating a low class never delays a high one.
//! - **Dispatcher** — one transport client per priority class, with
//!   response resolution hopped off the transport's completion context onto
//!   a bounded delivery executor.
//! - **Retry policy** — a pure decision function over attempt counts and
//!   categorised errors, with pluggable backoff.
//!
//! # Basic Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use feedflow_pull::{
//!     FeedRequest, HttpTransport, Priority, PullingEngine, RateLimitConfig, RetryPolicy,
//!     Schedule,
//! };
//!
//! # async fn example(transport: Arc<dyn HttpTransport>) {
//! let engine = PullingEngine::builder(move |_priority| Arc::clone(&transport))
//!     .name("live-feeds")
//!     .rate_limit(
//!         RateLimitConfig::builder()
//!             .cap(Priority::Highest, 16)
//!             .cap(Priority::Lowest, 2)
//!             .build(),
//!     )
//!     .retry_policy(RetryPolicy::aggressive().build())
//!     .build();
//!
//! // A self-repeating pull for one match feed.
//! let handle = engine
//!     .schedule_periodic(
//!         FeedRequest::builder("/live/match/40291", "feeds.example.com", 443)
//!             .priority(Priority::Highest)
//!             .build(),
//!         Schedule::every(Duration::from_millis(500)).jitter(Duration::from_millis(50)),
//!     )
//!     .unwrap();
//!
//! let mut responses = engine.responses();
//! while let Ok(response) = responses.recv().await {
//!     println!("{}: {} bytes", response.fingerprint(), response.body().len());
//! }
//!
//! engine.cancel(handle);
//! engine.shutdown(Duration::from_secs(5)).await;
//! # }
//! ```
//!
//! # Bringing a transport
//!
//! The HTTP client is a collaborator, not part of this crate. Implement
//! [`HttpTransport`] directly, or wrap any tower service with
//! [`TowerTransport`]:
//!
//! ```rust
//! use feedflow_pull::{FeedRequest, FetchError, RawResponse, TowerTransport};
//!
//! let service = tower::service_fn(|_request: FeedRequest| async move {
//!     Ok::<_, FetchError>(RawResponse::ok(b"<odds/>".to_vec()))
//! });
//! let transport = TowerTransport::new(service);
//! # let _ = transport;
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod limiter;
mod registry;
pub mod request;
pub mod retry;

pub use config::PullingEngineBuilder;
pub use dispatch::{DeliveryExecutor, HttpTransport, RawResponse, TowerTransport};
pub use engine::{FeedResponse, PullHandle, PullingEngine, ResponseStream};
pub use error::{FetchError, StreamError, SubmitError};
pub use events::PullEvent;
pub use limiter::{
    LimiterClosed, PriorityPermit, PriorityRateLimiter, RateLimitConfig, RateLimitConfigBuilder,
};
pub use request::{FeedRequest, FeedRequestBuilder, Fingerprint, Priority, Schedule};
pub use retry::{Backoff, RetryDecision, RetryPolicy, RetryPolicyBuilder, RetryPredicate};
