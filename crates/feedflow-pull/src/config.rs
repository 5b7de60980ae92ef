//! Configuration and builder for the pulling engine.

use std::sync::Arc;
use std::time::Duration;

use feedflow_core::events::EventSink;

use crate::dispatch::{DeliveryExecutor, HttpDispatcher, HttpTransport};
use crate::engine::{new_shared, PullingEngine};
use crate::events::PullEvent;
use crate::limiter::{PriorityRateLimiter, RateLimitConfig};
use crate::registry::RequestRegistry;
use crate::request::{Fingerprint, Priority};
use crate::retry::RetryPolicy;

/// Builder for [`PullingEngine`].
///
/// Obtained from [`PullingEngine::builder`], which supplies the one
/// mandatory piece of configuration: the per-priority transport factory.
pub struct PullingEngineBuilder {
    transport_factory: Box<dyn Fn(Priority) -> Arc<dyn HttpTransport>>,
    retry: RetryPolicy,
    rate_limit: RateLimitConfig,
    name: String,
    tick: Duration,
    response_buffer: usize,
    delivery_parallelism: usize,
    runtime: Option<tokio::runtime::Handle>,
    events: EventSink<PullEvent>,
}

impl PullingEngineBuilder {
    /// Creates a builder with defaults.
    ///
    /// Defaults:
    /// - retry policy: exponential backoff, 3 attempts, 100ms initial
    /// - rate limit: 8 concurrent dispatches per priority class
    /// - wakeup tick: 10ms
    /// - response stream buffer: 1024
    /// - delivery parallelism: 16
    /// - name: `"pulling-engine"`
    pub(crate) fn new<F>(transport_factory: F) -> Self
    where
        F: Fn(Priority) -> Arc<dyn HttpTransport> + 'static,
    {
        Self {
            transport_factory: Box::new(transport_factory),
            retry: RetryPolicy::standard().build(),
            rate_limit: RateLimitConfig::default(),
            name: "pulling-engine".to_string(),
            tick: Duration::from_millis(10),
            response_buffer: 1024,
            delivery_parallelism: DeliveryExecutor::DEFAULT_PARALLELISM,
            runtime: None,
            events: EventSink::new(),
        }
    }

    /// Sets the engine name used in events, logs and metric labels.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the default retry policy. Individual requests may override it.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the per-class rate-limit caps.
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Sets the granularity at which cooldown retries and periodic pulls
    /// wake up. Retry delays and periodic intervals resolve no finer than
    /// this tick.
    pub fn tick_interval(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Sets the response stream's per-subscriber buffer. A subscriber that
    /// falls further behind observes a lag error and keeps reading.
    pub fn response_buffer(mut self, capacity: usize) -> Self {
        self.response_buffer = capacity;
        self
    }

    /// Caps how many resolved responses may be mid-delivery at once.
    pub fn delivery_parallelism(mut self, max_parallel: usize) -> Self {
        self.delivery_parallelism = max_parallel;
        self
    }

    /// Runs the engine's tasks on the given runtime instead of the one the
    /// builder is called on.
    pub fn runtime_handle(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Registers a callback for accepted submissions.
    ///
    /// Called with the request's fingerprint and priority class.
    pub fn on_request_accepted<F>(mut self, f: F) -> Self
    where
        F: Fn(Fingerprint, Priority) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let PullEvent::RequestAccepted {
                fingerprint,
                priority,
            } = event
            {
                f(*fingerprint, *priority);
            }
        });
        self
    }

    /// Registers a callback for submissions dropped as duplicates.
    pub fn on_request_deduplicated<F>(mut self, f: F) -> Self
    where
        F: Fn(Fingerprint) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let PullEvent::RequestDeduplicated { fingerprint } = event {
                f(*fingerprint);
            }
        });
        self
    }

    /// Registers a callback for each scheduled retry.
    ///
    /// Called with the failed attempt number (1-indexed, including the
    /// initial attempt) and the delay before the next one.
    pub fn on_retry_scheduled<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let PullEvent::RetryScheduled { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        });
        self
    }

    /// Registers a callback for abandoned cycles.
    ///
    /// Called with the total attempts made before giving up.
    pub fn on_gave_up<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let PullEvent::GaveUp { attempts, .. } = event {
                f(*attempts);
            }
        });
        self
    }

    /// Registers a callback for each published response.
    ///
    /// Called with the fingerprint and HTTP status.
    pub fn on_response_received<F>(mut self, f: F) -> Self
    where
        F: Fn(Fingerprint, u16) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let PullEvent::ResponseReceived {
                fingerprint,
                status,
                ..
            } = event
            {
                f(*fingerprint, *status);
            }
        });
        self
    }

    /// Builds and starts the engine.
    ///
    /// # Panics
    ///
    /// Panics if no runtime handle was supplied and the builder is used
    /// outside a tokio runtime.
    pub fn build(self) -> PullingEngine {
        let runtime = self
            .runtime
            .unwrap_or_else(tokio::runtime::Handle::current);
        let delivery = DeliveryExecutor::new(runtime.clone(), self.delivery_parallelism);
        let dispatcher = HttpDispatcher::new(self.transport_factory.as_ref(), delivery);
        let shared = new_shared(
            self.name,
            RequestRegistry::new(),
            PriorityRateLimiter::new(self.rate_limit),
            dispatcher,
            Arc::new(self.retry),
            self.response_buffer,
            self.events,
            runtime,
            self.tick,
        );
        PullingEngine::from_shared(shared)
    }
}
