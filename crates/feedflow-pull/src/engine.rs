//! The pulling engine: admission, rate limiting, dispatch, retries, and the
//! hot response stream.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime};

use feedflow_core::events::EventSink;
use tokio::sync::broadcast;
use tokio::sync::Notify;

use crate::config::PullingEngineBuilder;
use crate::dispatch::{DispatchResult, HttpDispatcher, HttpTransport, RawResponse};
use crate::error::{FetchError, StreamError, SubmitError};
use crate::events::PullEvent;
use crate::limiter::PriorityRateLimiter;
use crate::registry::{
    next_periodic_tick, Admission, GiveUpOutcome, RequestRegistry, SuccessOutcome,
};
use crate::request::{FeedRequest, Fingerprint, Priority, Schedule};
use crate::retry::{RetryDecision, RetryPolicy};

/// A final response published on the engine's stream. Immutable; cloned
/// cheaply per subscriber.
#[derive(Debug, Clone)]
pub struct FeedResponse {
    fingerprint: Fingerprint,
    status: u16,
    body: Arc<[u8]>,
    received_at: SystemTime,
    elapsed: Duration,
}

impl FeedResponse {
    /// Fingerprint of the request this response answers.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// The HTTP status the transport accepted.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// The response body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Wall-clock time the response was received.
    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// Time from dispatch to resolution of the successful attempt.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// Opaque handle to a periodic pull, usable for cancellation.
///
/// Handles carry no reference back into the engine; they resolve through
/// registry-owned bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PullHandle {
    pub(crate) id: u64,
}

/// One subscription to the engine's hot multicast response stream.
///
/// Responses published before the subscription are not replayed. A slow
/// subscriber that overruns the stream buffer observes a
/// [`StreamError::Lagged`] and can keep reading afterwards.
pub struct ResponseStream {
    rx: broadcast::Receiver<FeedResponse>,
}

impl ResponseStream {
    /// Waits for the next response.
    pub async fn recv(&mut self) -> Result<FeedResponse, StreamError> {
        self.rx.recv().await.map_err(|err| match err {
            broadcast::error::RecvError::Closed => StreamError::Closed,
            broadcast::error::RecvError::Lagged(missed) => StreamError::Lagged { missed },
        })
    }
}

pub(crate) struct EngineShared {
    pub(crate) name: String,
    pub(crate) registry: RequestRegistry,
    pub(crate) limiter: PriorityRateLimiter,
    pub(crate) dispatcher: HttpDispatcher,
    pub(crate) default_retry: Arc<RetryPolicy>,
    pub(crate) responses_tx: broadcast::Sender<FeedResponse>,
    pub(crate) events: EventSink<PullEvent>,
    pub(crate) runtime: tokio::runtime::Handle,
    pub(crate) tick: Duration,
    pub(crate) shutting_down: AtomicBool,
    in_flight: AtomicUsize,
    idle_notify: Notify,
    handle_ids: AtomicU64,
}

/// Decrements the in-flight count even if an attempt unwinds.
struct InFlightGuard {
    shared: Arc<EngineShared>,
}

impl InFlightGuard {
    fn new(shared: Arc<EngineShared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.shared.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.shared.idle_notify.notify_waiters();
        }
    }
}

/// Priority-aware feed puller.
///
/// Accepts one-shot and periodic [`FeedRequest`]s, de-duplicates them by
/// fingerprint, rate-limits dispatch per priority class, retries failures
/// per policy, and publishes final responses on a hot multicast stream.
///
/// Cloning is cheap and shares the engine.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use feedflow_pull::{FeedRequest, HttpTransport, Priority, PullingEngine, RetryPolicy};
///
/// # async fn example(transport: Arc<dyn HttpTransport>) {
/// let engine = PullingEngine::builder(move |_priority| Arc::clone(&transport))
///     .retry_policy(RetryPolicy::standard().build())
///     .build();
///
/// let mut responses = engine.responses();
/// engine
///     .submit(
///         FeedRequest::builder("/live/odds", "feeds.example.com", 443)
///             .priority(Priority::High)
///             .build(),
///     )
///     .unwrap();
///
/// let response = responses.recv().await.unwrap();
/// println!("{} bytes", response.body().len());
/// # }
/// ```
#[derive(Clone)]
pub struct PullingEngine {
    shared: Arc<EngineShared>,
}

impl PullingEngine {
    /// Starts building an engine around a per-priority transport factory.
    ///
    /// The factory is invoked once per priority class, so each class gets
    /// its own client and head-of-line blocking cannot cross classes.
    pub fn builder<F>(transport_factory: F) -> PullingEngineBuilder
    where
        F: Fn(Priority) -> Arc<dyn HttpTransport> + 'static,
    {
        PullingEngineBuilder::new(transport_factory)
    }

    pub(crate) fn from_shared(shared: Arc<EngineShared>) -> Self {
        Self::spawn_ticker(&shared);
        Self { shared }
    }

    /// Submits a one-shot pull.
    ///
    /// Returns synchronously: `Ok` once the request is registered for
    /// dispatch, or a [`SubmitError`] naming why it was dropped. Duplicate
    /// and cooldown collisions never reach the transport.
    pub fn submit(&self, request: FeedRequest) -> Result<(), SubmitError> {
        self.submit_shared(Arc::new(request), None)
    }

    /// Registers a self-repeating pull and returns its cancellation handle.
    ///
    /// The first pull is dispatched immediately; each completed cycle
    /// schedules the next one at `interval` plus a random slice of the
    /// configured jitter. Failed cycles stay scheduled.
    pub fn schedule_periodic(
        &self,
        request: FeedRequest,
        schedule: Schedule,
    ) -> Result<PullHandle, SubmitError> {
        let id = self.shared.handle_ids.fetch_add(1, Ordering::Relaxed);
        let request = Arc::new(request.with_schedule(schedule));
        self.submit_shared(request, Some(id))?;
        Ok(PullHandle { id })
    }

    /// Cancels a periodic pull. An in-flight attempt is aborted best-effort
    /// and its outcome suppressed from the stream. Returns false if the
    /// handle no longer resolves.
    pub fn cancel(&self, handle: PullHandle) -> bool {
        let Some(fingerprint) = self.shared.registry.fingerprint_of_handle(handle.id) else {
            return false;
        };
        let cancelled = self.shared.registry.cancel(fingerprint);
        if cancelled {
            #[cfg(feature = "tracing")]
            tracing::debug!(engine = %self.shared.name, fingerprint = %fingerprint, "pull cancelled");
            self.shared
                .events
                .emit(&self.shared.name, &PullEvent::Cancelled { fingerprint });
        }
        cancelled
    }

    /// Subscribes to the hot response stream.
    pub fn responses(&self) -> ResponseStream {
        ResponseStream {
            rx: self.shared.responses_tx.subscribe(),
        }
    }

    /// Shuts the engine down.
    ///
    /// New submissions are rejected immediately. In-flight attempts get
    /// `grace` to drain; whatever remains afterwards is aborted and resolves
    /// with [`FetchError::Shutdown`] internally, emitting nothing on the
    /// stream. Idempotent.
    pub async fn shutdown(&self, grace: Duration) {
        if self.shared.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        // Waiters still queued on the limiter are not in flight; wake and
        // abandon them so the grace period is spent on real HTTP work.
        self.shared.limiter.close();

        let drained = tokio::time::timeout(grace, self.shared.drained()).await.is_ok();
        self.shared.dispatcher.shutdown();
        if !drained {
            // Aborted attempts still need a beat to run their bookkeeping.
            let _ = tokio::time::timeout(Duration::from_millis(50), self.shared.drained()).await;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(engine = %self.shared.name, drained, "pulling engine shut down");
        self.shared.events.emit(&self.shared.name, &PullEvent::ShutDown);
    }

    /// Advisory count of registered fingerprints, for gauges.
    pub fn registered_requests(&self) -> usize {
        self.shared.registry.len()
    }

    fn submit_shared(
        &self,
        request: Arc<FeedRequest>,
        handle_id: Option<u64>,
    ) -> Result<(), SubmitError> {
        let shared = &self.shared;
        if shared.shutting_down.load(Ordering::SeqCst) {
            return Err(SubmitError::ShuttingDown);
        }

        let fingerprint = request.fingerprint();
        match shared.registry.admit(&request, handle_id) {
            Admission::Admitted => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    engine = %shared.name,
                    fingerprint = %fingerprint,
                    priority = %request.priority(),
                    url = request.url(),
                    "http_client_got_accepted_rq"
                );
                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "pull_requests_accepted_total",
                    "engine" => shared.name.clone(),
                    "priority" => request.priority().label()
                )
                .increment(1);
                shared.events.emit(
                    &shared.name,
                    &PullEvent::RequestAccepted {
                        fingerprint,
                        priority: request.priority(),
                    },
                );
                EngineShared::spawn_attempt(shared, request);
                Ok(())
            }
            Admission::DuplicateDrop => {
                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "pull_requests_deduplicated_total",
                    "engine" => shared.name.clone()
                )
                .increment(1);
                shared
                    .events
                    .emit(&shared.name, &PullEvent::RequestDeduplicated { fingerprint });
                Err(SubmitError::Duplicate { fingerprint })
            }
            Admission::CooldownDefer(next_eligible) => {
                shared
                    .events
                    .emit(&shared.name, &PullEvent::RequestDeferred { fingerprint });
                Err(SubmitError::CooldownDeferred {
                    fingerprint,
                    next_eligible,
                })
            }
        }
    }

    /// Periodic wakeups: cooldown retries and the next ticks of periodic
    /// pulls are both driven by polling the registry's due set. The ticker
    /// holds only a weak reference, so dropping the last engine clone stops
    /// it.
    fn spawn_ticker(shared: &Arc<EngineShared>) {
        let weak: Weak<EngineShared> = Arc::downgrade(shared);
        let tick = shared.tick;
        shared.runtime.spawn(async move {
            loop {
                tokio::time::sleep(tick).await;
                let Some(shared) = weak.upgrade() else { break };
                if shared.shutting_down.load(Ordering::SeqCst) {
                    break;
                }
                for request in shared.registry.due_requests(Instant::now()) {
                    EngineShared::spawn_attempt(&shared, request);
                }
            }
        });
    }
}

impl EngineShared {
    fn spawn_attempt(shared: &Arc<EngineShared>, request: Arc<FeedRequest>) {
        let guard = InFlightGuard::new(Arc::clone(shared));
        let shared = Arc::clone(shared);
        shared.runtime.clone().spawn(async move {
            let _guard = guard;
            shared.run_attempt(request).await;
        });
    }

    async fn run_attempt(&self, request: Arc<FeedRequest>) {
        let fingerprint = request.fingerprint();

        let mut permit = match self.limiter.acquire(request.priority()).await {
            Ok(permit) => permit,
            // Closed by shutdown while queued; the entry is abandoned.
            Err(_closed) => return,
        };

        let Some((cancel, attempt)) = self.registry.mark_in_flight(fingerprint, Instant::now())
        else {
            // Cancelled between admission and dispatch.
            let _ = self.limiter.release(&mut permit);
            return;
        };

        self.events.emit(
            &self.name,
            &PullEvent::Dispatched {
                fingerprint,
                attempt,
            },
        );

        let started = Instant::now();
        let rx = self.dispatcher.send(Arc::clone(&request), cancel);
        let resolved = rx.await;
        let elapsed = started.elapsed();
        let _ = self.limiter.release(&mut permit);

        // The delivery slot is held until this attempt has finished
        // publishing, bounding concurrent response deliveries.
        let (outcome, _delivery_slot) = match resolved {
            Ok(resolved) => resolved.into_parts(),
            Err(_) => (DispatchResult::ShutDown, None),
        };

        match outcome {
            DispatchResult::Done(Ok(raw)) => self.on_success(&request, fingerprint, raw, elapsed),
            DispatchResult::Done(Err(error)) => self.on_failure(&request, fingerprint, attempt, error),
            DispatchResult::Cancelled => {
                let _ = self.registry.complete_success(fingerprint, None);
            }
            DispatchResult::ShutDown => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    engine = %self.name,
                    fingerprint = %fingerprint,
                    error = %FetchError::Shutdown,
                    "attempt aborted by shutdown"
                );
                let _ = self.registry.complete_give_up(fingerprint, None);
            }
        }
    }

    fn on_success(
        &self,
        request: &Arc<FeedRequest>,
        fingerprint: Fingerprint,
        raw: RawResponse,
        elapsed: Duration,
    ) {
        let next_tick = request
            .schedule()
            .map(|s| next_periodic_tick(Instant::now(), s.interval, s.jitter));

        match self.registry.complete_success(fingerprint, next_tick) {
            SuccessOutcome::Suppressed => {}
            SuccessOutcome::EmitAndRemove | SuccessOutcome::EmitAndReschedule(_) => {
                let response = FeedResponse {
                    fingerprint,
                    status: raw.status,
                    body: raw.body.into(),
                    received_at: SystemTime::now(),
                    elapsed,
                };
                self.events.emit(
                    &self.name,
                    &PullEvent::ResponseReceived {
                        fingerprint,
                        status: response.status,
                        elapsed,
                    },
                );
                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "pull_responses_total",
                    "engine" => self.name.clone()
                )
                .increment(1);
                // No subscribers is fine; the stream is hot.
                let _ = self.responses_tx.send(response);
            }
        }
    }

    fn on_failure(
        &self,
        request: &Arc<FeedRequest>,
        fingerprint: Fingerprint,
        attempt: u32,
        error: FetchError,
    ) {
        let policy = request
            .retry_override()
            .unwrap_or(&self.default_retry);

        match policy.decide(attempt, &error) {
            RetryDecision::RetryAfter(delay) => {
                let at = Instant::now() + delay;
                if self.registry.schedule_retry(fingerprint, at) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(
                        engine = %self.name,
                        fingerprint = %fingerprint,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retry scheduled"
                    );
                    #[cfg(feature = "metrics")]
                    metrics::counter!(
                        "pull_retries_total",
                        "engine" => self.name.clone()
                    )
                    .increment(1);
                    self.events.emit(
                        &self.name,
                        &PullEvent::RetryScheduled {
                            fingerprint,
                            attempt,
                            delay,
                        },
                    );
                }
            }
            RetryDecision::GiveUp => {
                let next_tick = request
                    .schedule()
                    .map(|s| next_periodic_tick(Instant::now(), s.interval, s.jitter));
                let disposition = self.registry.complete_give_up(fingerprint, next_tick);
                if disposition == GiveUpOutcome::Suppressed {
                    return;
                }
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    engine = %self.name,
                    fingerprint = %fingerprint,
                    attempts = attempt,
                    reason = %error,
                    rescheduled = matches!(disposition, GiveUpOutcome::Rescheduled(_)),
                    "giving up on pull"
                );
                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "pull_give_ups_total",
                    "engine" => self.name.clone()
                )
                .increment(1);
                self.events.emit(
                    &self.name,
                    &PullEvent::GaveUp {
                        fingerprint,
                        attempts: attempt,
                        reason: error.to_string(),
                    },
                );
            }
        }
    }

    async fn drained(&self) {
        loop {
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.idle_notify.notified();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) fn new_shared(
    name: String,
    registry: RequestRegistry,
    limiter: PriorityRateLimiter,
    dispatcher: HttpDispatcher,
    default_retry: Arc<RetryPolicy>,
    response_buffer: usize,
    events: EventSink<PullEvent>,
    runtime: tokio::runtime::Handle,
    tick: Duration,
) -> Arc<EngineShared> {
    let (responses_tx, _) = broadcast::channel(response_buffer.max(1));
    Arc::new(EngineShared {
        name,
        registry,
        limiter,
        dispatcher,
        default_retry,
        responses_tx,
        events,
        runtime,
        tick,
        shutting_down: AtomicBool::new(false),
        in_flight: AtomicUsize::new(0),
        idle_notify: Notify::new(),
        handle_ids: AtomicU64::new(1),
    })
}
