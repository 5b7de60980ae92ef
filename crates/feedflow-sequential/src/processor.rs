//! The sequential processor: routes inputs to shards and enforces
//! one-in-flight-per-shard.
//!
//! Advancement is message-driven: every completion (success, failure, or an
//! abandoned handle) sends its shard index to a dedicated advance task,
//! which pops the finished head under the lock and starts the next item.
//! The next item for a shard therefore cannot start until the current one
//! has signalled, which is the whole ordering guarantee.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use feedflow_core::events::EventSink;
use feedflow_core::ProgrammingError;
use tokio::sync::mpsc;

use crate::config::ProcessorConfigBuilder;
use crate::error::EnqueueError;
use crate::events::ProcessorEvent;
use crate::input::SequentialInput;
use crate::queues::{EnqueuedInput, NextItem, ShardedQueueSet};
use crate::subscriber::{Completion, CompletionMsg, CompletionOutcome, Subscriber};

/// Default number of shards. Large, so that key-heavy workloads rarely see
/// two distinct keys collide onto the same queue.
pub const DEFAULT_SHARD_COUNT: usize = 100_000;

/// Default threshold after which a still-queued input is logged as waiting
/// too long.
pub const DEFAULT_WARN_AFTER: Duration = Duration::from_secs(2);

pub(crate) struct ProcessorInner {
    pub(crate) name: String,
    pub(crate) queues: ShardedQueueSet,
    pub(crate) completion_tx: mpsc::UnboundedSender<CompletionMsg>,
    pub(crate) warn_after: Duration,
    pub(crate) events: EventSink<ProcessorEvent>,
}

/// Sharded per-key FIFO dispatcher.
///
/// `process_sequentially` is fire-and-forget: it enqueues and returns. For
/// any one shard, subscribers run strictly in submission order with at most
/// one in flight; across shards there is no coordination at all.
///
/// Cloning is cheap and shares the processor.
///
/// # Example
///
/// ```rust,no_run
/// use feedflow_core::LogContext;
/// use feedflow_sequential::{
///     key_resolver, FutureSubscriber, SequentialInput, SequentialProcessor,
/// };
///
/// # #[tokio::main(flavor = "multi_thread")]
/// # async fn main() {
/// let processor = SequentialProcessor::builder().build();
///
/// struct OddsUpdate {
///     match_id: u64,
/// }
///
/// let input = SequentialInput::new(
///     OddsUpdate { match_id: 40291 },
///     key_resolver(|update: &OddsUpdate| update.match_id),
///     FutureSubscriber::new(|update: OddsUpdate| async move {
///         // apply the update; inputs for this match are serialised
///         let _ = update.match_id;
///         Ok::<_, std::convert::Infallible>(())
///     }),
/// )
/// .context(LogContext::new().with("match_id", "40291"));
///
/// processor.process_sequentially(input).unwrap();
/// # }
/// ```
#[derive(Clone)]
pub struct SequentialProcessor {
    inner: Arc<ProcessorInner>,
}

impl SequentialProcessor {
    /// Starts building a processor.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::new()
    }

    /// Creates a processor with the given shard count and default settings.
    ///
    /// # Panics
    ///
    /// Panics if called from outside a tokio runtime.
    pub fn new(shard_count: usize) -> Self {
        Self::builder().shard_count(shard_count).build()
    }

    pub(crate) fn from_parts(
        inner: Arc<ProcessorInner>,
        rx: mpsc::UnboundedReceiver<CompletionMsg>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self::spawn_advance_loop(&inner, rx, runtime);
        Self { inner }
    }

    /// Enqueues one input for ordered processing and returns immediately.
    ///
    /// If the input's shard was idle its subscriber is invoked on this call;
    /// otherwise it starts when the items ahead of it complete. The only
    /// failure modes are a resolver contract violation and, when a per-shard
    /// capacity is configured, backpressure.
    pub fn process_sequentially<I, S>(
        &self,
        input: SequentialInput<I, S>,
    ) -> Result<(), EnqueueError>
    where
        I: Send + 'static,
        S: Subscriber<I>,
    {
        let inner = &self.inner;
        let shard_count = inner.queues.shard_count();
        let shard = (input.resolver)(&input.payload, shard_count);
        if shard >= shard_count {
            let violation = ProgrammingError::ResolverOutOfRange {
                index: shard,
                shard_count,
            };
            #[cfg(feature = "tracing")]
            tracing::error!(processor = %inner.name, error = %violation, "queue resolver contract violation");
            return Err(violation.into());
        }

        let context = input.context;
        let payload = input.payload;
        let subscriber = input.subscriber;
        let run: Box<dyn FnOnce(Completion) + Send> =
            Box::new(move |completion| subscriber.subscribe(payload, completion));
        let item = EnqueuedInput::new(run, context, Instant::now());

        let outcome = inner.queues.enqueue(shard, item)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            processor = %inner.name,
            shard,
            unprocessed = outcome.unprocessed,
            "unprocessed_total"
        );
        #[cfg(feature = "metrics")]
        metrics::gauge!(
            "sequential_unprocessed_total",
            "processor" => inner.name.clone()
        )
        .set(outcome.unprocessed as f64);
        inner.events.emit(
            &inner.name,
            &ProcessorEvent::InputEnqueued {
                shard,
                unprocessed: outcome.unprocessed,
            },
        );

        if let Some(next) = outcome.start {
            inner.start(shard, next);
        }
        Ok(())
    }

    /// Advisory count of queued items across all shards, for gauges. Exact
    /// only at a consistent observation point under the queue lock.
    pub fn unprocessed(&self) -> u64 {
        self.inner.queues.unprocessed()
    }

    /// The configured shard count.
    pub fn shard_count(&self) -> usize {
        self.inner.queues.shard_count()
    }

    /// The advance task holds only a weak reference: dropping the last
    /// processor clone closes the channel once outstanding completions are
    /// done, and the task exits.
    fn spawn_advance_loop(
        inner: &Arc<ProcessorInner>,
        mut rx: mpsc::UnboundedReceiver<CompletionMsg>,
        runtime: tokio::runtime::Handle,
    ) {
        let weak: Weak<ProcessorInner> = Arc::downgrade(inner);
        runtime.spawn(async move {
            while let Some(msg) = rx.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                // A panic escaping here would kill the loop and stall every
                // shard; advancement must outlive any single bad item.
                let result = catch_unwind(AssertUnwindSafe(|| inner.advance(msg)));
                if result.is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        processor = %inner.name,
                        "panic while advancing a shard queue"
                    );
                }
            }
        });
    }
}

impl ProcessorInner {
    fn advance(&self, msg: CompletionMsg) {
        if msg.outcome == CompletionOutcome::Abandoned {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                processor = %self.name,
                shard = msg.shard,
                context = %msg.context,
                "completion handle dropped without being fired"
            );
        }
        self.events.emit(
            &self.name,
            &ProcessorEvent::InputCompleted {
                shard: msg.shard,
                outcome: msg.outcome,
            },
        );

        let (unprocessed, next) = self.queues.dequeue_head(msg.shard);
        #[cfg(feature = "metrics")]
        metrics::gauge!(
            "sequential_unprocessed_total",
            "processor" => self.name.clone()
        )
        .set(unprocessed as f64);
        #[cfg(not(feature = "metrics"))]
        let _ = unprocessed;

        if let Some(next) = next {
            self.start(msg.shard, next);
        }
    }

    /// Invokes the subscriber for a head item, outside the queue lock. A
    /// panicking `subscribe` is caught and logged; the completion handle it
    /// dropped has already queued the advance, so the shard moves on.
    fn start(&self, shard: usize, next: NextItem) {
        let waited = next.enqueued_at.elapsed();
        if waited > self.warn_after {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                processor = %self.name,
                shard,
                waiting_millis = waited.as_millis() as u64,
                context = %next.context,
                "enqueued_input_for_too_long"
            );
            #[cfg(feature = "metrics")]
            metrics::counter!(
                "sequential_slow_dequeue_total",
                "processor" => self.name.clone()
            )
            .increment(1);
            self.events.emit(
                &self.name,
                &ProcessorEvent::InputWaitedTooLong {
                    shard,
                    waited,
                    context: next.context.clone(),
                },
            );
        }
        self.events.emit(
            &self.name,
            &ProcessorEvent::InputStarted { shard, waited },
        );

        let completion = Completion::new(shard, next.context, self.completion_tx.clone());
        let run = next.run;
        if catch_unwind(AssertUnwindSafe(move || run(completion))).is_err() {
            #[cfg(feature = "tracing")]
            tracing::error!(processor = %self.name, shard, "subscriber panicked in subscribe");
            self.events
                .emit(&self.name, &ProcessorEvent::SubscriberPanicked { shard });
        }
    }
}
