//! Configuration and builder for the sequential processor.

use std::sync::Arc;
use std::time::Duration;

use feedflow_core::events::EventSink;
use tokio::sync::mpsc;

use crate::events::ProcessorEvent;
use crate::processor::{ProcessorInner, SequentialProcessor, DEFAULT_SHARD_COUNT, DEFAULT_WARN_AFTER};
use crate::queues::ShardedQueueSet;
use crate::subscriber::CompletionOutcome;

/// Builder for [`SequentialProcessor`].
pub struct ProcessorConfigBuilder {
    shard_count: usize,
    warn_after: Duration,
    per_shard_capacity: Option<usize>,
    name: String,
    runtime: Option<tokio::runtime::Handle>,
    events: EventSink<ProcessorEvent>,
}

impl Default for ProcessorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessorConfigBuilder {
    /// Creates a builder with defaults.
    ///
    /// Defaults:
    /// - shard_count: 100_000
    /// - warn_after: 2s
    /// - per_shard_capacity: unbounded
    /// - name: `"sequential-processor"`
    pub fn new() -> Self {
        Self {
            shard_count: DEFAULT_SHARD_COUNT,
            warn_after: DEFAULT_WARN_AFTER,
            per_shard_capacity: None,
            name: "sequential-processor".to_string(),
            runtime: None,
            events: EventSink::new(),
        }
    }

    /// Sets the fixed number of shards.
    ///
    /// Default: 100_000
    pub fn shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count.max(1);
        self
    }

    /// Sets the waiting-time threshold after which a starting input is
    /// logged with `enqueued_input_for_too_long`.
    ///
    /// Default: 2s
    pub fn warn_after(mut self, warn_after: Duration) -> Self {
        self.warn_after = warn_after;
        self
    }

    /// Caps each shard's queue; further submissions are rejected with a
    /// backpressure error until the shard drains.
    ///
    /// Default: unbounded
    pub fn per_shard_capacity(mut self, capacity: usize) -> Self {
        self.per_shard_capacity = Some(capacity.max(1));
        self
    }

    /// Sets the processor name used in events, logs and metric labels.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Runs the advance task on the given runtime instead of the one the
    /// builder is called on.
    pub fn runtime_handle(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Registers a callback for each enqueued input.
    ///
    /// Called with the shard index and the total unprocessed count after
    /// the enqueue.
    pub fn on_input_enqueued<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, u64) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let ProcessorEvent::InputEnqueued { shard, unprocessed } = event {
                f(*shard, *unprocessed);
            }
        });
        self
    }

    /// Registers a callback for each input whose subscriber is invoked.
    ///
    /// Called with the shard index and how long the input waited queued.
    pub fn on_input_started<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let ProcessorEvent::InputStarted { shard, waited } = event {
                f(*shard, *waited);
            }
        });
        self
    }

    /// Registers a callback for inputs that started only after waiting
    /// longer than the warning threshold.
    ///
    /// Called with the shard index and the waiting duration.
    pub fn on_input_waited_too_long<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let ProcessorEvent::InputWaitedTooLong { shard, waited, .. } = event {
                f(*shard, *waited);
            }
        });
        self
    }

    /// Registers a callback for each completed input.
    ///
    /// Called with the shard index and how the item's processing ended.
    pub fn on_input_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, CompletionOutcome) + Send + Sync + 'static,
    {
        self.events.subscribe(move |event| {
            if let ProcessorEvent::InputCompleted { shard, outcome } = event {
                f(*shard, *outcome);
            }
        });
        self
    }

    /// Builds and starts the processor.
    ///
    /// # Panics
    ///
    /// Panics if no runtime handle was supplied and the builder is used
    /// outside a tokio runtime.
    pub fn build(self) -> SequentialProcessor {
        let runtime = self
            .runtime
            .unwrap_or_else(tokio::runtime::Handle::current);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ProcessorInner {
            name: self.name,
            queues: ShardedQueueSet::new(self.shard_count, self.per_shard_capacity),
            completion_tx,
            warn_after: self.warn_after,
            events: self.events,
        });
        SequentialProcessor::from_parts(inner, completion_rx, runtime)
    }
}
