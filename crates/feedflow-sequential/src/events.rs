//! Events emitted by the sequential processor.

use std::time::Duration;

use feedflow_core::events::PipelineEvent;
use feedflow_core::LogContext;

use crate::subscriber::CompletionOutcome;

/// Events emitted by the sequential processor, delivered to callbacks
/// registered on the processor builder. The emitting processor names
/// itself at delivery time, so the variants carry only the facts of the
/// event.
#[derive(Debug, Clone)]
pub enum ProcessorEvent {
    /// An input was appended to its shard's queue. `unprocessed` is the
    /// total queued across all shards after this enqueue.
    InputEnqueued { shard: usize, unprocessed: u64 },
    /// An input reached the head of its shard and its subscriber was
    /// invoked, after `waited` queued behind earlier items.
    InputStarted { shard: usize, waited: Duration },
    /// An input started after waiting longer than the configured warning
    /// threshold, usually because an earlier subscriber is slow or stalled.
    InputWaitedTooLong {
        shard: usize,
        waited: Duration,
        context: LogContext,
    },
    /// An input's completion arrived and its shard advanced.
    InputCompleted {
        shard: usize,
        outcome: CompletionOutcome,
    },
    /// A subscriber panicked during `subscribe`. The shard still advances.
    SubscriberPanicked { shard: usize },
}

impl PipelineEvent for ProcessorEvent {
    fn kind(&self) -> &'static str {
        match self {
            ProcessorEvent::InputEnqueued { .. } => "input_enqueued",
            ProcessorEvent::InputStarted { .. } => "input_started",
            ProcessorEvent::InputWaitedTooLong { .. } => "input_waited_too_long",
            ProcessorEvent::InputCompleted { .. } => "input_completed",
            ProcessorEvent::SubscriberPanicked { .. } => "subscriber_panicked",
        }
    }
}
