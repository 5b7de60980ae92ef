//! Events emitted by the pulling engine.

use std::time::Duration;

use feedflow_core::events::PipelineEvent;

use crate::request::{Fingerprint, Priority};

/// Events emitted by the pulling engine, delivered to callbacks registered
/// on the engine builder. The emitting engine names itself at delivery
/// time, so the variants carry only the facts of the event.
#[derive(Debug, Clone)]
pub enum PullEvent {
    /// A submission passed de-duplication and was accepted for dispatch.
    RequestAccepted {
        fingerprint: Fingerprint,
        priority: Priority,
    },
    /// A submission collided with a pending or in-flight fingerprint and
    /// was dropped.
    RequestDeduplicated { fingerprint: Fingerprint },
    /// A submission collided with a cooling-down fingerprint; the existing
    /// entry stays scheduled.
    RequestDeferred { fingerprint: Fingerprint },
    /// An HTTP attempt was handed to the transport.
    Dispatched {
        fingerprint: Fingerprint,
        attempt: u32,
    },
    /// A final response was published on the stream.
    ResponseReceived {
        fingerprint: Fingerprint,
        status: u16,
        elapsed: Duration,
    },
    /// A failed attempt will be retried after the given delay.
    RetryScheduled {
        fingerprint: Fingerprint,
        attempt: u32,
        delay: Duration,
    },
    /// Retries were exhausted or the error was not retryable; no response
    /// will be emitted for this cycle.
    GaveUp {
        fingerprint: Fingerprint,
        attempts: u32,
        reason: String,
    },
    /// A request was cancelled via its handle.
    Cancelled { fingerprint: Fingerprint },
    /// The engine shut down.
    ShutDown,
}

impl PipelineEvent for PullEvent {
    fn kind(&self) -> &'static str {
        match self {
            PullEvent::RequestAccepted { .. } => "request_accepted",
            PullEvent::RequestDeduplicated { .. } => "request_deduplicated",
            PullEvent::RequestDeferred { .. } => "request_deferred",
            PullEvent::Dispatched { .. } => "dispatched",
            PullEvent::ResponseReceived { .. } => "response_received",
            PullEvent::RetryScheduled { .. } => "retry_scheduled",
            PullEvent::GaveUp { .. } => "gave_up",
            PullEvent::Cancelled { .. } => "cancelled",
            PullEvent::ShutDown => "shut_down",
        }
    }
}
