//! Event fan-out for the pipeline components.
//!
//! Each component (an engine, a processor) owns an [`EventSink`] that the
//! config builders populate through their `on_*` methods. Emission is
//! synchronous on the thread that produced the event, so callbacks must be
//! cheap; anything slow belongs on a task of the callback's own making.
//!
//! A callback that panics is caught and counted — it can neither poison the
//! emitting component nor starve the callbacks registered after it.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

/// Implemented by the subsystem event enums.
pub trait PipelineEvent: fmt::Debug + Send + Sync {
    /// Stable snake_case name of the event variant, used in panic reports
    /// and metric labels.
    fn kind(&self) -> &'static str;
}

/// Ordered collection of event callbacks owned by one component.
///
/// The sink does not know which component it belongs to; the component
/// names itself on every [`emit`](EventSink::emit) so a single report
/// format serves every subsystem.
pub struct EventSink<E> {
    callbacks: Vec<Box<dyn Fn(&E) + Send + Sync>>,
    panicked: AtomicU64,
}

impl<E> EventSink<E> {
    /// Creates a sink with no callbacks.
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            panicked: AtomicU64::new(0),
        }
    }

    /// Appends a callback. Callbacks run in subscription order.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// True if no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Running count of callback invocations that panicked.
    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }
}

impl<E: PipelineEvent> EventSink<E> {
    /// Delivers `event` to every callback, in order.
    ///
    /// `component` names the emitting instance in panic reports. A
    /// panicking callback is counted and skipped; the remaining callbacks
    /// still run.
    pub fn emit(&self, component: &str, event: &E) {
        for (index, callback) in self.callbacks.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    component,
                    event = event.kind(),
                    callback = index,
                    "event callback panicked"
                );
                #[cfg(feature = "metrics")]
                metrics::counter!(
                    "feedflow_event_callback_panics_total",
                    "component" => component.to_string(),
                    "event" => event.kind()
                )
                .increment(1);
                #[cfg(not(feature = "tracing"))]
                let _ = index;
                #[cfg(not(any(feature = "tracing", feature = "metrics")))]
                let _ = component;
            }
        }
    }
}

impl<E> Default for EventSink<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventSink<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("callbacks", &self.callbacks.len())
            .field("panicked", &self.panicked())
            .finish()
    }
}
