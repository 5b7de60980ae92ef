//! The subscriber contract and the completion protocol that advances
//! shard queues.

use std::fmt;
use std::future::Future;

use feedflow_core::LogContext;
use tokio::sync::mpsc;

/// A user-supplied asynchronous unit of work.
///
/// The processor invokes [`subscribe`] once, on its dispatch path;
/// implementations must return quickly, typically by spawning their real
/// computation and moving the [`Completion`] into it. Exactly one of
/// [`Completion::succeed`] or [`Completion::fail`] must eventually be
/// called; until then, every later input for the same shard waits.
///
/// [`subscribe`]: Subscriber::subscribe
pub trait Subscriber<I>: Send + 'static {
    /// Starts the computation for `payload`. The completion handle must be
    /// fired exactly once, eventually.
    fn subscribe(self, payload: I, completion: Completion);
}

/// How an item's processing ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// The subscriber signalled success.
    Succeeded,
    /// The subscriber signalled failure. Failures advance the queue exactly
    /// like successes; the error itself is the subscriber's concern.
    Failed,
    /// The completion handle was dropped without being fired. A contract
    /// violation, logged and treated as completion so the shard does not
    /// stall forever.
    Abandoned,
}

pub(crate) struct CompletionMsg {
    pub(crate) shard: usize,
    pub(crate) outcome: CompletionOutcome,
    pub(crate) context: LogContext,
}

/// Completion handle for one queued item.
///
/// Consuming methods make double invocation unrepresentable: once the
/// handle is fired it is gone. Dropping an unfired handle counts as an
/// abandoned completion and still advances the shard.
pub struct Completion {
    shard: usize,
    context: LogContext,
    tx: mpsc::UnboundedSender<CompletionMsg>,
    fired: bool,
}

impl Completion {
    pub(crate) fn new(
        shard: usize,
        context: LogContext,
        tx: mpsc::UnboundedSender<CompletionMsg>,
    ) -> Self {
        Self {
            shard,
            context,
            tx,
            fired: false,
        }
    }

    /// The log context of the item being processed.
    pub fn context(&self) -> &LogContext {
        &self.context
    }

    /// Signals successful completion and releases the shard's head.
    pub fn succeed(mut self) {
        self.fire(CompletionOutcome::Succeeded);
    }

    /// Signals failed completion and releases the shard's head.
    ///
    /// The processor only records that the item finished; the error is not
    /// transformed or retried here.
    pub fn fail(mut self, error: impl fmt::Display) {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            shard = self.shard,
            context = %self.context,
            error = %error,
            "subscriber signalled failure"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = error;
        self.fire(CompletionOutcome::Failed);
    }

    fn fire(&mut self, outcome: CompletionOutcome) {
        self.fired = true;
        // A closed channel means the processor is gone; nothing to advance.
        let _ = self.tx.send(CompletionMsg {
            shard: self.shard,
            outcome,
            context: self.context.clone(),
        });
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.fired {
            self.fire(CompletionOutcome::Abandoned);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("shard", &self.shard)
            .field("fired", &self.fired)
            .finish()
    }
}

/// Adapter bridging an async closure to the completion protocol.
///
/// The closure runs as a spawned task on the captured runtime handle; its
/// `Ok`/`Err` result fires the matching completion callback.
///
/// # Example
///
/// ```rust
/// use feedflow_sequential::FutureSubscriber;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let subscriber = FutureSubscriber::new(|payload: String| async move {
///     if payload.is_empty() {
///         Err("empty payload")
///     } else {
///         Ok(())
///     }
/// });
/// # let _ = subscriber;
/// # }
/// ```
pub struct FutureSubscriber<F> {
    handle: tokio::runtime::Handle,
    f: F,
}

impl<F> FutureSubscriber<F> {
    /// Creates an adapter spawning on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from outside a tokio runtime.
    pub fn new(f: F) -> Self {
        Self::on(tokio::runtime::Handle::current(), f)
    }

    /// Creates an adapter spawning on the given runtime handle.
    pub fn on(handle: tokio::runtime::Handle, f: F) -> Self {
        Self { handle, f }
    }
}

impl<I, F, Fut, E> Subscriber<I> for FutureSubscriber<F>
where
    I: Send + 'static,
    F: FnOnce(I) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    fn subscribe(self, payload: I, completion: Completion) {
        let fut = (self.f)(payload);
        self.handle.spawn(async move {
            match fut.await {
                Ok(()) => completion.succeed(),
                Err(error) => completion.fail(error),
            }
        });
    }
}
