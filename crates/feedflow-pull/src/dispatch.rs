//! HTTP dispatch: one transport client per priority class, with response
//! resolution hopped off the transport's own completion context.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify, OwnedSemaphorePermit, Semaphore};
use tower::ServiceExt;
use tower_service::Service;

use crate::error::FetchError;
use crate::request::{FeedRequest, Priority};

/// A successful HTTP exchange as seen by the engine.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The 2xx status the transport accepted.
    pub status: u16,
    /// The response body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Convenience constructor for a 200 response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// The HTTP transport collaborator.
///
/// Implementations resolve with the body on 2xx and reject with a
/// categorised [`FetchError`] otherwise. Per-request timeouts are the
/// transport's responsibility. Implementations must be safe to share across
/// tasks; the dispatcher holds one instance per priority class.
pub trait HttpTransport: Send + Sync {
    /// Issues an asynchronous GET for the request.
    fn get(&self, request: &FeedRequest) -> BoxFuture<'static, Result<RawResponse, FetchError>>;

    /// Releases transport resources. Idempotent; the default does nothing.
    fn shutdown(&self) {}
}

impl<T: HttpTransport + ?Sized> HttpTransport for Arc<T> {
    fn get(&self, request: &FeedRequest) -> BoxFuture<'static, Result<RawResponse, FetchError>> {
        (**self).get(request)
    }

    fn shutdown(&self) {
        (**self).shutdown()
    }
}

/// Adapter exposing any clonable tower service as an [`HttpTransport`], so
/// callers can bring their own middleware stack as the transport.
#[derive(Clone)]
pub struct TowerTransport<S> {
    inner: S,
}

impl<S> TowerTransport<S> {
    /// Wraps a tower service.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S> HttpTransport for TowerTransport<S>
where
    S: Service<FeedRequest, Response = RawResponse, Error = FetchError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    fn get(&self, request: &FeedRequest) -> BoxFuture<'static, Result<RawResponse, FetchError>> {
        let service = self.inner.clone();
        let request = request.clone();
        Box::pin(service.oneshot(request))
    }
}

/// Bounded execution context for response resolution.
///
/// Transport futures run on the wrapped runtime handle; each resolved
/// response then holds one of `max_parallel` delivery slots until the
/// engine has finished publishing it. Slow downstream consumers therefore
/// apply backpressure to delivery, never to HTTP reception.
#[derive(Clone)]
pub struct DeliveryExecutor {
    handle: Handle,
    permits: Arc<Semaphore>,
}

impl DeliveryExecutor {
    /// Default number of concurrently-delivered responses.
    pub const DEFAULT_PARALLELISM: usize = 16;

    /// Creates a delivery executor on the given runtime handle.
    pub fn new(handle: Handle, max_parallel: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// Creates a delivery executor on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called from outside a tokio runtime.
    pub fn current(max_parallel: usize) -> Self {
        Self::new(Handle::current(), max_parallel)
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }
}

/// Terminal state of one dispatched attempt.
#[derive(Debug)]
pub(crate) enum DispatchResult {
    /// The transport resolved, successfully or not.
    Done(Result<RawResponse, FetchError>),
    /// The attempt was aborted by a cancel of its fingerprint.
    Cancelled,
    /// The attempt was aborted by engine shutdown.
    ShutDown,
}

/// A resolved dispatch carrying its delivery slot. The slot is held until
/// this value is dropped, which the engine does after publishing.
#[derive(Debug)]
pub(crate) struct ResolvedDispatch {
    pub(crate) outcome: DispatchResult,
    _slot: Option<OwnedSemaphorePermit>,
}

impl ResolvedDispatch {
    /// Splits the outcome from the delivery slot so the caller can keep the
    /// slot alive while it publishes.
    pub(crate) fn into_parts(self) -> (DispatchResult, Option<OwnedSemaphorePermit>) {
        (self.outcome, self._slot)
    }
}

/// Owns one transport client per priority class and resolves attempts on
/// the delivery executor.
pub(crate) struct HttpDispatcher {
    // Fixed array indexed by Priority::index(); classes are known at build
    // time, so no map lookup on the hot path.
    clients: [Arc<dyn HttpTransport>; Priority::COUNT],
    delivery: DeliveryExecutor,
    shutdown_notify: Arc<Notify>,
    shut_down: AtomicBool,
}

impl HttpDispatcher {
    pub(crate) fn new(
        factory: &(dyn Fn(Priority) -> Arc<dyn HttpTransport>),
        delivery: DeliveryExecutor,
    ) -> Self {
        Self {
            clients: std::array::from_fn(|i| factory(Priority::ALL[i])),
            delivery,
            shutdown_notify: Arc::new(Notify::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Hands the request to its class's transport. The returned channel
    /// resolves on the delivery executor, never on the transport's own
    /// completion context. `cancel` aborts the attempt best-effort.
    pub(crate) fn send(
        &self,
        request: Arc<FeedRequest>,
        cancel: Arc<Notify>,
    ) -> oneshot::Receiver<ResolvedDispatch> {
        let (tx, rx) = oneshot::channel();
        if self.shut_down.load(Ordering::SeqCst) {
            let _ = tx.send(ResolvedDispatch {
                outcome: DispatchResult::ShutDown,
                _slot: None,
            });
            return rx;
        }

        let transport = Arc::clone(&self.clients[request.priority().index()]);
        let shutdown = Arc::clone(&self.shutdown_notify);
        let permits = Arc::clone(&self.delivery.permits);
        self.delivery.handle().spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.notified() => DispatchResult::Cancelled,
                _ = shutdown.notified() => DispatchResult::ShutDown,
                result = transport.get(&request) => DispatchResult::Done(result),
            };
            let slot = permits.acquire_owned().await.ok();
            let _ = tx.send(ResolvedDispatch {
                outcome,
                _slot: slot,
            });
        });
        rx
    }

    /// Aborts outstanding attempts and closes all per-priority clients.
    pub(crate) fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown_notify.notify_waiters();
        for client in &self.clients {
            client.shutdown();
        }
    }
}
