//! Shared fakes for pulling-engine tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use feedflow_pull::{FeedRequest, FetchError, HttpTransport, Priority, RawResponse};
use futures::future::BoxFuture;

/// One scripted transport exchange.
#[derive(Debug, Clone)]
pub enum Step {
    /// Resolve with a 200 and this body.
    Ok(Vec<u8>),
    /// Resolve with a 200 and this body after a delay.
    OkAfter(Vec<u8>, Duration),
    /// Reject with the given status.
    Status(u16),
    /// Reject with a transport-level failure.
    Transport,
}

/// A transport that replays a script and records every call.
///
/// Once the script is exhausted, further calls resolve with an empty 200.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<Instant>>,
    call_count: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, _request: &FeedRequest) -> BoxFuture<'static, Result<RawResponse, FetchError>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Instant::now());
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Step::Ok(Vec::new()));
        Box::pin(async move {
            match step {
                Step::Ok(body) => Ok(RawResponse::ok(body)),
                Step::OkAfter(body, delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(RawResponse::ok(body))
                }
                Step::Status(code) => Err(FetchError::Status(code)),
                Step::Transport => Err(FetchError::Transport("connection reset".to_string())),
            }
        })
    }
}

/// Factory handing every priority class the same scripted transport.
pub fn shared_factory(
    transport: Arc<ScriptedTransport>,
) -> impl Fn(Priority) -> Arc<dyn HttpTransport> + 'static {
    move |_priority| Arc::clone(&transport) as Arc<dyn HttpTransport>
}

/// A request whose fingerprint is unique to `path`.
pub fn request(path: &str, priority: Priority) -> FeedRequest {
    FeedRequest::builder(path, "feeds.example.com", 443)
        .priority(priority)
        .build()
}
