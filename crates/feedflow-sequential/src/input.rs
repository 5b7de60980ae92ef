//! Work-item carrier and queue resolvers.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use feedflow_core::LogContext;

use crate::subscriber::Subscriber;

/// Pure function mapping an input plus the shard count to a shard index in
/// `[0, shard_count)`.
///
/// Resolvers must be deterministic: the same input must always map to the
/// same shard, or the per-key ordering guarantee evaporates.
pub type QueueResolver<I> = Arc<dyn Fn(&I, usize) -> usize + Send + Sync>;

/// Builds a resolver from a stable hash of a caller-chosen key field.
///
/// This is the typical resolver: pick the field that identifies the logical
/// entity (a match id, a tournament id) and every input for that entity
/// lands on the same shard.
///
/// # Example
///
/// ```rust
/// use feedflow_sequential::key_resolver;
///
/// struct OddsUpdate {
///     match_id: u64,
/// }
///
/// let resolver = key_resolver(|update: &OddsUpdate| update.match_id);
/// let shard = resolver(&OddsUpdate { match_id: 40291 }, 100_000);
/// assert!(shard < 100_000);
/// ```
pub fn key_resolver<I, K, F>(key_fn: F) -> impl Fn(&I, usize) -> usize + Send + Sync
where
    K: Hash,
    F: Fn(&I) -> K + Send + Sync,
{
    move |input, shard_count| {
        let mut hasher = DefaultHasher::new();
        key_fn(input).hash(&mut hasher);
        (hasher.finish() % shard_count as u64) as usize
    }
}

/// Carrier of one work item submitted to the processor.
///
/// Bundles the payload, the queue resolver that picks its shard, the
/// subscriber that will process it, and an opaque log context for
/// correlation.
pub struct SequentialInput<I, S> {
    pub(crate) payload: I,
    pub(crate) resolver: QueueResolver<I>,
    pub(crate) subscriber: S,
    pub(crate) context: LogContext,
}

impl<I, S> SequentialInput<I, S>
where
    S: Subscriber<I>,
{
    /// Creates an input with the given resolver and subscriber.
    pub fn new<R>(payload: I, resolver: R, subscriber: S) -> Self
    where
        R: Fn(&I, usize) -> usize + Send + Sync + 'static,
    {
        Self {
            payload,
            resolver: Arc::new(resolver),
            subscriber,
            context: LogContext::new(),
        }
    }

    /// Attaches a log context rendered into events and slow-item warnings.
    pub fn context(mut self, context: LogContext) -> Self {
        self.context = context;
        self
    }
}
