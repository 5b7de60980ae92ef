//! The sharded queue set: fixed FIFO queues plus a shared total counter,
//! all under one lock.
//!
//! A single process-wide lock serialises every queue mutation together with
//! the counter update. Critical sections only ever enqueue, dequeue and
//! peek; subscriber invocation, I/O and logging all happen outside the
//! lock, so per-shard locking would buy little and would need two-phase
//! acquisition to keep the counter consistent.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use feedflow_core::LogContext;
use parking_lot::Mutex;

use crate::error::EnqueueError;
use crate::subscriber::Completion;

/// A queued work item, type-erased behind its run closure.
///
/// The closure closes over the payload and subscriber of whatever type the
/// caller submitted; the queue itself stays monomorphic. While the head
/// item is being processed its closure slot is empty and the item remains
/// queued as the in-flight marker.
pub(crate) struct EnqueuedInput {
    run: Option<Box<dyn FnOnce(Completion) + Send>>,
    context: LogContext,
    enqueued_at: Instant,
}

impl EnqueuedInput {
    pub(crate) fn new(
        run: Box<dyn FnOnce(Completion) + Send>,
        context: LogContext,
        enqueued_at: Instant,
    ) -> Self {
        Self {
            run: Some(run),
            context,
            enqueued_at,
        }
    }
}

/// A head item ready to start, extracted under the lock.
pub(crate) struct NextItem {
    pub(crate) run: Box<dyn FnOnce(Completion) + Send>,
    pub(crate) context: LogContext,
    pub(crate) enqueued_at: Instant,
}

impl std::fmt::Debug for NextItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextItem")
            .field("context", &self.context)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Result of an enqueue.
pub(crate) struct EnqueueOutcome {
    /// Total queued items across all shards after the enqueue.
    pub(crate) unprocessed: u64,
    /// Present when the shard was empty before the enqueue, in which case
    /// the caller is now responsible for starting this item.
    pub(crate) start: Option<NextItem>,
}

impl std::fmt::Debug for EnqueueOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnqueueOutcome")
            .field("unprocessed", &self.unprocessed)
            .field("start", &self.start)
            .finish()
    }
}

struct QueueSetInner {
    shards: Vec<VecDeque<EnqueuedInput>>,
    total: u64,
}

/// Fixed mapping from shard index to a FIFO queue, with a shared counter.
pub(crate) struct ShardedQueueSet {
    inner: Mutex<QueueSetInner>,
    /// Mirror of the locked counter for advisory reads on hot paths.
    advisory_total: AtomicU64,
    shard_count: usize,
    per_shard_capacity: Option<usize>,
}

impl ShardedQueueSet {
    pub(crate) fn new(shard_count: usize, per_shard_capacity: Option<usize>) -> Self {
        let mut shards = Vec::with_capacity(shard_count);
        shards.resize_with(shard_count, VecDeque::new);
        Self {
            inner: Mutex::new(QueueSetInner { shards, total: 0 }),
            advisory_total: AtomicU64::new(0),
            shard_count,
            per_shard_capacity,
        }
    }

    pub(crate) fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Appends an item to its shard. If the shard was empty, the item's run
    /// closure is taken out and returned: the caller must start it, because
    /// no completion callback is outstanding to do so.
    pub(crate) fn enqueue(
        &self,
        shard: usize,
        item: EnqueuedInput,
    ) -> Result<EnqueueOutcome, EnqueueError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let queue = &mut inner.shards[shard];

        if let Some(capacity) = self.per_shard_capacity {
            if queue.len() >= capacity {
                return Err(EnqueueError::Backpressure { shard, capacity });
            }
        }

        let was_empty = queue.is_empty();
        queue.push_back(item);
        let start = if was_empty {
            let head = queue
                .front_mut()
                .and_then(|head| Self::take_next(head));
            debug_assert!(head.is_some());
            head
        } else {
            None
        };

        inner.total += 1;
        let unprocessed = inner.total;
        self.advisory_total.store(unprocessed, Ordering::Relaxed);
        Ok(EnqueueOutcome { unprocessed, start })
    }

    /// Removes the just-finished head of a shard and extracts the new head,
    /// if any, for the caller to start.
    pub(crate) fn dequeue_head(&self, shard: usize) -> (u64, Option<NextItem>) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let queue = &mut inner.shards[shard];

        if queue.pop_front().is_some() {
            inner.total -= 1;
        }
        let next = inner.shards[shard]
            .front_mut()
            .and_then(|head| Self::take_next(head));

        let unprocessed = inner.total;
        self.advisory_total.store(unprocessed, Ordering::Relaxed);
        (unprocessed, next)
    }

    /// Advisory total of queued items; exact only under the lock.
    pub(crate) fn unprocessed(&self) -> u64 {
        self.advisory_total.load(Ordering::Relaxed)
    }

    fn take_next(head: &mut EnqueuedInput) -> Option<NextItem> {
        head.run.take().map(|run| NextItem {
            run,
            context: head.context.clone(),
            enqueued_at: head.enqueued_at,
        })
    }

    #[cfg(test)]
    pub(crate) fn shard_len(&self, shard: usize) -> usize {
        self.inner.lock().shards[shard].len()
    }

    #[cfg(test)]
    pub(crate) fn locked_total(&self) -> u64 {
        self.inner.lock().total
    }

    #[cfg(test)]
    pub(crate) fn shard_sizes_sum(&self) -> u64 {
        self.inner
            .lock()
            .shards
            .iter()
            .map(|q| q.len() as u64)
            .sum()
    }
}
