//! Per-priority-class rate limiting.
//!
//! Each priority class owns an independent pool of permits, so contention on
//! a lower class can never delay a higher one. Within a class, waiters are
//! served in FIFO order (a property of [`tokio::sync::Semaphore`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use feedflow_core::ProgrammingError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::request::Priority;

/// Default concurrency cap per priority class.
pub const DEFAULT_CLASS_CAP: usize = 8;

static LIMITER_IDS: AtomicU64 = AtomicU64::new(1);

/// Per-class concurrency caps for the limiter.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub(crate) caps: [usize; Priority::COUNT],
}

impl RateLimitConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            caps: [DEFAULT_CLASS_CAP; Priority::COUNT],
        }
    }
}

/// Builder for [`RateLimitConfig`].
pub struct RateLimitConfigBuilder {
    caps: [usize; Priority::COUNT],
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitConfigBuilder {
    /// Creates a new builder with every class capped at
    /// [`DEFAULT_CLASS_CAP`].
    pub fn new() -> Self {
        Self {
            caps: [DEFAULT_CLASS_CAP; Priority::COUNT],
        }
    }

    /// Sets the concurrency cap for one priority class.
    pub fn cap(mut self, priority: Priority, cap: usize) -> Self {
        self.caps[priority.index()] = cap;
        self
    }

    /// Sets the same concurrency cap for every class.
    pub fn cap_all(mut self, cap: usize) -> Self {
        self.caps = [cap; Priority::COUNT];
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> RateLimitConfig {
        RateLimitConfig { caps: self.caps }
    }
}

/// The limiter was closed by engine shutdown while a waiter was queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limiter closed")]
pub struct LimiterClosed;

/// A held rate-limit slot for one priority class.
///
/// Dropping the permit returns the slot. [`PriorityRateLimiter::release`]
/// releases it explicitly; releasing twice is a no-op.
#[derive(Debug)]
pub struct PriorityPermit {
    limiter_id: u64,
    priority: Priority,
    inner: Option<OwnedSemaphorePermit>,
}

impl PriorityPermit {
    /// The class this permit was drawn from.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// True once the slot has been returned.
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }
}

/// Gates dispatch with one independent permit pool per priority class.
#[derive(Debug)]
pub struct PriorityRateLimiter {
    id: u64,
    pools: [Arc<Semaphore>; Priority::COUNT],
    caps: [usize; Priority::COUNT],
}

impl PriorityRateLimiter {
    /// Creates a limiter from the per-class caps.
    pub fn new(config: RateLimitConfig) -> Self {
        let caps = config.caps;
        Self {
            id: LIMITER_IDS.fetch_add(1, Ordering::Relaxed),
            pools: std::array::from_fn(|i| Arc::new(Semaphore::new(caps[i]))),
            caps,
        }
    }

    /// Waits for a slot in the given class and returns a permit.
    ///
    /// Waiters within one class are served in FIFO order. Waiters of other
    /// classes are unaffected. Fails only if the limiter was closed by
    /// shutdown.
    pub async fn acquire(&self, priority: Priority) -> Result<PriorityPermit, LimiterClosed> {
        let inner = Arc::clone(&self.pools[priority.index()])
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed)?;
        Ok(PriorityPermit {
            limiter_id: self.id,
            priority,
            inner: Some(inner),
        })
    }

    /// Explicitly returns a permit's slot.
    ///
    /// Releasing an already-released permit is a no-op. Releasing a permit
    /// issued by a different limiter instance is a contract violation and
    /// leaves the permit untouched.
    pub fn release(&self, permit: &mut PriorityPermit) -> Result<(), ProgrammingError> {
        if permit.limiter_id != self.id {
            return Err(ProgrammingError::ForeignPermit {
                issued_by: permit.limiter_id,
                released_against: self.id,
            });
        }
        drop(permit.inner.take());
        Ok(())
    }

    /// Advisory count of free slots in the given class.
    pub fn available_permits(&self, priority: Priority) -> usize {
        self.pools[priority.index()].available_permits()
    }

    /// The configured cap of the given class.
    pub fn cap(&self, priority: Priority) -> usize {
        self.caps[priority.index()]
    }

    /// Closes every pool, waking all queued waiters with [`LimiterClosed`].
    /// Held permits stay valid until dropped.
    pub(crate) fn close(&self) {
        for pool in &self.pools {
            pool.close();
        }
    }
}
