//! The request registry: single source of truth for request identity.
//!
//! Every fingerprint the engine knows about has exactly one entry here. The
//! registry must be consulted before any HTTP work is scheduled; it is what
//! guarantees at most one in-flight request per fingerprint.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::request::{FeedRequest, Fingerprint};

/// Lifecycle state of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryState {
    /// Admitted, waiting for a rate-limit slot.
    Pending,
    /// An HTTP attempt is outstanding.
    InFlight,
    /// Waiting out a retry delay or a periodic interval.
    Cooldown,
    /// Cancelled while in flight; removed once the attempt resolves.
    Cancelled,
}

struct ScheduledEntry {
    request: Arc<FeedRequest>,
    state: EntryState,
    /// Attempts within the current pull cycle, including the initial one.
    attempts: u32,
    /// Completed pull cycles, successful or given up.
    completed_pulls: u32,
    last_attempt: Option<Instant>,
    next_eligible: Option<Instant>,
    handle_id: Option<u64>,
    cancel: Arc<Notify>,
}

/// Outcome of [`RequestRegistry::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// Unseen fingerprint; the entry is now PENDING.
    Admitted,
    /// The fingerprint is pending, in flight, or cancelled-but-unresolved.
    DuplicateDrop,
    /// The fingerprint is cooling down; the existing entry re-dispatches at
    /// the given instant.
    CooldownDefer(Instant),
}

/// What the engine should do after a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SuccessOutcome {
    /// Emit the response; one-shot entry removed, or periodic entry done.
    EmitAndRemove,
    /// Emit the response; periodic entry rescheduled for the given instant.
    EmitAndReschedule(Instant),
    /// The entry was cancelled mid-flight; suppress the response.
    Suppressed,
}

/// What the engine should do after giving up on a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GiveUpOutcome {
    /// One-shot entry removed, or periodic entry done.
    Removed,
    /// Periodic entry stays scheduled for the given instant.
    Rescheduled(Instant),
    /// The entry was cancelled mid-flight.
    Suppressed,
}

struct RegistryInner {
    entries: HashMap<Fingerprint, ScheduledEntry>,
    handles: HashMap<u64, Fingerprint>,
    /// Cooldown deadlines, earliest first. Entries are lazily invalidated:
    /// a popped deadline is only honoured if it still matches the entry.
    wakeups: BinaryHeap<Reverse<(Instant, Fingerprint)>>,
}

/// Fingerprint-keyed request bookkeeping shared by the engine tasks.
pub(crate) struct RequestRegistry {
    inner: Mutex<RegistryInner>,
}

impl RequestRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                handles: HashMap::new(),
                wakeups: BinaryHeap::new(),
            }),
        }
    }

    /// Admits a submission, creating a PENDING entry for unseen
    /// fingerprints. O(1) on the fingerprint.
    pub(crate) fn admit(
        &self,
        request: &Arc<FeedRequest>,
        handle_id: Option<u64>,
    ) -> Admission {
        let fingerprint = request.fingerprint();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        if let Some(entry) = inner.entries.get(&fingerprint) {
            return match entry.state {
                EntryState::Pending | EntryState::InFlight | EntryState::Cancelled => {
                    Admission::DuplicateDrop
                }
                EntryState::Cooldown => match entry.next_eligible {
                    Some(at) => Admission::CooldownDefer(at),
                    None => Admission::DuplicateDrop,
                },
            };
        }

        inner.entries.insert(
            fingerprint,
            ScheduledEntry {
                request: Arc::clone(request),
                state: EntryState::Pending,
                attempts: 0,
                completed_pulls: 0,
                last_attempt: None,
                next_eligible: None,
                handle_id,
                cancel: Arc::new(Notify::new()),
            },
        );
        if let Some(id) = handle_id {
            inner.handles.insert(id, fingerprint);
        }
        Admission::Admitted
    }

    /// Transitions PENDING → IN_FLIGHT and counts the attempt. Returns the
    /// entry's cancel notifier and the attempt number within the current
    /// cycle, or `None` if the entry is gone or cancelled, in which case the
    /// dispatch must be abandoned.
    pub(crate) fn mark_in_flight(
        &self,
        fingerprint: Fingerprint,
        now: Instant,
    ) -> Option<(Arc<Notify>, u32)> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let entry = inner.entries.get_mut(&fingerprint)?;
        if entry.state == EntryState::Cancelled {
            return None;
        }
        entry.state = EntryState::InFlight;
        entry.attempts += 1;
        entry.last_attempt = Some(now);
        Some((Arc::clone(&entry.cancel), entry.attempts))
    }

    /// Closes a successful cycle. Periodic entries under their pull cap are
    /// placed in COOLDOWN until `next_tick`; everything else is removed.
    pub(crate) fn complete_success(
        &self,
        fingerprint: Fingerprint,
        next_tick: Option<Instant>,
    ) -> SuccessOutcome {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(&fingerprint) else {
            return SuccessOutcome::Suppressed;
        };
        if entry.state == EntryState::Cancelled {
            Self::remove_entry(inner, fingerprint);
            return SuccessOutcome::Suppressed;
        }

        entry.completed_pulls += 1;
        match next_tick {
            Some(at) if Self::under_pull_cap(entry) => {
                entry.state = EntryState::Cooldown;
                entry.attempts = 0;
                entry.next_eligible = Some(at);
                inner.wakeups.push(Reverse((at, fingerprint)));
                SuccessOutcome::EmitAndReschedule(at)
            }
            _ => {
                Self::remove_entry(inner, fingerprint);
                SuccessOutcome::EmitAndRemove
            }
        }
    }

    /// Places the entry in COOLDOWN for a retry of the current cycle.
    /// Returns false if the entry is gone or cancelled.
    pub(crate) fn schedule_retry(&self, fingerprint: Fingerprint, at: Instant) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(&fingerprint) else {
            return false;
        };
        if entry.state == EntryState::Cancelled {
            Self::remove_entry(inner, fingerprint);
            return false;
        }
        entry.state = EntryState::Cooldown;
        entry.next_eligible = Some(at);
        inner.wakeups.push(Reverse((at, fingerprint)));
        true
    }

    /// Closes a failed cycle after retries were exhausted. Periodic entries
    /// under their pull cap remain scheduled; one-shots are removed.
    pub(crate) fn complete_give_up(
        &self,
        fingerprint: Fingerprint,
        next_tick: Option<Instant>,
    ) -> GiveUpOutcome {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(&fingerprint) else {
            return GiveUpOutcome::Suppressed;
        };
        if entry.state == EntryState::Cancelled {
            Self::remove_entry(inner, fingerprint);
            return GiveUpOutcome::Suppressed;
        }

        entry.completed_pulls += 1;
        match next_tick {
            Some(at) if Self::under_pull_cap(entry) => {
                entry.state = EntryState::Cooldown;
                entry.attempts = 0;
                entry.next_eligible = Some(at);
                inner.wakeups.push(Reverse((at, fingerprint)));
                GiveUpOutcome::Rescheduled(at)
            }
            _ => {
                Self::remove_entry(inner, fingerprint);
                GiveUpOutcome::Removed
            }
        }
    }

    /// Cancels by fingerprint. An in-flight entry is marked CANCELLED and
    /// its abort notifier fired; the completion path removes it. Entries in
    /// any other state are removed outright.
    pub(crate) fn cancel(&self, fingerprint: Fingerprint) -> bool {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(entry) = inner.entries.get_mut(&fingerprint) else {
            return false;
        };
        match entry.state {
            EntryState::InFlight => {
                entry.state = EntryState::Cancelled;
                entry.cancel.notify_waiters();
            }
            EntryState::Cancelled => {}
            EntryState::Pending | EntryState::Cooldown => {
                Self::remove_entry(inner, fingerprint);
            }
        }
        true
    }

    /// Resolves an opaque periodic handle to its fingerprint.
    pub(crate) fn fingerprint_of_handle(&self, handle_id: u64) -> Option<Fingerprint> {
        self.inner.lock().handles.get(&handle_id).copied()
    }

    /// Pops every cooldown entry whose deadline has passed, transitions it
    /// back to PENDING, and returns its request for re-dispatch.
    pub(crate) fn due_requests(&self, now: Instant) -> Vec<Arc<FeedRequest>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let mut due = Vec::new();
        while let Some(Reverse((at, fingerprint))) = inner.wakeups.peek().copied() {
            if at > now {
                break;
            }
            inner.wakeups.pop();
            let Some(entry) = inner.entries.get_mut(&fingerprint) else {
                continue;
            };
            // Stale heap entry: the deadline was superseded or the entry
            // moved on. Only the matching cooldown deadline wakes it.
            if entry.state != EntryState::Cooldown || entry.next_eligible != Some(at) {
                continue;
            }
            entry.state = EntryState::Pending;
            entry.next_eligible = None;
            #[cfg(feature = "tracing")]
            if let Some(last) = entry.last_attempt {
                tracing::trace!(
                    fingerprint = %fingerprint,
                    idle_ms = now.duration_since(last).as_millis() as u64,
                    "cooldown wakeup"
                );
            }
            due.push(Arc::clone(&entry.request));
        }
        due
    }

    /// Number of live entries.
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn under_pull_cap(entry: &ScheduledEntry) -> bool {
        match entry.request.schedule().and_then(|s| s.max_pulls) {
            Some(cap) => entry.completed_pulls < cap,
            None => true,
        }
    }

    fn remove_entry(inner: &mut RegistryInner, fingerprint: Fingerprint) {
        if let Some(entry) = inner.entries.remove(&fingerprint) {
            if let Some(id) = entry.handle_id {
                inner.handles.remove(&id);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn state_of(&self, fingerprint: Fingerprint) -> Option<EntryState> {
        self.inner.lock().entries.get(&fingerprint).map(|e| e.state)
    }
}

/// Computes the next periodic tick: `now + interval` plus a uniform random
/// slice of the configured jitter.
pub(crate) fn next_periodic_tick(now: Instant, interval: Duration, jitter: Duration) -> Instant {
    let jittered = if jitter.is_zero() {
        Duration::ZERO
    } else {
        use rand::Rng;
        rand::thread_rng().gen_range(Duration::ZERO..=jitter)
    };
    now + interval + jittered
}
