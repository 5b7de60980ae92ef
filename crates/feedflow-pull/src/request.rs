//! The feed request model: priority classes, identity fingerprints, and
//! periodic schedules.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Priority class of a feed request.
///
/// The class decides which HTTP client and which rate-limit pool a request
/// uses. Classes are fully isolated from each other: saturating a lower
/// class never delays a higher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

impl Priority {
    /// Number of priority classes.
    pub const COUNT: usize = 5;

    /// All classes, highest first.
    pub const ALL: [Priority; Priority::COUNT] = [
        Priority::Highest,
        Priority::High,
        Priority::Medium,
        Priority::Low,
        Priority::Lowest,
    ];

    /// Stable index of this class, usable for fixed per-class arrays.
    pub fn index(self) -> usize {
        match self {
            Priority::Highest => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
            Priority::Lowest => 4,
        }
    }

    /// Short lowercase label, used in logs and metric labels.
    pub fn label(self) -> &'static str {
        match self {
            Priority::Highest => "highest",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Lowest => "lowest",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Deterministic identity of a [`FeedRequest`], used for de-duplication.
///
/// Two requests with equal fingerprints are considered the same request by
/// the registry, regardless of when or by whom they were submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Derives a fingerprint from the request's url, headers and tag.
    ///
    /// Header order matters: the same pairs in a different order produce a
    /// different identity, matching how proxies treat header sequences.
    pub fn derive(url: &str, headers: &[(String, String)], tag: Option<&str>) -> Self {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        for (name, value) in headers {
            name.hash(&mut hasher);
            value.hash(&mut hasher);
        }
        tag.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }

    /// Raw fingerprint value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Repeat schedule for a self-repeating pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub(crate) interval: Duration,
    pub(crate) jitter: Duration,
    pub(crate) max_pulls: Option<u32>,
}

impl Schedule {
    /// Creates a schedule that re-pulls every `interval` after each
    /// completed cycle, with no jitter and no pull cap.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            jitter: Duration::ZERO,
            max_pulls: None,
        }
    }

    /// Adds up to `jitter` of random delay on top of each interval, spreading
    /// periodic pulls for many entities away from each other.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Caps the number of completed pull cycles, after which the entry is
    /// removed from the registry.
    pub fn max_pulls(mut self, max_pulls: u32) -> Self {
        self.max_pulls = Some(max_pulls);
        self
    }

    /// The base repeat interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// An immutable description of one feed pull.
///
/// Built once via [`FeedRequest::builder`] and never mutated afterwards. The
/// engine shares it behind an `Arc` between the registry, the dispatcher and
/// retry bookkeeping.
#[derive(Debug, Clone)]
pub struct FeedRequest {
    url: String,
    host: String,
    port: u16,
    headers: Vec<(String, String)>,
    priority: Priority,
    tag: Option<String>,
    schedule: Option<Schedule>,
    retry_override: Option<Arc<RetryPolicy>>,
    fingerprint: Fingerprint,
}

impl FeedRequest {
    /// Starts building a request for `url`, resolved against `host:port`.
    pub fn builder(
        url: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> FeedRequestBuilder {
        FeedRequestBuilder {
            url: url.into(),
            host: host.into(),
            port,
            headers: Vec::new(),
            priority: Priority::Medium,
            tag: None,
            schedule: None,
            retry_override: None,
        }
    }

    /// The request URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The resolved host the transport connects to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The resolved port the transport connects to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// HTTP headers, in insertion order, duplicates preserved.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The priority class.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// The caller-supplied identity tag, if any.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The periodic schedule, if this is a self-repeating pull.
    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    /// A per-request retry policy overriding the engine default, if any.
    pub fn retry_override(&self) -> Option<&Arc<RetryPolicy>> {
        self.retry_override.as_ref()
    }

    /// The identity fingerprint used by the registry for de-duplication.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Returns a copy of this request carrying the given schedule. The
    /// schedule does not participate in the fingerprint.
    pub(crate) fn with_schedule(&self, schedule: Schedule) -> FeedRequest {
        let mut request = self.clone();
        request.schedule = Some(schedule);
        request
    }
}

/// Builder for [`FeedRequest`].
pub struct FeedRequestBuilder {
    url: String,
    host: String,
    port: u16,
    headers: Vec<(String, String)>,
    priority: Priority,
    tag: Option<String>,
    schedule: Option<Schedule>,
    retry_override: Option<Arc<RetryPolicy>>,
}

impl FeedRequestBuilder {
    /// Appends an HTTP header. Duplicate names are allowed and preserved in
    /// insertion order.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the priority class.
    ///
    /// Default: [`Priority::Medium`]
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets a caller-supplied tag that participates in the fingerprint, so
    /// that otherwise-identical pulls for different consumers stay distinct.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Makes the request self-repeating on the given schedule.
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Overrides the engine's default retry policy for this request.
    pub fn retry_policy(mut self, policy: Arc<RetryPolicy>) -> Self {
        self.retry_override = Some(policy);
        self
    }

    /// Builds the immutable request, deriving its fingerprint.
    pub fn build(self) -> FeedRequest {
        let fingerprint = Fingerprint::derive(&self.url, &self.headers, self.tag.as_deref());
        FeedRequest {
            url: self.url,
            host: self.host,
            port: self.port,
            headers: self.headers,
            priority: self.priority,
            tag: self.tag,
            schedule: self.schedule,
            retry_override: self.retry_override,
            fingerprint,
        }
    }
}
