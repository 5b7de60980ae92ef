//! Retry policy: a pure decision function over attempt counts and
//! categorised fetch errors.
//!
//! Attempt counting is 1-based and includes the initial attempt: the first
//! failure of a cycle reaches the policy as `attempts == 1`, and the delay
//! curve is indexed the same way. A policy with `max_attempts == 3`
//! therefore allows two retries before giving up.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchError;

/// Delay curve between the attempts of one pull cycle.
///
/// One parametric curve covers the shapes the engine needs: a constant
/// delay, geometric growth with a ceiling, and an optional random spread
/// that decorrelates retries of fingerprints that failed at the same
/// moment.
///
/// `delay_after(n)` is the cooldown after the `n`-th failed attempt, so
/// `Backoff::exponential(50ms).growth(3.0)` yields 50ms after the first
/// failure, 150ms after the second, 450ms after the third.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base: Duration,
    growth: f64,
    cap: Duration,
    spread: f64,
}

impl Backoff {
    /// Ceiling applied when none is set explicitly.
    pub const DEFAULT_CAP: Duration = Duration::from_secs(30);

    /// The same delay after every failed attempt.
    pub fn constant(delay: Duration) -> Self {
        Self {
            base: delay,
            growth: 1.0,
            cap: delay,
            spread: 0.0,
        }
    }

    /// Delays starting at `base` and doubling after each further failure,
    /// capped at [`Backoff::DEFAULT_CAP`].
    pub fn exponential(base: Duration) -> Self {
        Self {
            base,
            growth: 2.0,
            cap: Self::DEFAULT_CAP,
            spread: 0.0,
        }
    }

    /// Sets the per-failure growth factor. Factors below 1.0 are clamped
    /// to 1.0 (delays never shrink across a cycle).
    pub fn growth(mut self, factor: f64) -> Self {
        self.growth = factor.max(1.0);
        self
    }

    /// Sets the delay ceiling.
    pub fn cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    /// Randomizes each delay within `±(spread × delay)`. The factor is
    /// clamped to `[0.0, 1.0]`; zero (the default) keeps the curve
    /// deterministic.
    pub fn spread(mut self, spread: f64) -> Self {
        self.spread = spread.clamp(0.0, 1.0);
        self
    }

    /// The cooldown after the `attempts`-th failed attempt of a cycle
    /// (1-based, counting the initial attempt).
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let mut delay = self.base;
        for _ in 1..attempts.max(1) {
            if delay >= self.cap {
                break;
            }
            delay = delay.mul_f64(self.growth);
        }
        let delay = delay.min(self.cap);

        if self.spread == 0.0 {
            return delay;
        }
        use rand::Rng;
        let factor = rand::thread_rng().gen_range(1.0 - self.spread..=1.0 + self.spread);
        delay.mul_f64(factor)
    }
}

/// A caller-supplied delay schedule, indexed like [`Backoff::delay_after`].
type DelayFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

enum DelaySchedule {
    Curve(Backoff),
    Custom(DelayFn),
}

impl DelaySchedule {
    fn delay_after(&self, attempts: u32) -> Duration {
        match self {
            DelaySchedule::Curve(curve) => curve.delay_after(attempts),
            DelaySchedule::Custom(f) => f(attempts),
        }
    }
}

/// Predicate deciding whether a given fetch error is worth retrying.
pub type RetryPredicate = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;

/// Outcome of consulting the retry policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop retrying; the cycle failed.
    GiveUp,
    /// Place the fingerprint in cooldown and re-dispatch after the delay.
    RetryAfter(Duration),
}

/// Decides whether and when a failed request is retried.
///
/// The policy is a pure function of the attempt count and the error; the
/// engine consults it and hands the outcome to the registry, which owns
/// the cooldown bookkeeping.
pub struct RetryPolicy {
    max_attempts: u32,
    delay: DelaySchedule,
    predicate: Option<RetryPredicate>,
}

impl RetryPolicy {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 3 (1 initial attempt + 2 retries)
    /// - delay: `Backoff::exponential(100ms)`
    /// - predicate: retry transport errors, timeouts and 5xx; give up on 4xx
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Preset: 3 attempts starting at 100ms. The builder defaults, spelled
    /// out.
    pub fn standard() -> RetryPolicyBuilder {
        Self::builder()
            .max_attempts(3)
            .backoff(Backoff::exponential(Duration::from_millis(100)))
    }

    /// Preset: 5 attempts starting at 50ms, for latency-sensitive feeds
    /// whose upstream recovers quickly.
    pub fn aggressive() -> RetryPolicyBuilder {
        Self::builder()
            .max_attempts(5)
            .backoff(Backoff::exponential(Duration::from_millis(50)))
    }

    /// Preset: 2 attempts starting at 500ms, for upstreams already under
    /// load or with strict rate limits.
    pub fn conservative() -> RetryPolicyBuilder {
        Self::builder()
            .max_attempts(2)
            .backoff(Backoff::exponential(Duration::from_millis(500)))
    }

    /// The configured attempt cap, including the initial attempt.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides the fate of a request whose `attempts`-th attempt just
    /// failed with `error`. `attempts` includes the initial attempt, so
    /// the first failure arrives with `attempts == 1`.
    pub fn decide(&self, attempts: u32, error: &FetchError) -> RetryDecision {
        let attempts = attempts.max(1);
        if attempts >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let retryable = match &self.predicate {
            Some(predicate) => predicate(error),
            None => error.is_retryable(),
        };
        if !retryable {
            return RetryDecision::GiveUp;
        }

        RetryDecision::RetryAfter(self.delay.delay_after(attempts))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    delay: Option<DelaySchedule>,
    predicate: Option<RetryPredicate>,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicyBuilder {
    /// Creates a new builder with defaults.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            delay: None,
            predicate: None,
        }
    }

    /// Sets the maximum number of attempts, including the initial one, so
    /// `max_attempts(3)` means 1 initial attempt + 2 retries.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the delay curve between attempts.
    pub fn backoff(mut self, curve: Backoff) -> Self {
        self.delay = Some(DelaySchedule::Curve(curve));
        self
    }

    /// Sets a caller-supplied delay schedule, called with the failed
    /// attempt number (1-based, counting the initial attempt).
    pub fn backoff_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.delay = Some(DelaySchedule::Custom(Arc::new(f)));
        self
    }

    /// Sets a predicate deciding which errors are retried.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FetchError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Builds the policy.
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: self.delay.unwrap_or(DelaySchedule::Curve(Backoff::exponential(
                Duration::from_millis(100),
            ))),
            predicate: self.predicate,
        }
    }
}
