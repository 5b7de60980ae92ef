//! Error types for the pulling engine.

use std::time::Instant;

use crate::request::Fingerprint;

/// A categorised fetch failure, consulted by the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// DNS, connection or TLS level failure before a response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport-enforced per-request timeout elapsed.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-2xx status.
    #[error("http status {0}")]
    Status(u16),

    /// The engine was shut down while the request was outstanding.
    #[error("engine shut down")]
    Shutdown,
}

impl FetchError {
    /// True for 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self, FetchError::Status(code) if (400..500).contains(code))
    }

    /// True for 5xx responses.
    pub fn is_server_error(&self) -> bool {
        matches!(self, FetchError::Status(code) if (500..600).contains(code))
    }

    /// Default retry classification: transport failures, timeouts and 5xx
    /// are retryable; 4xx and shutdown are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Timeout => true,
            FetchError::Status(_) => self.is_server_error(),
            FetchError::Shutdown => false,
        }
    }
}

/// Synchronous rejection of a submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// The fingerprint is already pending or in flight; the submission was
    /// dropped and the transport will not be invoked for it.
    #[error("request {fingerprint} is already pending or in flight")]
    Duplicate {
        /// Fingerprint of the colliding request.
        fingerprint: Fingerprint,
    },

    /// The fingerprint is cooling down after a failure or a periodic cycle.
    /// The existing registry entry will re-dispatch at `next_eligible`; this
    /// submission itself was dropped.
    #[error("request {fingerprint} is cooling down")]
    CooldownDeferred {
        /// Fingerprint of the colliding request.
        fingerprint: Fingerprint,
        /// When the existing entry becomes eligible again.
        next_eligible: Instant,
    },

    /// The engine no longer accepts submissions.
    #[error("engine is shutting down")]
    ShuttingDown,
}

/// Failure reading from the hot response stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The engine was dropped or shut down; no further responses will come.
    #[error("response stream closed")]
    Closed,

    /// The subscriber fell behind and `missed` responses were discarded for
    /// it. The stream is still usable afterwards.
    #[error("response stream lagged, {missed} responses dropped")]
    Lagged {
        /// Number of responses this subscriber missed.
        missed: u64,
    },
}
