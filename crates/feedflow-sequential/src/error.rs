//! Error types for the sequential processor.

use feedflow_core::ProgrammingError;

/// Synchronous rejection of a [`process_sequentially`] call.
///
/// [`process_sequentially`]: crate::SequentialProcessor::process_sequentially
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    /// The input's queue resolver violated its contract.
    #[error(transparent)]
    Resolver(#[from] ProgrammingError),

    /// The target shard is at its configured capacity.
    #[error("shard {shard} is at capacity ({capacity})")]
    Backpressure {
        /// The shard that rejected the input.
        shard: usize,
        /// The configured per-shard capacity.
        capacity: usize,
    },
}
