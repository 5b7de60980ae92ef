//! Contract-violation errors shared across the pipeline.

/// A violation of an API contract by the caller.
///
/// These are never recovered from: the operation that detected the violation
/// is abandoned and the error is logged. They indicate a bug in the calling
/// code, not a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgrammingError {
    /// A rate-limit permit was released against a limiter that did not
    /// issue it.
    #[error("permit issued by limiter {issued_by} released against limiter {released_against}")]
    ForeignPermit {
        /// Instance id of the limiter that issued the permit.
        issued_by: u64,
        /// Instance id of the limiter the permit was released against.
        released_against: u64,
    },

    /// A queue resolver returned a shard index outside `[0, shard_count)`.
    #[error("queue resolver returned shard {index} for a processor with {shard_count} shards")]
    ResolverOutOfRange {
        /// The out-of-range index returned by the resolver.
        index: usize,
        /// The processor's configured shard count.
        shard_count: usize,
    },
}
