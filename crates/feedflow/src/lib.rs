//! Data-ingestion pipeline: priority-aware feed pulling and strictly-ordered
//! per-key processing.
//!
//! `feedflow` is the meta-crate for two cooperating subsystems, each also
//! available as an individual crate and gated here behind a feature:
//!
//! - **Pulling engine** (`pull`) — continuously scrapes many HTTP endpoints
//!   with per-priority rate limiting, fingerprint de-duplication, retries
//!   with backoff, periodic schedules, and a hot multicast response stream.
//! - **Sequential processor** (`sequential`) — a sharded per-key FIFO
//!   dispatcher guaranteeing at-most-one in-flight work item per key while
//!   letting distinct keys run fully in parallel.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! feedflow = { version = "0.1", features = ["full"] }
//! ```
//!
//! Wire the engine's response stream into the processor so every feed
//! response is handled in order per entity:
//!
//! ```rust,no_run
//! # #[cfg(all(feature = "pull", feature = "sequential"))]
//! # async fn example(engine: feedflow::pull::PullingEngine) {
//! use feedflow::core::LogContext;
//! use feedflow::sequential::{
//!     key_resolver, FutureSubscriber, SequentialInput, SequentialProcessor,
//! };
//!
//! let processor = SequentialProcessor::builder().name("feed-updates").build();
//! let mut responses = engine.responses();
//!
//! while let Ok(response) = responses.recv().await {
//!     let fingerprint = response.fingerprint();
//!     let input = SequentialInput::new(
//!         response,
//!         key_resolver(move |_response: &_| fingerprint),
//!         FutureSubscriber::new(|response: feedflow::pull::FeedResponse| async move {
//!             // decode and apply; responses for one feed arrive in order
//!             let _ = response.body();
//!             Ok::<_, std::convert::Infallible>(())
//!         }),
//!     )
//!     .context(LogContext::new().with("fingerprint", fingerprint.to_string()));
//!     let _ = processor.process_sequentially(input);
//! }
//! # }
//! ```

/// Shared infrastructure: events, log context, contract errors.
pub mod core {
    pub use feedflow_core::*;
}

/// The pulling engine subsystem.
#[cfg(feature = "pull")]
pub mod pull {
    pub use feedflow_pull::*;
}

/// The sequential processor subsystem.
#[cfg(feature = "sequential")]
pub mod sequential {
    pub use feedflow_sequential::*;
}
