//! Sharded per-key FIFO dispatcher.
//!
//! The processor guarantees that work items mapping to the same shard are
//! processed strictly in submission order, one at a time, while items on
//! different shards run with unbounded parallelism. Correctness of
//! downstream reactive stages (per match, per tournament) rests on exactly
//! this property.
//!
//! Three pieces cooperate:
//!
//! - **Sharded queue set** — a fixed array of FIFO queues (default 100,000)
//!   plus a shared total counter, all under a single short-held lock.
//! - **Processor** — routes each input to a shard via its queue resolver,
//!   enqueues, and starts the head item when the shard was idle.
//! - **Completion protocol** — subscribers own a [`Completion`] handle and
//!   fire it exactly once; a dedicated advance task consumes completion
//!   messages, pops the finished head and starts the successor.
//!
//! A subscriber that never completes parks its shard forever; that is the
//! price of the ordering guarantee. Items that wait longer than a threshold
//! (default 2 seconds) are logged so such stalls are observable.
//!
//! # Basic Example
//!
//! ```rust,no_run
//! use feedflow_sequential::{
//!     key_resolver, FutureSubscriber, SequentialInput, SequentialProcessor,
//! };
//!
//! # #[tokio::main(flavor = "multi_thread")]
//! # async fn main() {
//! let processor = SequentialProcessor::builder()
//!     .name("match-updates")
//!     .build();
//!
//! struct Update {
//!     match_id: u64,
//!     payload: Vec<u8>,
//! }
//!
//! processor
//!     .process_sequentially(SequentialInput::new(
//!         Update { match_id: 7, payload: vec![] },
//!         key_resolver(|update: &Update| update.match_id),
//!         FutureSubscriber::new(|update: Update| async move {
//!             // all updates for match 7 run through here one at a time
//!             let _ = update.payload;
//!             Ok::<_, std::convert::Infallible>(())
//!         }),
//!     ))
//!     .unwrap();
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod processor;
mod queues;
pub mod subscriber;

pub use config::ProcessorConfigBuilder;
pub use error::EnqueueError;
pub use events::ProcessorEvent;
pub use input::{key_resolver, QueueResolver, SequentialInput};
pub use processor::{SequentialProcessor, DEFAULT_SHARD_COUNT, DEFAULT_WARN_AFTER};
pub use subscriber::{Completion, CompletionOutcome, FutureSubscriber, Subscriber};
