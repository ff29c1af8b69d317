//! # relay-core
//!
//! The relay engine: an interceptable TCP relay that decodes length-prefixed
//! frames off an inbound connection, parks every message in a pending ledger,
//! and forwards it to the destination only once an external reviewer accepts
//! it.  Rejected messages are discarded.
//!
//! A [`Channel`] owns one (source port, destination port) pair and runs two
//! flows: an inbound listener that serves one live connection at a time, and
//! an outbound dialer that drains the ledger's delivery queue.  Several
//! channels may share one [`SequenceCounter`] so every in-flight message in
//! the process has a unique, time-ordered identity.
//!
//! ```rust,no_run
//! use relay_core::{Channel, SequenceCounter, REVIEW_FEED_CAPACITY};
//!
//! # async fn example() {
//! let counter = SequenceCounter::new();
//! let (review_tx, mut review_rx) = tokio::sync::mpsc::channel(REVIEW_FEED_CAPACITY);
//!
//! let channel = Channel::spawn("demo".into(), 9001, 9002, counter, review_tx);
//!
//! while let Some(intercepted) = review_rx.recv().await {
//!     // Every decoded message arrives here together with its decision gate.
//!     intercepted.gate.accept().await;
//! }
//! channel.close().await;
//! # }
//! ```

mod channel;
mod ledger;
mod message;
mod sequence;

pub use channel::Channel;
pub use ledger::{Ledger, DELIVERY_QUEUE_CAPACITY};
pub use message::{DecisionGate, Intercepted, Message, Outcome, Resolve};
pub use sequence::SequenceCounter;

/// Capacity of the review feed a [`Channel`] publishes intercepted messages
/// on.  Once full, message admission blocks until the reviewer side catches
/// up.
pub const REVIEW_FEED_CAPACITY: usize = 100;
