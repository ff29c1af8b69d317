//! Append-only structured JSON-lines record of relay interceptions and
//! review decisions.
//!
//! Each event is serialised as a single newline-terminated JSON object and
//! appended to a log file, producing a [JSON Lines](https://jsonlines.org/)
//! stream that is easy to ship, parse, and replay when reconstructing what a
//! reviewer did during an experiment.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use decision_log::{DecisionEvent, DecisionLog, DecisionRecord};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (log, _handle) = DecisionLog::start("decisions.jsonl").await?;
//!
//! log.record(DecisionRecord::new(
//!     DecisionEvent::ReviewStarted,
//!     serde_json::json!({"version": "0.1.0"}),
//! ))
//! .await;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod sink;
pub mod writer;

// Re-export primary public types at the crate root for convenience.
pub use entry::{DecisionEvent, DecisionRecord};
pub use sink::DecisionLog;
pub use writer::{LogWriteError, RecordWriter};
