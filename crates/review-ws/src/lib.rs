//! # review-ws
//!
//! The WebSocket review front-end for relay-gate.  Intercepted messages are
//! fanned out to every connected reviewer session; sessions send back
//! accept/reject decisions that are routed into the owning channel's ledger
//! by sequence number.  A session can also ask for a replay of everything
//! still pending.
//!
//! The [`Dispatcher`] is the hub: it drains the review feed, tracks live
//! sessions and undecided gates, and records every interception and decision
//! to the decision log.  [`run_review_server`] accepts WebSocket connections
//! and runs one session loop per reviewer.

mod dispatcher;
mod protocol;
mod server;
mod session;

pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use protocol::{ClientMessage, Kind, PendingEntry, ServerMessage};
pub use server::run_review_server;
