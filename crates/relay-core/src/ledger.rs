use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::message::{Message, Outcome, Resolve};

/// Capacity of the accepted-but-unsent delivery queue.  A full queue blocks
/// the resolver, tying decision throughput to transmit throughput.
pub const DELIVERY_QUEUE_CAPACITY: usize = 100;

/// Per-channel ledger of messages awaiting a decision, plus the bounded
/// queue of accepted messages awaiting transmission.
///
/// Messages are admitted in strictly increasing sequence order (one live
/// inbound connection per channel), so the pending set stays sorted and
/// resolution uses binary search.  The pending set sits behind a mutex;
/// the delivery queue's own bounded blocking supplies the producer/consumer
/// handoff to the outbound writer.
pub struct Ledger {
    pending: Mutex<Vec<Message>>,
    delivery_tx: mpsc::Sender<Message>,
    shutdown: watch::Receiver<bool>,
}

impl Ledger {
    /// Build a ledger wired to the given shutdown signal.  Returns the
    /// receiving end of the delivery queue for the outbound writer to drain.
    pub fn new(shutdown: watch::Receiver<bool>) -> (Arc<Self>, mpsc::Receiver<Message>) {
        let (delivery_tx, delivery_rx) = mpsc::channel(DELIVERY_QUEUE_CAPACITY);
        let ledger = Arc::new(Self {
            pending: Mutex::new(Vec::new()),
            delivery_tx,
            shutdown,
        });
        (ledger, delivery_rx)
    }

    /// Append a freshly decoded message to the pending set.
    pub fn admit(&self, message: Message) {
        let mut pending = self.pending.lock().expect("pending set lock poisoned");
        debug_assert!(
            pending.last().map_or(true, |m| m.sequence < message.sequence),
            "admission must preserve sequence order"
        );
        pending.push(message);
    }

    /// Apply a reviewer's decision to the message with this sequence number.
    ///
    /// A miss (unknown or already-resolved sequence) is a logged no-op.  On
    /// accept, the message moves to the delivery queue; if the queue is full
    /// this waits until the writer drains a slot or shutdown fires, whichever
    /// comes first.
    pub async fn resolve(&self, sequence: u64, outcome: Outcome) {
        let removed = {
            let mut pending = self.pending.lock().expect("pending set lock poisoned");
            match pending.binary_search_by_key(&sequence, |m| m.sequence) {
                Ok(i) => Some(pending.remove(i)),
                Err(_) => None,
            }
        };

        let Some(message) = removed else {
            tracing::debug!(sequence, "ignoring duplicate or unknown decision");
            return;
        };

        match outcome {
            Outcome::Reject => {
                tracing::debug!(
                    sequence,
                    tag = message.integrity_tag,
                    size = message.len(),
                    "message rejected"
                );
            }
            Outcome::Accept => {
                tracing::debug!(
                    sequence,
                    tag = message.integrity_tag,
                    size = message.len(),
                    "message accepted"
                );
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    _ = shutdown.wait_for(|stop| *stop) => {
                        tracing::debug!(sequence, "shutdown while enqueueing accepted message");
                    }
                    sent = self.delivery_tx.send(message) => {
                        if sent.is_err() {
                            tracing::debug!(sequence, "delivery queue closed; accepted message dropped");
                        }
                    }
                }
            }
        }
    }

    /// Copy of the pending set, in sequence order.  Serves replay requests
    /// from the review side; never mutates the ledger.
    pub fn pending_snapshot(&self) -> Vec<Message> {
        self.pending
            .lock()
            .expect("pending set lock poisoned")
            .clone()
    }

    pub fn pending_len(&self) -> usize {
        self.pending
            .lock()
            .expect("pending set lock poisoned")
            .len()
    }
}

#[async_trait]
impl Resolve for Ledger {
    async fn resolve(&self, sequence: u64, outcome: Outcome) {
        Ledger::resolve(self, sequence, outcome).await;
    }
}
