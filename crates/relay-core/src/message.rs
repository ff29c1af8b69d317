use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// A reviewer's verdict on a pending message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Queue the message for delivery to the destination.
    Accept,
    /// Discard the message; it is never delivered.
    Reject,
}

/// The unit of interception: one decoded frame plus its identity.
#[derive(Debug, Clone)]
pub struct Message {
    /// Globally unique, strictly increasing in decode order across every
    /// channel sharing the same counter.
    pub sequence: u64,
    /// CRC-64 (ISO) over the payload.  Informational; the relay never
    /// re-verifies it.
    pub integrity_tag: u64,
    pub payload: Bytes,
    /// Decimal source port, for display and audit only.
    pub source: String,
    /// Decimal destination port, for display and audit only.
    pub destination: String,
}

impl Message {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// The seam between decision gates and whatever tracks pending messages.
///
/// [`Ledger`](crate::Ledger) is the production implementation; tests swap in
/// recording stubs.
#[async_trait]
pub trait Resolve: Send + Sync {
    /// Apply `outcome` to the pending message with this sequence number.
    ///
    /// A sequence number that is unknown or already resolved is a no-op, so
    /// duplicate decisions are harmless.
    async fn resolve(&self, sequence: u64, outcome: Outcome);
}

/// Capability handle for deciding one specific message.
///
/// A gate is a reference to the owning ledger plus the message's sequence
/// number; cloning it never widens what it can decide.
#[derive(Clone)]
pub struct DecisionGate {
    resolver: Arc<dyn Resolve>,
    sequence: u64,
}

impl DecisionGate {
    pub fn new(resolver: Arc<dyn Resolve>, sequence: u64) -> Self {
        Self { resolver, sequence }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub async fn accept(&self) {
        self.resolver.resolve(self.sequence, Outcome::Accept).await;
    }

    pub async fn reject(&self) {
        self.resolver.resolve(self.sequence, Outcome::Reject).await;
    }

    pub async fn resolve(&self, outcome: Outcome) {
        self.resolver.resolve(self.sequence, outcome).await;
    }
}

impl fmt::Debug for DecisionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionGate")
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

/// What the review feed carries: the message and the gate that decides it.
#[derive(Debug, Clone)]
pub struct Intercepted {
    pub message: Message,
    pub gate: DecisionGate,
}
