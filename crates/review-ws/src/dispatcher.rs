use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use decision_log::{DecisionEvent, DecisionLog, DecisionRecord};
use relay_core::{Intercepted, Ledger, Outcome};

use crate::protocol::{PendingEntry, ServerMessage};

/// Capacity of each session's outbound message queue.
pub(crate) const SESSION_QUEUE_CAPACITY: usize = 128;

/// Resolves when the shutdown signal fires (or its sender is gone, which
/// only happens during teardown).
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

pub(crate) enum Command {
    Register {
        id: String,
        queue: mpsc::Sender<ServerMessage>,
    },
    Unregister {
        id: String,
    },
    Decision {
        sequence: u64,
        outcome: Outcome,
    },
    Replay {
        id: String,
    },
}

/// Cloneable handle for talking to a running [`Dispatcher`].
///
/// Sessions use it to submit decisions and replay requests; the server uses
/// it to register and unregister sessions.  Commands sent after the
/// dispatcher has shut down are dropped with a debug log.
#[derive(Clone)]
pub struct DispatcherHandle {
    commands: mpsc::Sender<Command>,
}

impl DispatcherHandle {
    async fn send(&self, command: Command) {
        if self.commands.send(command).await.is_err() {
            debug!("dispatcher is gone; command dropped");
        }
    }

    pub async fn register(&self, id: String, queue: mpsc::Sender<ServerMessage>) {
        self.send(Command::Register { id, queue }).await;
    }

    pub async fn unregister(&self, id: String) {
        self.send(Command::Unregister { id }).await;
    }

    /// Route a reviewer's decision to the owning ledger by sequence number.
    pub async fn decide(&self, sequence: u64, outcome: Outcome) {
        self.send(Command::Decision { sequence, outcome }).await;
    }

    /// Ask for everything still pending to be re-sent to this session.
    pub async fn replay(&self, id: String) {
        self.send(Command::Replay { id }).await;
    }
}

/// The review hub: drains the channels' review feed, fans pending messages
/// out to every live session, and routes decisions back into the ledgers.
///
/// Also the producer for the decision log; every interception, decision,
/// and session lifecycle event leaves a record.
pub struct Dispatcher {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handle: DispatcherHandle,
    task: JoinHandle<()>,
}

impl Dispatcher {
    /// Start the dispatcher task.  `ledgers` are enumerated, never mutated,
    /// when a session requests a replay of the pending state.
    pub fn spawn(
        feed_rx: mpsc::Receiver<Intercepted>,
        ledgers: Vec<Arc<Ledger>>,
        log: DecisionLog,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (commands_tx, commands_rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
        let task = tokio::spawn(run_dispatcher(
            feed_rx,
            ledgers,
            log,
            commands_rx,
            shutdown_rx.clone(),
        ));
        Self {
            shutdown_tx,
            shutdown_rx,
            handle: DispatcherHandle {
                commands: commands_tx,
            },
            task,
        }
    }

    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// The shutdown signal shared with the server and session loops.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Signal shutdown and wait for the dispatcher task to exit.  Session
    /// queues are dropped on the way out, which tells each session loop to
    /// close its socket.
    pub async fn close(self) {
        debug!("closing dispatcher");
        self.shutdown_tx.send_replace(true);
        let _ = self.task.await;
        debug!("dispatcher closed");
    }
}

async fn run_dispatcher(
    mut feed_rx: mpsc::Receiver<Intercepted>,
    ledgers: Vec<Arc<Ledger>>,
    log: DecisionLog,
    mut commands: mpsc::Receiver<Command>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sessions: HashMap<String, mpsc::Sender<ServerMessage>> = HashMap::new();
    // Gates for messages shown to reviewers but not yet decided, by
    // sequence number.
    let mut undecided: BTreeMap<u64, Intercepted> = BTreeMap::new();
    let mut feed_open = true;

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => break,
            item = feed_rx.recv(), if feed_open => match item {
                Some(intercepted) => {
                    log.record(
                        DecisionRecord::new(
                            DecisionEvent::MessageIntercepted,
                            serde_json::json!({}),
                        )
                        .with_message(&intercepted.message),
                    )
                    .await;
                    fan_out(
                        &mut sessions,
                        ServerMessage::Pending(PendingEntry::from_message(&intercepted.message)),
                    );
                    undecided.insert(intercepted.message.sequence, intercepted);
                }
                None => {
                    // All channels are gone; keep serving session commands.
                    debug!("review feed closed");
                    feed_open = false;
                }
            },
            command = commands.recv() => match command {
                Some(command) => {
                    handle_command(command, &mut sessions, &mut undecided, &ledgers, &log).await;
                }
                None => break,
            },
        }
    }
    sessions.clear();
}

/// Queue `msg` on every live session, dropping sessions whose queue has
/// closed.  A full queue skips this entry for that session rather than
/// stalling the feed.
fn fan_out(sessions: &mut HashMap<String, mpsc::Sender<ServerMessage>>, msg: ServerMessage) {
    sessions.retain(|id, queue| match queue.try_send(msg.clone()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(session_id = %id, "session queue full; entry dropped");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!(session_id = %id, "session queue closed; dropping session");
            false
        }
    });
}

async fn handle_command(
    command: Command,
    sessions: &mut HashMap<String, mpsc::Sender<ServerMessage>>,
    undecided: &mut BTreeMap<u64, Intercepted>,
    ledgers: &[Arc<Ledger>],
    log: &DecisionLog,
) {
    match command {
        Command::Register { id, queue } => {
            if sessions.contains_key(&id) {
                warn!(session_id = %id, "duplicate session registration");
                return;
            }
            let _ = queue.try_send(ServerMessage::hello());
            sessions.insert(id.clone(), queue);
            debug!(session_id = %id, "session registered");
            log.record(DecisionRecord::new(
                DecisionEvent::SessionOpened,
                serde_json::json!({ "session_id": id }),
            ))
            .await;
        }
        Command::Unregister { id } => {
            if sessions.remove(&id).is_some() {
                debug!(session_id = %id, "session unregistered");
                log.record(DecisionRecord::new(
                    DecisionEvent::SessionClosed,
                    serde_json::json!({ "session_id": id }),
                ))
                .await;
            } else {
                warn!(session_id = %id, "unknown session unregistration");
            }
        }
        Command::Decision { sequence, outcome } => match undecided.remove(&sequence) {
            Some(intercepted) => {
                let event = match outcome {
                    Outcome::Accept => DecisionEvent::MessageAccepted,
                    Outcome::Reject => DecisionEvent::MessageRejected,
                };
                log.record(
                    DecisionRecord::new(event, serde_json::json!({}))
                        .with_message(&intercepted.message),
                )
                .await;
                // May wait when the delivery queue is full; decision
                // throughput is deliberately tied to transmit throughput.
                intercepted.gate.resolve(outcome).await;
            }
            None => {
                debug!(sequence, "decision for unknown or already-decided message");
                log.record(DecisionRecord {
                    sequence: Some(sequence),
                    ..DecisionRecord::new(DecisionEvent::DecisionIgnored, serde_json::json!({}))
                })
                .await;
            }
        },
        Command::Replay { id } => {
            let Some(queue) = sessions.get(&id) else {
                warn!(session_id = %id, "replay request from unknown session");
                return;
            };
            // Enumerate the pending sets without mutating them.
            for ledger in ledgers {
                for message in ledger.pending_snapshot() {
                    let entry = ServerMessage::Pending(PendingEntry::from_message(&message));
                    if queue.try_send(entry).is_err() {
                        warn!(session_id = %id, "session queue full during replay");
                        return;
                    }
                }
            }
        }
    }
}
