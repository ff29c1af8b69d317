use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, warn};

use wire_codec::{integrity_tag, FrameDecoder, FrameEncoder};

use crate::ledger::Ledger;
use crate::message::{DecisionGate, Intercepted, Message, Resolve};
use crate::sequence::SequenceCounter;

/// Wait applied before retrying a failed bind or dial.
const BACKOFF_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-read deadline on the inbound connection.
const READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Per-write deadline on the outbound connection.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

const READ_BUFFER_SIZE: usize = 4096;

/// One relay unit: a source port the relay listens on and a destination
/// port it dials, joined by a pending-message [`Ledger`].
///
/// Each flow supervises at most one live TCP connection at a time; a new
/// connection is attempted only after the previous one has fully
/// terminated.  [`close`](Self::close) fires the channel's single-shot
/// shutdown signal and waits for both flows, including any in-progress
/// connection worker, to exit.
pub struct Channel {
    name: String,
    src_port: u16,
    dst_port: u16,
    ledger: Arc<Ledger>,
    shutdown_tx: watch::Sender<bool>,
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
}

impl Channel {
    /// Start both flows.  Every decoded message is stamped from `counter`,
    /// admitted to the channel's ledger, and published on `review_tx`
    /// together with its decision gate.
    pub fn spawn(
        name: String,
        src_port: u16,
        dst_port: u16,
        counter: SequenceCounter,
        review_tx: mpsc::Sender<Intercepted>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ledger, delivery_rx) = Ledger::new(shutdown_rx.clone());

        let inbound = tokio::spawn(run_inbound_flow(
            name.clone(),
            src_port,
            dst_port,
            counter,
            Arc::clone(&ledger),
            review_tx,
            shutdown_rx.clone(),
        ));
        let outbound = tokio::spawn(run_outbound_flow(
            name.clone(),
            dst_port,
            delivery_rx,
            shutdown_rx,
        ));

        Self {
            name,
            src_port,
            dst_port,
            ledger,
            shutdown_tx,
            inbound,
            outbound,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    /// The channel's ledger, shared with the review side for replay.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Signal shutdown and wait for every worker spawned on this channel's
    /// behalf to exit.  Abandons messages still pending at that point.
    pub async fn close(self) {
        debug!(channel = %self.name, "closing channel");
        self.shutdown_tx.send_replace(true);
        let _ = self.inbound.await;
        let _ = self.outbound.await;
        debug!(channel = %self.name, "channel closed");
    }
}

/// Resolves when the shutdown signal fires (or its sender is gone, which
/// only happens during teardown).
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Sleep out the reconnect backoff, returning early on shutdown.
async fn backoff(shutdown: &mut watch::Receiver<bool>) {
    tokio::select! {
        _ = stopped(shutdown) => {}
        _ = tokio::time::sleep(BACKOFF_TIMEOUT) => {}
    }
}

// ---------------------------------------------------------------------------
// Inbound flow: bind, accept one connection at a time, decode frames
// ---------------------------------------------------------------------------

async fn run_inbound_flow(
    name: String,
    src_port: u16,
    dst_port: u16,
    counter: SequenceCounter,
    ledger: Arc<Ledger>,
    review_tx: mpsc::Sender<Intercepted>,
    mut shutdown: watch::Receiver<bool>,
) {
    let addr = SocketAddr::from(([0, 0, 0, 0], src_port));

    loop {
        if *shutdown.borrow() {
            break;
        }

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                error!(channel = %name, %addr, %err, "bind failed");
                backoff(&mut shutdown).await;
                continue;
            }
        };
        debug!(channel = %name, %addr, "listening for inbound connection");

        // The accept loop exits on shutdown or on an accept error; the
        // outer loop then rebinds.
        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => {
                    debug!(channel = %name, "no longer listening for inbound connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(channel = %name, %peer, "accepted inbound connection");
                        // One live inbound connection per channel: accepting
                        // resumes only after this reader has terminated.
                        run_inbound_connection(
                            &name,
                            stream,
                            src_port,
                            dst_port,
                            &counter,
                            &ledger,
                            &review_tx,
                            &mut shutdown,
                        )
                        .await;
                    }
                    Err(err) => {
                        error!(channel = %name, %err, "accept failed");
                        break;
                    }
                }
            }
        }
    }
    debug!(channel = %name, "inbound flow terminated");
}

/// Read loop for one accepted connection.  Returns when the peer closes the
/// stream, a read fails, the peer violates the framing protocol, or
/// shutdown fires.
#[allow(clippy::too_many_arguments)]
async fn run_inbound_connection(
    name: &str,
    mut stream: TcpStream,
    src_port: u16,
    dst_port: u16,
    counter: &SequenceCounter,
    ledger: &Arc<Ledger>,
    review_tx: &mpsc::Sender<Intercepted>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut decoder = FrameDecoder::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    'conn: loop {
        if *shutdown.borrow() {
            break;
        }

        let n = tokio::select! {
            _ = stopped(shutdown) => break 'conn,
            read = timeout(READ_TIMEOUT, stream.read(&mut buf)) => match read {
                // Deadline with no bytes: not an error, try again.
                Err(_) => continue 'conn,
                Ok(Ok(0)) => {
                    debug!(channel = name, "inbound peer closed the stream");
                    break 'conn;
                }
                Ok(Ok(n)) => n,
                Ok(Err(err)) => {
                    error!(channel = name, %err, "read failed");
                    break 'conn;
                }
            },
        };

        let mut input = &buf[..n];
        while !input.is_empty() {
            match decoder.advance(&mut input) {
                Ok(None) => break,
                Ok(Some(payload)) => {
                    let sequence = counter.next();
                    let message = Message {
                        sequence,
                        integrity_tag: integrity_tag(&payload),
                        payload,
                        source: src_port.to_string(),
                        destination: dst_port.to_string(),
                    };
                    debug!(
                        channel = name,
                        sequence,
                        tag = message.integrity_tag,
                        size = message.len(),
                        "intercepted message"
                    );
                    ledger.admit(message.clone());

                    let gate =
                        DecisionGate::new(Arc::clone(ledger) as Arc<dyn Resolve>, sequence);
                    let intercepted = Intercepted { message, gate };
                    // The feed is bounded; a slow reviewer backpressures
                    // admission here, so the wait must race shutdown.
                    tokio::select! {
                        _ = stopped(shutdown) => break 'conn,
                        sent = review_tx.send(intercepted) => {
                            if sent.is_err() {
                                warn!(channel = name, sequence, "review feed closed; message left pending");
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(channel = name, %err, "framing violation; dropping connection");
                    break 'conn;
                }
            }
        }
    }
    debug!(channel = name, "closing inbound connection");
}

// ---------------------------------------------------------------------------
// Outbound flow: dial, drain the delivery queue, encode frames
// ---------------------------------------------------------------------------

async fn run_outbound_flow(
    name: String,
    dst_port: u16,
    mut delivery_rx: mpsc::Receiver<Message>,
    mut shutdown: watch::Receiver<bool>,
) {
    let addr = SocketAddr::from(([127, 0, 0, 1], dst_port));
    let mut in_flight: Option<Message> = None;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let stream = tokio::select! {
            _ = stopped(&mut shutdown) => break,
            dialed = timeout(BACKOFF_TIMEOUT, TcpStream::connect(addr)) => match dialed {
                Ok(Ok(stream)) => stream,
                Ok(Err(err)) => {
                    error!(channel = %name, %addr, %err, "connect failed");
                    backoff(&mut shutdown).await;
                    continue;
                }
                Err(_) => {
                    error!(channel = %name, %addr, "connect timed out");
                    backoff(&mut shutdown).await;
                    continue;
                }
            }
        };
        debug!(channel = %name, %addr, "established outbound connection");

        run_outbound_connection(&name, stream, &mut delivery_rx, &mut in_flight, &mut shutdown)
            .await;
    }
    debug!(channel = %name, "outbound flow terminated");
}

/// Write loop for one dialed connection.  Returns on write failure or
/// shutdown; a message interrupted mid-frame stays in `in_flight` and is
/// retransmitted in full on the next connection, since the dead connection
/// cannot have delivered a complete frame.
async fn run_outbound_connection(
    name: &str,
    mut stream: TcpStream,
    delivery_rx: &mut mpsc::Receiver<Message>,
    in_flight: &mut Option<Message>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut encoder = FrameEncoder::new();
    if let Some(msg) = in_flight.as_ref() {
        debug!(channel = name, sequence = msg.sequence, "retransmitting interrupted message");
        if encoder.begin(msg.payload.clone()).is_err() {
            // Unreachable for admitted messages; drop rather than wedge.
            *in_flight = None;
        }
    }

    'conn: loop {
        if *shutdown.borrow() {
            break;
        }

        if in_flight.is_none() {
            let msg = tokio::select! {
                _ = stopped(shutdown) => break 'conn,
                received = delivery_rx.recv() => match received {
                    Some(msg) => msg,
                    None => {
                        warn!(channel = name, "delivery queue closed");
                        break 'conn;
                    }
                }
            };
            debug!(
                channel = name,
                sequence = msg.sequence,
                tag = msg.integrity_tag,
                size = msg.len(),
                "sending message"
            );
            if let Err(err) = encoder.begin(msg.payload.clone()) {
                error!(channel = name, sequence = msg.sequence, %err, "unencodable message dropped");
                continue;
            }
            *in_flight = Some(msg);
        }

        let wrote = tokio::select! {
            _ = stopped(shutdown) => break 'conn,
            wrote = timeout(WRITE_TIMEOUT, stream.write(encoder.pending())) => wrote,
        };
        match wrote {
            // Deadline: retry the unwritten remainder.
            Err(_) => continue,
            Ok(Ok(0)) => {
                error!(channel = name, "outbound connection closed mid-write");
                break 'conn;
            }
            Ok(Ok(n)) => {
                encoder.consume(n);
                if encoder.is_done() {
                    if let Some(msg) = in_flight.take() {
                        debug!(channel = name, sequence = msg.sequence, "message sent");
                    }
                }
            }
            Ok(Err(err)) => {
                error!(channel = name, %err, "write failed");
                break 'conn;
            }
        }
    }
    debug!(channel = name, "closing outbound connection");
}
