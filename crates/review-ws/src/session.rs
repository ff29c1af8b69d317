use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, warn};

use relay_core::Outcome;

use crate::dispatcher::{stopped, DispatcherHandle};
use crate::protocol::{ClientMessage, Kind, ServerMessage};

const PING_PERIOD: Duration = Duration::from_secs(5);
/// Must exceed the ping period, or healthy peers get dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(15);
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

/// One reviewer session: pumps queued entries out, decisions and replay
/// requests in, and keeps the socket alive with pings.
///
/// Returns when the peer disconnects, goes silent past [`IDLE_TIMEOUT`],
/// the session queue closes (dispatcher teardown), or shutdown fires.
pub(crate) async fn run_session(
    id: String,
    ws: WebSocketStream<TcpStream>,
    handle: DispatcherHandle,
    mut queue_rx: mpsc::Receiver<ServerMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut sink, mut stream) = ws.split();
    let mut ping = tokio::time::interval(PING_PERIOD);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => {
                let _ = timeout(WRITE_TIMEOUT, sink.send(WsMessage::Close(None))).await;
                break;
            }

            queued = queue_rx.recv() => match queued {
                Some(msg) => {
                    if !send_json(&id, &mut sink, &msg).await {
                        break;
                    }
                }
                None => {
                    // Dispatcher dropped our queue; say goodbye.
                    debug!(session_id = %id, "sending close message");
                    let _ = timeout(WRITE_TIMEOUT, sink.send(WsMessage::Close(None))).await;
                    break;
                }
            },

            _ = ping.tick() => {
                if last_seen.elapsed() > IDLE_TIMEOUT {
                    warn!(session_id = %id, "peer silent past the idle limit");
                    break;
                }
                match timeout(WRITE_TIMEOUT, sink.send(WsMessage::Ping(Vec::new()))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        error!(session_id = %id, %err, "failed to send ping message");
                        break;
                    }
                    Err(_) => {
                        error!(session_id = %id, "timed out sending ping message");
                        break;
                    }
                }
            }

            frame = stream.next() => match frame {
                None => {
                    debug!(session_id = %id, "websocket closed by peer");
                    break;
                }
                Some(Err(err)) => {
                    error!(session_id = %id, %err, "failed to receive websocket frame");
                    break;
                }
                Some(Ok(frame)) => {
                    last_seen = Instant::now();
                    match frame {
                        WsMessage::Text(text) => handle_text(&id, &text, &handle).await,
                        WsMessage::Ping(data) => {
                            let _ = timeout(WRITE_TIMEOUT, sink.send(WsMessage::Pong(data))).await;
                        }
                        WsMessage::Close(frame) => {
                            debug!(session_id = %id, ?frame, "received close message");
                            break;
                        }
                        // Pongs refresh `last_seen` above; binary frames are
                        // not part of the review protocol.
                        _ => {}
                    }
                }
            },
        }
    }
    debug!(session_id = %id, "session loop finished");
}

/// Serialize and send one outbound message; `false` means the session is
/// over.
async fn send_json(id: &str, sink: &mut WsSink, msg: &ServerMessage) -> bool {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(err) => {
            error!(session_id = id, %err, "failed to serialize message");
            return true;
        }
    };
    debug!(session_id = id, %text, "sending json message");
    match timeout(WRITE_TIMEOUT, sink.send(WsMessage::Text(text))).await {
        Ok(Ok(())) => true,
        Ok(Err(err)) => {
            error!(session_id = id, %err, "failed to send json message");
            false
        }
        Err(_) => {
            error!(session_id = id, "timed out sending json message");
            false
        }
    }
}

async fn handle_text(id: &str, text: &str, handle: &DispatcherHandle) {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(err) => {
            debug!(session_id = id, %err, "ignoring unparseable message");
            return;
        }
    };
    debug!(session_id = id, ?msg, "received json message");

    match msg.kind {
        Kind::Request => {
            if msg.request == "db" {
                handle.replay(id.to_string()).await;
            } else {
                debug!(session_id = id, request = %msg.request, "ignoring unknown request");
            }
        }
        Kind::Response => {
            let sequence: u64 = match msg.msg_number.parse() {
                Ok(n) => n,
                Err(err) => {
                    debug!(session_id = id, %err, "cannot parse message number");
                    return;
                }
            };
            let outcome = if msg.data == "1" {
                Outcome::Accept
            } else {
                Outcome::Reject
            };
            handle.decide(sequence, outcome).await;
        }
        _ => debug!(session_id = id, kind = ?msg.kind, "ignoring message"),
    }
}
