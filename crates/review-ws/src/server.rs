use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::dispatcher::{stopped, DispatcherHandle, SESSION_QUEUE_CAPACITY};
use crate::session::run_session;

/// Run the review WebSocket server until shutdown fires.
///
/// Binds on `port`, upgrades each TCP connection to a WebSocket, and runs
/// one session task per reviewer.  Sessions register with the dispatcher on
/// connect and unregister on the way out.
pub async fn run_review_server(
    port: u16,
    handle: DispatcherHandle,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "review server listening");

    loop {
        tokio::select! {
            _ = stopped(&mut shutdown) => {
                debug!("review server no longer accepting sessions");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, remote_addr) = accepted?;
                let handle = handle.clone();
                let shutdown = shutdown.clone();

                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, remote_addr, handle, shutdown).await {
                        error!(%remote_addr, %err, "session handler error");
                    }
                });
            }
        }
    }
}

/// Handle a single TCP connection from WebSocket handshake through session
/// teardown.
async fn handle_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    handle: DispatcherHandle,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let session_id = uuid::Uuid::new_v4().to_string();
    info!(%session_id, %remote_addr, "review session connected");

    let (queue_tx, queue_rx) = mpsc::channel(SESSION_QUEUE_CAPACITY);
    handle.register(session_id.clone(), queue_tx).await;
    run_session(session_id.clone(), ws, handle.clone(), queue_rx, shutdown).await;
    handle.unregister(session_id.clone()).await;

    info!(%session_id, %remote_addr, "review session closed");
    Ok(())
}
