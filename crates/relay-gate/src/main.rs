mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use decision_log::{DecisionEvent, DecisionLog, DecisionRecord};
use relay_core::{Channel, SequenceCounter, REVIEW_FEED_CAPACITY};
use review_ws::{run_review_server, Dispatcher};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();
    let pairs = cli.port_pairs()?;

    // 2. Load config, then merge CLI overrides.
    let mut cfg = config::load(&cli.config)?;
    if let Some(port) = cli.review_port {
        cfg.review.port = Some(port);
    }

    // 3. Init tracing-subscriber with JSON format.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    info!(
        config_file = %cli.config.display(),
        pairs = pairs.len(),
        review_port = ?cfg.review.port,
        "relay-gate starting"
    );

    // 4. Start the decision log.
    let (log, log_handle) = DecisionLog::start(&cfg.logging.decision_log_path)
        .await
        .context("failed to start decision log")?;

    log.record(DecisionRecord::new(
        DecisionEvent::ReviewStarted,
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "config_file": cli.config.display().to_string(),
        }),
    ))
    .await;

    // 5. Spawn one channel per port pair.  Every channel shares the same
    //    counter, so sequence numbers are unique process-wide, and the same
    //    review feed.
    let counter = SequenceCounter::new();
    let (review_tx, review_rx) = mpsc::channel(REVIEW_FEED_CAPACITY);

    let mut channels = Vec::new();
    for &(src, dst) in &pairs {
        let name = format!("{src}:{dst}");
        info!(%name, src, dst, "starting channel");
        channels.push(Channel::spawn(
            name,
            src,
            dst,
            counter.clone(),
            review_tx.clone(),
        ));
    }
    // The dispatcher sees the feed close once every channel is gone.
    drop(review_tx);

    // 6. Spawn the dispatcher over every channel's ledger.
    let ledgers = channels
        .iter()
        .map(|channel| Arc::clone(channel.ledger()))
        .collect();
    let dispatcher = Dispatcher::spawn(review_rx, ledgers, log.clone());

    // 7. Serve the review WebSocket when a port is configured.
    let server_task = cfg.review.port.map(|port| {
        let handle = dispatcher.handle();
        let shutdown = dispatcher.shutdown_signal();
        tokio::spawn(async move {
            if let Err(err) = run_review_server(port, handle, shutdown).await {
                error!(%err, "review server exited");
            }
        })
    });
    if server_task.is_none() {
        info!("review server is not serving");
    }

    // 8. Block until an interrupt or termination signal arrives.
    wait_for_shutdown_signal().await;

    // 9. Close every channel, then the review stack, then the log.
    info!("relay-gate shutting down");
    for channel in channels {
        channel.close().await;
    }
    dispatcher.close().await;
    if let Some(task) = server_task {
        let _ = task.await;
    }

    log.record(DecisionRecord::new(
        DecisionEvent::ReviewStopped,
        serde_json::json!({}),
    ))
    .await;

    // Dropping the last log handle closes its channel; the writer flushes
    // and exits.
    drop(log);
    let _ = log_handle.await;

    Ok(())
}

/// Wait for ctrl-c or SIGTERM.
async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (ctrl-c)");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT (ctrl-c)");
    }
}
