use std::path::Path;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::entry::DecisionRecord;
use crate::writer::RecordWriter;

/// Channel buffer size used between producers and the background writer task.
const CHANNEL_BUFFER: usize = 1024;

/// Flush the writer at most every this many seconds when the channel is idle.
const FLUSH_INTERVAL_SECS: u64 = 1;

/// A cheap, cloneable handle used to submit [`DecisionRecord`] values into
/// the background log-writer task.
///
/// `DecisionLog` is `Clone + Send + Sync` so it can be shared freely across
/// the dispatcher, sessions, and the composition root.
#[derive(Clone)]
pub struct DecisionLog {
    tx: mpsc::Sender<DecisionRecord>,
}

impl DecisionLog {
    /// Spawn the background writer task and return a `(log, join_handle)` pair.
    ///
    /// The writer opens (or creates) the file at `path` in append mode and
    /// begins draining records from the internal channel.  The background
    /// task will:
    ///
    /// * Write each record as a JSON line via [`RecordWriter`].
    /// * Flush periodically (every ~1 second of channel inactivity).
    /// * Flush once more when the last `DecisionLog` clone is dropped and the
    ///   channel closes, then exit cleanly.
    ///
    /// # Panics
    ///
    /// The background task will **not** panic.  I/O errors are logged via
    /// `tracing::error` and the record is skipped.
    pub async fn start(
        path: impl AsRef<Path>,
    ) -> Result<(Self, JoinHandle<()>), crate::writer::LogWriteError> {
        let (tx, rx) = mpsc::channel::<DecisionRecord>(CHANNEL_BUFFER);

        let mut writer = RecordWriter::new(path).await?;

        let handle = tokio::spawn(async move {
            run_writer_loop(&mut writer, rx).await;
        });

        Ok((Self { tx }, handle))
    }

    /// Send a record to the background writer.
    ///
    /// If the channel is full this will wait asynchronously until space is
    /// available.  If the background task has already exited (e.g. after a
    /// fatal I/O error) the record is silently dropped and a warning is
    /// logged.
    pub async fn record(&self, record: DecisionRecord) {
        if let Err(err) = self.tx.send(record).await {
            tracing::warn!(
                event = ?err.0.event,
                "decision log channel closed; record dropped"
            );
        }
    }
}

/// Core loop executed inside the background task.
///
/// Reads records from the channel and writes them to the log.  When the
/// channel has no records ready for [`FLUSH_INTERVAL_SECS`] the writer is
/// flushed.  On channel close a final flush is performed.
async fn run_writer_loop(writer: &mut RecordWriter, mut rx: mpsc::Receiver<DecisionRecord>) {
    let flush_interval = tokio::time::Duration::from_secs(FLUSH_INTERVAL_SECS);
    let mut dirty = false;

    loop {
        // Wait for the next record, but time out so we can periodically flush.
        let maybe_record = tokio::time::timeout(flush_interval, rx.recv()).await;

        match maybe_record {
            // Received a record before the timeout.
            Ok(Some(record)) => {
                if let Err(err) = writer.write(&record).await {
                    tracing::error!(%err, "failed to write decision record");
                } else {
                    dirty = true;
                }
            }
            // Channel closed: perform final flush and exit.
            Ok(None) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "failed to flush decision log on shutdown");
                    }
                }
                tracing::debug!("decision log background task shutting down");
                return;
            }
            // Timeout: flush if we have outstanding writes.
            Err(_) => {
                if dirty {
                    if let Err(err) = writer.flush().await {
                        tracing::error!(%err, "periodic decision log flush failed");
                    } else {
                        dirty = false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::entry::DecisionEvent;

    use super::*;

    #[tokio::test]
    async fn records_reach_the_file_after_the_log_is_dropped() {
        let path = std::env::temp_dir()
            .join(format!("decision-log-sink-{}.jsonl", uuid::Uuid::new_v4()));

        let (log, handle) = DecisionLog::start(&path).await.unwrap();
        log.record(DecisionRecord::new(
            DecisionEvent::MessageIntercepted,
            serde_json::json!({"via": "test"}),
        ))
        .await;

        // Dropping the last handle closes the channel; the writer performs a
        // final flush and exits.
        drop(log);
        handle.await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let record: DecisionRecord = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(record.event, DecisionEvent::MessageIntercepted);
        assert_eq!(record.details["via"], "test");

        let _ = tokio::fs::remove_file(&path).await;
    }
}
