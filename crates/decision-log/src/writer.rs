use std::path::Path;

use tokio::io::AsyncWriteExt;

use crate::entry::DecisionRecord;

/// Errors that can occur during decision log I/O.
#[derive(Debug, thiserror::Error)]
pub enum LogWriteError {
    #[error("failed to create parent directories: {0}")]
    CreateDir(std::io::Error),

    #[error("failed to open decision log file: {0}")]
    OpenFile(std::io::Error),

    #[error("failed to serialize decision record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write to decision log: {0}")]
    Write(std::io::Error),

    #[error("failed to flush decision log: {0}")]
    Flush(std::io::Error),
}

/// Append-only file writer that serialises [`DecisionRecord`] values as
/// JSON-lines.
///
/// Each call to [`write`](Self::write) produces exactly one newline-terminated
/// JSON object in the output file.
pub struct RecordWriter {
    file: tokio::fs::File,
}

impl RecordWriter {
    /// Open (or create) the log file at `path` in append mode.
    ///
    /// Parent directories are created automatically if they do not exist.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, LogWriteError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(LogWriteError::CreateDir)?;
        }

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(LogWriteError::OpenFile)?;

        Ok(Self { file })
    }

    /// Serialise `record` as a single JSON line and append it to the file.
    pub async fn write(&mut self, record: &DecisionRecord) -> Result<(), LogWriteError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        self.file
            .write_all(&line)
            .await
            .map_err(LogWriteError::Write)?;

        Ok(())
    }

    /// Flush the underlying file, ensuring all buffered data reaches disk.
    pub async fn flush(&mut self) -> Result<(), LogWriteError> {
        self.file.flush().await.map_err(LogWriteError::Flush)
    }
}

#[cfg(test)]
mod tests {
    use crate::entry::DecisionEvent;

    use super::*;

    fn scratch_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("decision-log-{}-{name}.jsonl", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn writes_one_json_object_per_line() {
        let path = scratch_path("lines");
        let mut writer = RecordWriter::new(&path).await.unwrap();

        for event in [DecisionEvent::ReviewStarted, DecisionEvent::ReviewStopped] {
            writer
                .write(&DecisionRecord::new(event, serde_json::json!({})))
                .await
                .unwrap();
        }
        writer.flush().await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: DecisionRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.event, DecisionEvent::ReviewStarted);
        let second: DecisionRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.event, DecisionEvent::ReviewStopped);

        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn creates_missing_parent_directories() {
        let dir = std::env::temp_dir().join(format!("decision-log-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested/decisions.jsonl");

        let mut writer = RecordWriter::new(&path).await.unwrap();
        writer
            .write(&DecisionRecord::new(
                DecisionEvent::ReviewStarted,
                serde_json::json!({}),
            ))
            .await
            .unwrap();
        writer.flush().await.unwrap();

        assert!(path.exists());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
