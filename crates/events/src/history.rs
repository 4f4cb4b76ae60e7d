//! Append-only JSONL history log.
//!
//! Every registry mutation appends one audit record describing the operation
//! and its parameters. The log is strictly best-effort: [`HistoryLog::append`]
//! is a non-blocking queue push, the writer runs as a long-lived background
//! task, and any failure — a full queue, an unwritable file — is logged and
//! swallowed. The engine never learns whether a record made it to disk.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Bounded queue capacity between producers and the writer task.
/// Records past this are dropped (drop-new) rather than stalling a mutation.
const QUEUE_CAPACITY: usize = 4096;

/// Cheaply cloneable handle for appending audit records.
#[derive(Clone)]
pub struct HistoryLog {
    tx: mpsc::Sender<serde_json::Value>,
}

impl HistoryLog {
    /// Create a log handle and the receiver half for the writer task.
    ///
    /// The caller spawns [`HistoryLog::run`] with the receiver; the writer
    /// exits once every handle clone has been dropped.
    pub fn channel() -> (Self, mpsc::Receiver<serde_json::Value>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// A log that discards every record. Used by tests and setups without a
    /// history file.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    /// Enqueue one audit record, fire-and-forget.
    ///
    /// Never blocks and never fails the caller: a full queue drops the
    /// record with a warning, a closed writer drops it silently.
    pub fn append(&self, record: serde_json::Value) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("History queue full, dropping audit record");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("History writer gone, dropping audit record");
            }
        }
    }

    /// Run the writer loop: append one JSON line per record to `path`.
    ///
    /// Exits when all [`HistoryLog`] handles have been dropped. Write errors
    /// are logged and the loop continues — losing audit records must never
    /// take the service down.
    pub async fn run(path: PathBuf, mut receiver: mpsc::Receiver<serde_json::Value>) {
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Cannot open history log");
                return;
            }
        };

        tracing::info!(path = %path.display(), "History log started");

        while let Some(record) = receiver.recv().await {
            let mut line = record.to_string();
            line.push('\n');
            if let Err(e) = file.write_all(line.as_bytes()).await {
                tracing::error!(error = %e, "Failed to append history record");
            }
        }

        let _ = file.flush().await;
        tracing::info!("History log closed");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
