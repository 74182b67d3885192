// ── Worker → shell messages ──
//
// A session's worker reports through one bounded mpsc queue. Sends are
// awaited so nothing is dropped, and there is a single producer, so the
// shell sees messages in the order they were produced.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

use crate::ports::Severity;
use crate::sync::SyncProgress;

/// Queue capacity between the worker and the shell.
pub const MESSAGE_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub processed_files: u64,
    pub total_files: u64,
    pub percent: f64,
    pub current_operation: String,
}

impl From<&SyncProgress> for ProgressUpdate {
    fn from(p: &SyncProgress) -> Self {
        Self {
            processed_files: p.processed_files(),
            total_files: p.total_files(),
            percent: p.percent(),
            current_operation: p.current_operation().to_owned(),
        }
    }
}

/// Terminal result of a session; exactly one per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { processed: u64 },
    NoFiles,
    Failed { reason: String },
    Cancelled { processed: u64 },
}

impl SessionOutcome {
    /// Whether downstream steps (such as an importer) should run.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::NoFiles)
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { processed } => write!(f, "completed ({processed} files)"),
            Self::NoFiles => f.write_str("no files to sync"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Cancelled { processed } => write!(f, "cancelled after {processed} files"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    Progress(ProgressUpdate),
    Status { message: String, severity: Severity },
    NoFiles,
    Finished(SessionOutcome),
}

/// Producer half of the session queue, handed to the worker.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::Sender<SessionMessage>,
}

/// Create a session queue of the given capacity.
pub fn channel(capacity: usize) -> (Reporter, mpsc::Receiver<SessionMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Reporter { tx }, rx)
}

impl Reporter {
    async fn send(&self, msg: SessionMessage) {
        if self.tx.send(msg).await.is_err() {
            debug!("session receiver dropped, message discarded");
        }
    }

    pub async fn status(&self, message: impl Into<String>, severity: Severity) {
        self.send(SessionMessage::Status {
            message: message.into(),
            severity,
        })
        .await;
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.status(message, Severity::Info).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.status(message, Severity::Error).await;
    }

    pub async fn progress(&self, progress: &SyncProgress) {
        self.send(SessionMessage::Progress(progress.into())).await;
    }

    pub async fn no_files(&self) {
        self.send(SessionMessage::NoFiles).await;
    }

    pub async fn finished(&self, outcome: SessionOutcome) {
        self.send(SessionMessage::Finished(outcome)).await;
    }
}
