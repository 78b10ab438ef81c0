//! Pre- and post-processing status events.
//!
//! Publication is not transactional: the handler logs a failed publish and
//! carries on.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dr_core::{ReceiptId, ReceiptRecord, RecordState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPhase {
    Pre,
    Post,
}

/// Status of one receipt, emitted before and after dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMessageEvent {
    pub phase: EventPhase,
    /// `None` when the receipt could not be persisted.
    pub receipt_id: Option<ReceiptId>,
    pub message_type: String,
    pub identifier: String,
    pub state: RecordState,
    pub emitted_at: DateTime<Utc>,
}

impl NotificationMessageEvent {
    pub fn for_receipt(phase: EventPhase, receipt: &ReceiptRecord) -> Self {
        Self {
            phase,
            receipt_id: receipt.id,
            message_type: receipt.message_type.clone(),
            identifier: receipt.identifier.clone(),
            state: receipt.state,
            emitted_at: Utc::now(),
        }
    }
}

/// External messaging destination for status events.
pub trait StatusPublisher: Send {
    fn publish(&mut self, event: &NotificationMessageEvent) -> std::io::Result<()>;
}

/// Emits events as tracing records only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

impl StatusPublisher for LogPublisher {
    fn publish(&mut self, event: &NotificationMessageEvent) -> std::io::Result<()> {
        tracing::info!(
            phase = ?event.phase,
            receipt_id = ?event.receipt_id,
            message_type = %event.message_type,
            identifier = %event.identifier,
            state = %event.state,
            "receipt status"
        );
        Ok(())
    }
}

/// Appends one JSON object per event to a file.
#[derive(Debug, Clone)]
pub struct EventLogPublisher {
    path: PathBuf,
}

impl EventLogPublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read back every event in the log. A missing log is empty.
    pub fn read_all(&self) -> std::io::Result<Vec<NotificationMessageEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        std::fs::read_to_string(&self.path)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(std::io::Error::other))
            .collect()
    }
}

impl StatusPublisher for EventLogPublisher {
    fn publish(&mut self, event: &NotificationMessageEvent) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let line = serde_json::to_string(event).map_err(std::io::Error::other)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}
