//! Lifecycle records written while a notification message is processed.
//!
//! A [`ReceiptRecord`] exists once per manifest instance, a [`DispatchRecord`] once per
//! dispatcher type actually invoked for it, and a [`FileRecord`] once per stored file.
//! Parents are referenced by id only; the store owns the records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatcher_type::DispatcherType;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Store-assigned identifier of a [`ReceiptRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReceiptId(pub u64);

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for ReceiptId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Store-assigned identifier of a [`DispatchRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DispatchId(pub u64);

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for DispatchId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Store-assigned identifier of a [`FileRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileRecordId(pub u64);

impl fmt::Display for FileRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for FileRecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Processing state shared by receipt and dispatch records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    #[default]
    Processing,
    Success,
    Failure,
}

impl RecordState {
    /// `true` for `Success` and `Failure`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RecordState::Processing)
    }
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::Processing => write!(f, "PROCESSING"),
            RecordState::Success => write!(f, "SUCCESS"),
            RecordState::Failure => write!(f, "FAILURE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Lifecycle record for one processed manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ReceiptId>,
    pub message_type: String,
    pub identifier: String,
    /// Earliest embedded filename timestamp; `None` when no file follows the convention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<String>,
    pub total_file_count: usize,
    pub state: RecordState,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl ReceiptRecord {
    pub fn new(
        message_type: impl Into<String>,
        identifier: impl Into<String>,
        total_file_count: usize,
    ) -> Self {
        Self {
            id: None,
            message_type: message_type.into(),
            identifier: identifier.into(),
            first_timestamp: None,
            last_timestamp: None,
            total_file_count,
            state: RecordState::Processing,
            received_at: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }
}

/// Lifecycle record for one dispatcher type invoked on behalf of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DispatchId>,
    /// Weak reference; `None` only when the receipt could not be persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<ReceiptId>,
    pub dispatcher_type: DispatcherType,
    pub total_file_count: usize,
    pub state: RecordState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl DispatchRecord {
    pub fn start(
        receipt_id: Option<ReceiptId>,
        dispatcher_type: DispatcherType,
        total_file_count: usize,
    ) -> Self {
        Self {
            id: None,
            receipt_id,
            dispatcher_type,
            total_file_count,
            state: RecordState::Processing,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

/// One ingested file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<FileRecordId>,
    pub filename: String,
    pub dispatch_id: DispatchId,
    /// Key of the durable copy in blob storage.
    pub blob_key: String,
    pub size: u64,
}

/// Operator kill-switch for one dispatcher type. Absence means enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherStatus {
    pub dispatcher_type: DispatcherType,
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
