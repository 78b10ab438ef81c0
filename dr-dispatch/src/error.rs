//! Error types for dr-dispatch.

use std::path::PathBuf;

use thiserror::Error;

use dr_core::{DispatcherType, ManifestError};

/// Errors raised while handling one notification message.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Parse or schema failure of the message itself.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// No dispatcher type claims this file's suffix.
    #[error("no dispatcher registered for file '{filename}'")]
    UnrecognizedFile { filename: String },

    /// The message suffix does not select a whole-message dispatcher type.
    #[error("no whole-message dispatcher registered for '{filename}'")]
    UnrecognizedManifest { filename: String },

    /// A filename was rejected while buffering or storing it.
    #[error("invalid file name '{filename}': {reason}")]
    InvalidFileName { filename: String, reason: String },

    /// Moving or copying a file into the processing directory failed.
    #[error("failed to stage {from} -> {to}: {source}")]
    Stage {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Writing a file to blob storage failed.
    #[error("blob storage failed for '{filename}': {source}")]
    Blob {
        filename: String,
        #[source]
        source: std::io::Error,
    },

    /// A dispatcher rejected its batch.
    #[error("{dispatcher_type} dispatcher failed: {message}")]
    Dispatcher {
        dispatcher_type: DispatcherType,
        message: String,
    },

    /// Top-level failure of one message, wrapping the cause.
    #[error("unable to handle {manifest}: {source}")]
    Handle {
        manifest: String,
        #[source]
        source: Box<DispatchError>,
    },
}

impl DispatchError {
    pub fn dispatcher(dispatcher_type: DispatcherType, message: impl Into<String>) -> Self {
        DispatchError::Dispatcher {
            dispatcher_type,
            message: message.into(),
        }
    }

    /// The innermost error, looking through [`DispatchError::Handle`].
    pub fn root(&self) -> &DispatchError {
        match self {
            DispatchError::Handle { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors from a [`crate::ReceiptStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A write was attempted outside `begin` / `commit`.
    #[error("no active transaction")]
    NoTransaction,

    #[error("a transaction is already active")]
    TransactionActive,
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn store_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
