//! Data-receipt core library: manifest codec, dispatcher registry and record types.
//!
//! - [`types`]: record newtypes and lifecycle structs
//! - [`dispatcher_type`]: the closed [`DispatcherType`] catalog and [`DISPATCHER_ORDERING`]
//! - [`filename`]: `kplr<timestamp>_<suffix>` naming convention helpers
//! - [`manifest`]: notification-message XML parsing, validation, writing
//! - [`nm_tools`]: operator batch tools (split / sort / copy / move)
//! - [`error`]: [`ManifestError`]

pub mod dispatcher_type;
pub mod error;
pub mod filename;
pub mod manifest;
pub mod nm_tools;
pub mod types;

pub use dispatcher_type::{DispatcherType, Recognition, DISPATCHER_ORDERING, MANIFEST_SUFFIXES};
pub use error::ManifestError;
pub use manifest::{FileEntry, Manifest};
pub use types::{
    DispatchId, DispatchRecord, DispatcherStatus, FileRecord, FileRecordId, ReceiptId,
    ReceiptRecord, RecordState,
};
