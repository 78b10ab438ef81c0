//! One unit of work per (message, dispatcher type).

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;

use dr_core::filename::{is_bare_file_name, TimestampRange};
use dr_core::{DispatchId, DispatchRecord, DispatcherType, FileRecord, ReceiptRecord};

use crate::blob::BlobStore;
use crate::dispatcher::{Dispatcher, FileSink, ModelImporter};
use crate::error::DispatchError;
use crate::store::ReceiptStore;

/// Collaborators a wrapper needs while it runs, borrowed from the handler.
pub struct DispatchContext<'a> {
    pub store: &'a mut dyn ReceiptStore,
    pub blobs: &'a dyn BlobStore,
    pub models: &'a mut dyn ModelImporter,
    pub receipt: &'a ReceiptRecord,
    pub range: Option<&'a TimestampRange>,
    /// Every dispatch record opened during this message, kept so the failure
    /// pass can re-create them after a rollback.
    pub dispatch_records: &'a mut Vec<DispatchRecord>,
}

/// Buffers the filenames of one dispatcher type and runs its [`Dispatcher`].
pub struct DispatcherWrapper {
    dispatcher_type: DispatcherType,
    dispatcher: Box<dyn Dispatcher>,
    source_dir: PathBuf,
    filenames: BTreeSet<String>,
}

impl std::fmt::Debug for DispatcherWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherWrapper")
            .field("dispatcher_type", &self.dispatcher_type)
            .field("source_dir", &self.source_dir)
            .field("filenames", &self.filenames)
            .finish_non_exhaustive()
    }
}

impl DispatcherWrapper {
    pub fn new(
        dispatcher_type: DispatcherType,
        dispatcher: Box<dyn Dispatcher>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            dispatcher_type,
            dispatcher,
            source_dir: source_dir.into(),
            filenames: BTreeSet::new(),
        }
    }

    pub fn dispatcher_type(&self) -> DispatcherType {
        self.dispatcher_type
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn filenames(&self) -> &BTreeSet<String> {
        &self.filenames
    }

    pub fn file_count(&self) -> usize {
        self.filenames.len()
    }

    /// Buffer `filename` for the next dispatch.
    pub fn add_file_name(&mut self, filename: &str) -> Result<(), DispatchError> {
        if !is_bare_file_name(filename) {
            return Err(DispatchError::InvalidFileName {
                filename: filename.to_string(),
                reason: "not a bare file name".to_string(),
            });
        }
        self.filenames.insert(filename.to_string());
        Ok(())
    }

    /// Open a dispatch record, run the dispatcher over the buffered files,
    /// import reference models for the batch's time range, then close the record
    /// and clear the buffer.
    ///
    /// The record stays `PROCESSING`; the handler decides its terminal state.
    pub fn dispatch(&mut self, ctx: &mut DispatchContext<'_>) -> Result<DispatchId, DispatchError> {
        let mut record =
            DispatchRecord::start(ctx.receipt.id, self.dispatcher_type, self.filenames.len());
        let id = ctx.store.save_dispatch(&mut record)?;
        ctx.dispatch_records.push(record.clone());
        let slot = ctx.dispatch_records.len() - 1;

        let stored = {
            let mut sink = RecordingSink {
                store: &mut *ctx.store,
                blobs: ctx.blobs,
                dispatch_id: id,
                source_dir: &self.source_dir,
                buffered: &self.filenames,
                stored: BTreeSet::new(),
            };
            self.dispatcher
                .dispatch(&self.filenames, &self.source_dir, &mut sink)?;
            sink.stored.len()
        };

        ctx.models.import_models(self.dispatcher_type, ctx.range)?;

        record.total_file_count = stored;
        record.end_time = Some(Utc::now());
        ctx.store.save_dispatch(&mut record)?;
        ctx.dispatch_records[slot] = record;
        self.filenames.clear();
        Ok(id)
    }
}

/// [`FileSink`] that writes blobs and file records for one dispatch.
struct RecordingSink<'a> {
    store: &'a mut dyn ReceiptStore,
    blobs: &'a dyn BlobStore,
    dispatch_id: DispatchId,
    source_dir: &'a Path,
    buffered: &'a BTreeSet<String>,
    stored: BTreeSet<String>,
}

impl FileSink for RecordingSink<'_> {
    fn store_file(&mut self, filename: &str) -> Result<(), DispatchError> {
        if !self.buffered.contains(filename) {
            return Err(DispatchError::InvalidFileName {
                filename: filename.to_string(),
                reason: "not part of this dispatch".to_string(),
            });
        }
        if self.stored.contains(filename) {
            return Err(DispatchError::InvalidFileName {
                filename: filename.to_string(),
                reason: "already stored".to_string(),
            });
        }

        let blob = self
            .blobs
            .store(filename, &self.source_dir.join(filename))?;
        let mut record = FileRecord {
            id: None,
            filename: filename.to_string(),
            dispatch_id: self.dispatch_id,
            blob_key: blob.key,
            size: blob.size,
        };
        self.store.save_file(&mut record)?;
        self.stored.insert(filename.to_string());
        Ok(())
    }
}
