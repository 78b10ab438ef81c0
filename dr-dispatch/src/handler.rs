//! The notification message handler.
//!
//! [`NotificationMessageHandler::handle_file`] runs one staged message through:
//!
//! 1. parse, relocate the listed files into the processing directory, validate
//! 2. build the receipt and the embedded timestamp range
//! 3. classify every file onto a [`DispatcherWrapper`]
//! 4. persist the receipt as `PROCESSING` and publish the pre-processing event
//! 5. one transaction: dispatch in order, skipping disabled types; commit or roll back
//! 6. a second transaction: receipt terminal state, and on failure every
//!    in-flight dispatch record re-created as `FAILURE`
//! 7. publish the post-processing event
//!
//! A failure before step 4 leaves no receipt behind.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;

use dr_core::filename::{is_bare_file_name, timestamp_and_suffix, TimestampRange};
use dr_core::manifest::ManifestDocument;
use dr_core::{
    DispatchRecord, DispatcherType, Manifest, ReceiptRecord, RecordState, DISPATCHER_ORDERING,
};

use crate::blob::BlobStore;
use crate::dispatcher::{DispatcherProvider, ModelImporter, NoModelImport, StandardDispatchers};
use crate::error::DispatchError;
use crate::events::{EventPhase, LogPublisher, NotificationMessageEvent, StatusPublisher};
use crate::factory::DispatcherWrapperFactory;
use crate::store::ReceiptStore;
use crate::wrapper::{DispatchContext, DispatcherWrapper};

/// Files classified between progress log lines.
const PROGRESS_INTERVAL: usize = 100;

pub struct NotificationMessageHandler<S> {
    store: S,
    provider: Box<dyn DispatcherProvider>,
    blobs: Box<dyn BlobStore>,
    models: Box<dyn ModelImporter>,
    publisher: Box<dyn StatusPublisher>,
    ordering: Vec<DispatcherType>,
    move_to_processing: bool,
    receipt: Option<ReceiptRecord>,
    dispatch_records: Vec<DispatchRecord>,
}

impl<S: ReceiptStore> NotificationMessageHandler<S> {
    /// Handler with the standard dispatchers, the global ordering, no model
    /// import, log-only events, and files moved (not copied) into processing.
    pub fn new(store: S, blobs: impl BlobStore + 'static) -> Self {
        Self {
            store,
            provider: Box::new(StandardDispatchers),
            blobs: Box::new(blobs),
            models: Box::new(NoModelImport),
            publisher: Box::new(LogPublisher),
            ordering: DISPATCHER_ORDERING.to_vec(),
            move_to_processing: true,
            receipt: None,
            dispatch_records: Vec::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl DispatcherProvider + 'static) -> Self {
        self.provider = Box::new(provider);
        self
    }

    pub fn with_model_importer(mut self, models: impl ModelImporter + 'static) -> Self {
        self.models = Box::new(models);
        self
    }

    pub fn with_publisher(mut self, publisher: impl StatusPublisher + 'static) -> Self {
        self.publisher = Box::new(publisher);
        self
    }

    /// Replace the dispatch order. Routed types missing from it are not dispatched.
    pub fn with_ordering(mut self, ordering: impl Into<Vec<DispatcherType>>) -> Self {
        self.ordering = ordering.into();
        self
    }

    /// `false` copies listed files into the processing directory instead of moving them.
    pub fn with_move_to_processing(mut self, move_to_processing: bool) -> Self {
        self.move_to_processing = move_to_processing;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Receipt of the last handled message, if it got that far.
    pub fn receipt(&self) -> Option<&ReceiptRecord> {
        self.receipt.as_ref()
    }

    /// Dispatch records opened while handling the last message, in dispatch order.
    pub fn dispatch_records(&self) -> &[DispatchRecord] {
        &self.dispatch_records
    }

    /// Handle the message at `manifest_file`, already staged inside `processing_dir`.
    pub fn handle_file(
        &mut self,
        incoming_dir: &Path,
        processing_dir: &Path,
        manifest_file: &Path,
    ) -> Result<(), DispatchError> {
        let manifest_name = manifest_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| manifest_file.display().to_string());
        self.receipt = None;
        self.dispatch_records.clear();

        tracing::info!(manifest = %manifest_name, "handling notification message");
        self.process(&manifest_name, incoming_dir, processing_dir, manifest_file)
            .map_err(|source| {
                tracing::error!(manifest = %manifest_name, error = %source, "unable to handle file");
                DispatchError::Handle {
                    manifest: manifest_name,
                    source: Box::new(source),
                }
            })
    }

    fn process(
        &mut self,
        manifest_name: &str,
        incoming_dir: &Path,
        processing_dir: &Path,
        manifest_file: &Path,
    ) -> Result<(), DispatchError> {
        let document = ManifestDocument::load(manifest_file)?;
        self.stage_files(&document, incoming_dir, processing_dir)?;
        let manifest = document.validate(manifest_file)?;

        let range = timestamp_range(&manifest);
        let mut receipt = ReceiptRecord::new(
            manifest.message_type.as_str(),
            manifest.identifier.as_str(),
            manifest.files.len(),
        );
        receipt.first_timestamp = range.as_ref().map(|r| r.first.clone());
        receipt.last_timestamp = range.as_ref().map(|r| r.last.clone());

        let wrappers = {
            let mut factory = DispatcherWrapperFactory::new(self.provider.as_ref(), processing_dir);
            classify(manifest_name, &manifest, &mut factory)?;
            factory.into_wrappers()
        };

        receipt.start_time = Some(Utc::now());
        if let Err(e) = self.persist_receipt(&mut receipt) {
            tracing::warn!(manifest = %manifest_name, error = %e, "failed to record receipt before dispatch");
        }
        self.publish(EventPhase::Pre, &receipt);

        let outcome = self.dispatch_all(wrappers, &receipt, range.as_ref());
        self.finalize(&mut receipt, outcome.is_ok());
        self.publish(EventPhase::Post, &receipt);

        tracing::info!(
            manifest = %manifest_name,
            receipt_id = ?receipt.id,
            state = %receipt.state,
            dispatches = self.dispatch_records.len(),
            "finished notification message"
        );
        self.receipt = Some(receipt);
        outcome
    }

    /// Move (or copy) every listed file from `incoming_dir` into `processing_dir`.
    /// Nothing moves when any listed name has a directory component.
    fn stage_files(
        &self,
        document: &ManifestDocument,
        incoming_dir: &Path,
        processing_dir: &Path,
    ) -> Result<(), DispatchError> {
        if let Some(filename) = document.file_names().find(|f| !is_bare_file_name(f)) {
            return Err(DispatchError::InvalidFileName {
                filename: filename.to_string(),
                reason: "not a bare file name".to_string(),
            });
        }
        for filename in document.file_names() {
            let from = incoming_dir.join(filename);
            let to = processing_dir.join(filename);
            let staged = if self.move_to_processing {
                std::fs::rename(&from, &to)
            } else {
                std::fs::copy(&from, &to).map(|_| ())
            };
            staged.map_err(|source| DispatchError::Stage { from, to, source })?;
        }
        tracing::debug!(
            files = document.file_count(),
            moved = self.move_to_processing,
            "staged message files"
        );
        Ok(())
    }

    fn persist_receipt(&mut self, receipt: &mut ReceiptRecord) -> Result<(), DispatchError> {
        self.store.begin()?;
        let saved = self
            .store
            .save_receipt(receipt)
            .and_then(|_| self.store.commit());
        if saved.is_err() {
            self.store.rollback_if_active();
        }
        Ok(saved?)
    }

    /// The main transaction.
    fn dispatch_all(
        &mut self,
        wrappers: BTreeMap<DispatcherType, DispatcherWrapper>,
        receipt: &ReceiptRecord,
        range: Option<&TimestampRange>,
    ) -> Result<(), DispatchError> {
        self.store.begin()?;
        let result = self
            .run_in_order(wrappers, receipt, range)
            .and_then(|()| Ok(self.store.commit()?));
        if result.is_err() {
            self.store.rollback_if_active();
        }
        result
    }

    fn run_in_order(
        &mut self,
        mut wrappers: BTreeMap<DispatcherType, DispatcherWrapper>,
        receipt: &ReceiptRecord,
        range: Option<&TimestampRange>,
    ) -> Result<(), DispatchError> {
        for &dispatcher_type in &self.ordering {
            let Some(mut wrapper) = wrappers.remove(&dispatcher_type) else {
                continue;
            };
            if let Some(status) = self.store.dispatcher_status(dispatcher_type) {
                if !status.enabled {
                    tracing::info!(%dispatcher_type, files = wrapper.file_count(), "dispatcher disabled, skipping");
                    continue;
                }
            }

            let started = Instant::now();
            let files = wrapper.file_count();
            tracing::info!(%dispatcher_type, files, "dispatching");
            let mut ctx = DispatchContext {
                store: &mut self.store,
                blobs: self.blobs.as_ref(),
                models: self.models.as_mut(),
                receipt,
                range,
                dispatch_records: &mut self.dispatch_records,
            };
            wrapper.dispatch(&mut ctx)?;
            tracing::info!(
                %dispatcher_type,
                files,
                duration_ms = started.elapsed().as_millis() as u64,
                "dispatch complete"
            );
        }

        for dispatcher_type in wrappers.keys() {
            tracing::warn!(%dispatcher_type, "dispatcher type not in ordering, files not dispatched");
        }
        Ok(())
    }

    /// Second transaction: record the terminal state whatever happened to the first.
    fn finalize(&mut self, receipt: &mut ReceiptRecord, succeeded: bool) {
        let now = Utc::now();
        let terminal = if succeeded {
            RecordState::Success
        } else {
            RecordState::Failure
        };
        receipt.state = terminal;
        receipt.end_time = Some(now);

        let result = self.store.begin().and_then(|()| {
            self.store.save_receipt(receipt)?;
            for record in &mut self.dispatch_records {
                if record.state == RecordState::Processing {
                    record.state = terminal;
                }
                record.end_time.get_or_insert(now);
                record.receipt_id = receipt.id;
                self.store.save_dispatch(record)?;
            }
            self.store.commit()
        });
        if let Err(e) = result {
            self.store.rollback_if_active();
            tracing::error!(
                identifier = %receipt.identifier,
                state = %terminal,
                error = %e,
                "failed to record terminal receipt state"
            );
        }
    }

    fn publish(&mut self, phase: EventPhase, receipt: &ReceiptRecord) {
        let event = NotificationMessageEvent::for_receipt(phase, receipt);
        if let Err(e) = self.publisher.publish(&event) {
            tracing::warn!(phase = ?phase, identifier = %receipt.identifier, error = %e, "failed to publish status event");
        }
    }
}

/// Route every file of `manifest` onto a wrapper. Nothing is dispatched here, so
/// one unrecognized name stops the message before any dispatcher runs.
fn classify(
    manifest_name: &str,
    manifest: &Manifest,
    factory: &mut DispatcherWrapperFactory<'_>,
) -> Result<(), DispatchError> {
    if DispatcherType::from_manifest_name(manifest_name).is_some() {
        let wrapper = factory.wrapper_for_manifest(manifest_name)?;
        for filename in manifest.file_names() {
            wrapper.add_file_name(filename)?;
        }
        tracing::debug!(
            dispatcher_type = %wrapper.dispatcher_type(),
            files = wrapper.file_count(),
            "whole-message dispatch"
        );
        return Ok(());
    }

    let total = manifest.files.len();
    for (idx, filename) in manifest.file_names().enumerate() {
        factory.wrapper_for_file(filename)?.add_file_name(filename)?;
        if (idx + 1) % PROGRESS_INTERVAL == 0 {
            tracing::info!(classified = idx + 1, total, "classifying files");
        }
    }
    tracing::debug!(types = factory.len(), files = total, "classified message files");
    Ok(())
}

/// Min / max embedded timestamp over the files that follow the naming convention.
fn timestamp_range(manifest: &Manifest) -> Option<TimestampRange> {
    let mut range = None;
    for filename in manifest.file_names() {
        if let Some((timestamp, _)) = timestamp_and_suffix(filename) {
            TimestampRange::include(&mut range, timestamp);
        }
    }
    range
}
