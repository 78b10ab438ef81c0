//! End-to-end handler behavior against real directories and an in-memory store.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dr_core::{DispatcherStatus, DispatcherType, FileEntry, Manifest, RecordState};
use dr_dispatch::{
    DirBlobStore, DispatchError, Dispatcher, DispatcherProvider, EventLogPublisher, EventPhase,
    FileSink, JsonStore, MemoryStore, NotificationMessageHandler, ReceiptStore,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Records the order dispatchers run in; optionally fails one type.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<DispatcherType>>>,
    fail_on: Option<DispatcherType>,
}

impl Recorder {
    fn failing_on(dispatcher_type: DispatcherType) -> Self {
        Self {
            fail_on: Some(dispatcher_type),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<DispatcherType> {
        self.calls.lock().unwrap().clone()
    }
}

struct RecordingDispatcher {
    dispatcher_type: DispatcherType,
    calls: Arc<Mutex<Vec<DispatcherType>>>,
    fail: bool,
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(
        &mut self,
        filenames: &BTreeSet<String>,
        _source_dir: &Path,
        sink: &mut dyn FileSink,
    ) -> Result<(), DispatchError> {
        self.calls.lock().unwrap().push(self.dispatcher_type);
        if self.fail {
            return Err(DispatchError::dispatcher(
                self.dispatcher_type,
                "simulated failure",
            ));
        }
        for filename in filenames {
            sink.store_file(filename)?;
        }
        Ok(())
    }
}

impl DispatcherProvider for Recorder {
    fn create(&self, dispatcher_type: DispatcherType) -> Box<dyn Dispatcher> {
        Box::new(RecordingDispatcher {
            dispatcher_type,
            calls: Arc::clone(&self.calls),
            fail: self.fail_on == Some(dispatcher_type),
        })
    }
}

struct Fixture {
    tmp: TempDir,
    incoming: PathBuf,
    processing: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let incoming = tmp.path().join("incoming");
        let processing = tmp.path().join("processing").join("p--test--batch");
        std::fs::create_dir_all(&incoming).unwrap();
        std::fs::create_dir_all(&processing).unwrap();
        Self {
            tmp,
            incoming,
            processing,
        }
    }

    fn blobs(&self) -> DirBlobStore {
        DirBlobStore::new(self.tmp.path().join("blobs"))
    }

    /// Write each data file into incoming/ and the message into the processing directory.
    fn stage(&self, manifest_name: &str, files: &[&str]) -> PathBuf {
        for name in files {
            std::fs::write(self.incoming.join(name), format!("payload of {name}")).unwrap();
        }
        let path = self.processing.join(manifest_name);
        Manifest {
            message_type: "SDNM".to_string(),
            identifier: manifest_name.to_string(),
            files: files
                .iter()
                .map(|name| FileEntry {
                    filename: name.to_string(),
                    checksum: "cafe".to_string(),
                    size: 12,
                })
                .collect(),
        }
        .save(&path)
        .unwrap();
        path
    }

    fn handler(&self, recorder: &Recorder) -> NotificationMessageHandler<MemoryStore> {
        NotificationMessageHandler::new(MemoryStore::new(), self.blobs())
            .with_provider(recorder.clone())
    }

    fn run(
        &self,
        handler: &mut NotificationMessageHandler<MemoryStore>,
        manifest: &Path,
    ) -> Result<(), DispatchError> {
        handler.handle_file(&self.incoming, &self.processing, manifest)
    }
}

// ---------------------------------------------------------------------------
// 1. Ordering
// ---------------------------------------------------------------------------

#[test]
fn dispatch_follows_global_order_not_file_order() {
    let fx = Fixture::new();
    let manifest = fx.stage(
        "kplr2009001_sdnm.xml",
        &[
            "kplr2009001_lcs-targ.fits",
            "kplr2009001_ffi-orig.fits",
            "kplr2009002_lcs-col.fits",
        ],
    );
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder);

    fx.run(&mut handler, &manifest).unwrap();

    assert_eq!(
        recorder.calls(),
        vec![DispatcherType::Ffi, DispatcherType::LongCadencePixel]
    );
    let receipt = handler.receipt().unwrap();
    assert_eq!(receipt.state, RecordState::Success);
    assert_eq!(receipt.total_file_count, 3);
    assert_eq!(receipt.first_timestamp.as_deref(), Some("2009001"));
    assert_eq!(receipt.last_timestamp.as_deref(), Some("2009002"));
}

#[test]
fn injected_ordering_limits_what_runs() {
    let fx = Fixture::new();
    let manifest = fx.stage(
        "kplr1_sdnm.xml",
        &["kplr1_lcs-targ.fits", "kplr1_ffi-orig.fits"],
    );
    let recorder = Recorder::default();
    let mut handler = fx
        .handler(&recorder)
        .with_ordering([DispatcherType::LongCadencePixel]);

    fx.run(&mut handler, &manifest).unwrap();
    assert_eq!(recorder.calls(), vec![DispatcherType::LongCadencePixel]);
}

// ---------------------------------------------------------------------------
// 2. Success bookkeeping
// ---------------------------------------------------------------------------

#[test]
fn success_persists_receipt_dispatches_and_files() {
    let fx = Fixture::new();
    let files = [
        "kplr1_lcs-targ.fits",
        "kplr1_lcs-col.fits",
        "kplr1_ffi-orig.fits",
        "de421.bsp",
    ];
    let manifest = fx.stage("kplr1_sdnm.xml", &files);
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder);

    fx.run(&mut handler, &manifest).unwrap();

    let store = handler.store();
    let receipts = store.receipts();
    assert_eq!(receipts.len(), 1);
    let receipt = &receipts[0];
    assert_eq!(receipt.state, RecordState::Success);
    assert!(receipt.start_time.is_some() && receipt.end_time.is_some());

    let dispatches = store.dispatches_for(receipt.id.unwrap());
    assert_eq!(dispatches.len(), 3);
    let mut stored = BTreeSet::new();
    for dispatch in &dispatches {
        assert_eq!(dispatch.state, RecordState::Success);
        let records = store.files_for(dispatch.id.unwrap());
        assert_eq!(records.len(), dispatch.total_file_count);
        stored.extend(records.into_iter().map(|f| f.filename));
    }
    let expected: BTreeSet<String> = files.iter().map(|f| f.to_string()).collect();
    assert_eq!(stored, expected, "every file recorded exactly once");

    for name in files {
        assert!(fx.processing.join(name).exists(), "{name} staged");
        assert!(!fx.incoming.join(name).exists(), "{name} moved out of incoming");
    }
}

#[test]
fn copy_mode_leaves_incoming_untouched() {
    let fx = Fixture::new();
    let manifest = fx.stage("kplr1_sdnm.xml", &["kplr1_ffi-orig.fits"]);
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder).with_move_to_processing(false);

    fx.run(&mut handler, &manifest).unwrap();
    assert!(fx.incoming.join("kplr1_ffi-orig.fits").exists());
    assert!(fx.processing.join("kplr1_ffi-orig.fits").exists());
}

#[test]
fn whole_message_type_receives_every_file() {
    let fx = Fixture::new();
    let manifest = fx.stage(
        "kplr2009_tlnm.xml",
        &["kplr2009_lc-targets.txt", "kplr2009_sc-targets.txt"],
    );
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder);

    fx.run(&mut handler, &manifest).unwrap();
    assert_eq!(recorder.calls(), vec![DispatcherType::TargetList]);
    assert_eq!(handler.dispatch_records()[0].total_file_count, 2);
}

#[test]
fn disabled_dispatcher_is_skipped() {
    let fx = Fixture::new();
    let manifest = fx.stage(
        "kplr1_sdnm.xml",
        &["kplr1_lcs-targ.fits", "kplr1_ffi-orig.fits"],
    );
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder);
    {
        let store = handler.store_mut();
        store.begin().unwrap();
        store
            .set_dispatcher_status(DispatcherStatus {
                dispatcher_type: DispatcherType::Ffi,
                enabled: false,
            })
            .unwrap();
        store.commit().unwrap();
    }

    fx.run(&mut handler, &manifest).unwrap();

    assert_eq!(recorder.calls(), vec![DispatcherType::LongCadencePixel]);
    let receipt = handler.receipt().unwrap();
    assert_eq!(receipt.state, RecordState::Success);
    let dispatched: Vec<_> = handler
        .store()
        .dispatches_for(receipt.id.unwrap())
        .into_iter()
        .map(|d| d.dispatcher_type)
        .collect();
    assert_eq!(dispatched, vec![DispatcherType::LongCadencePixel]);
}

// ---------------------------------------------------------------------------
// 3. Failure bookkeeping
// ---------------------------------------------------------------------------

#[test]
fn failure_on_third_type_recreates_in_flight_records() {
    let fx = Fixture::new();
    let manifest = fx.stage(
        "kplr1_sdnm.xml",
        &[
            "kplr1_scs-targ.fits",
            "kplr1_lcs-targ.fits",
            "kplr1_ffi-orig.fits",
            "kplr1_rp.rp",
            "kplr1_scconfig.xml",
        ],
    );
    let recorder = Recorder::failing_on(DispatcherType::Ffi);
    let mut handler = fx.handler(&recorder);

    let err = fx.run(&mut handler, &manifest).unwrap_err();
    assert!(matches!(err, DispatchError::Handle { .. }));
    assert!(matches!(
        err.root(),
        DispatchError::Dispatcher {
            dispatcher_type: DispatcherType::Ffi,
            ..
        }
    ));
    assert_eq!(
        recorder.calls(),
        vec![
            DispatcherType::ConfigMap,
            DispatcherType::RefPixel,
            DispatcherType::Ffi
        ]
    );

    let store = handler.store();
    let receipts = store.receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].state, RecordState::Failure);

    let dispatches = store.dispatches_for(receipts[0].id.unwrap());
    let types: Vec<_> = dispatches.iter().map(|d| d.dispatcher_type).collect();
    assert_eq!(
        &types[..2],
        &[DispatcherType::ConfigMap, DispatcherType::RefPixel]
    );
    assert!(!types.contains(&DispatcherType::LongCadencePixel));
    for dispatch in &dispatches {
        assert_eq!(dispatch.state, RecordState::Failure);
        assert!(
            store.files_for(dispatch.id.unwrap()).is_empty(),
            "file records roll back with the main transaction"
        );
    }
}

#[test]
fn unrecognized_suffix_stops_before_any_dispatch() {
    let fx = Fixture::new();
    let manifest = fx.stage(
        "kplr1_sdnm.xml",
        &["kplr1_ffi-orig.fits", "kplr1_mystery.dat"],
    );
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder);

    let err = fx.run(&mut handler, &manifest).unwrap_err();
    assert!(matches!(
        err.root(),
        DispatchError::UnrecognizedFile { filename } if filename == "kplr1_mystery.dat"
    ));
    assert!(recorder.calls().is_empty());
    assert!(handler.store().receipts().is_empty());
    assert!(handler.receipt().is_none());
    assert!(
        fx.processing.join("kplr1_mystery.dat").exists(),
        "files were relocated before classification"
    );
}

#[test]
fn files_are_relocated_before_schema_validation() {
    let fx = Fixture::new();
    std::fs::write(fx.incoming.join("kplr1_ffi-orig.fits"), b"ffi").unwrap();
    let manifest = fx.processing.join("kplr1_sdnm.xml");
    std::fs::write(
        &manifest,
        r#"<dataProductMessage>
  <messageType>SDNM</messageType>
  <identifier>kplr1_sdnm.xml</identifier>
  <fileList>
    <file><filename>kplr1_ffi-orig.fits</filename><size>3</size></file>
  </fileList>
</dataProductMessage>"#,
    )
    .unwrap();
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder);

    let err = fx.run(&mut handler, &manifest).unwrap_err();
    assert!(matches!(
        err.root(),
        DispatchError::Manifest(dr_core::ManifestError::Invalid { .. })
    ));
    assert!(fx.processing.join("kplr1_ffi-orig.fits").exists());
    assert!(!fx.incoming.join("kplr1_ffi-orig.fits").exists());
    assert!(handler.store().receipts().is_empty());
}

#[test]
fn path_in_listed_name_stops_before_anything_moves() {
    let fx = Fixture::new();
    std::fs::write(fx.incoming.join("kplr1_ffi-orig.fits"), b"ffi").unwrap();
    let manifest = fx.processing.join("kplr1_sdnm.xml");
    std::fs::write(
        &manifest,
        r#"<dataProductMessage>
  <messageType>SDNM</messageType>
  <identifier>kplr1_sdnm.xml</identifier>
  <fileList>
    <file><filename>kplr1_ffi-orig.fits</filename><checksum>aa</checksum><size>3</size></file>
    <file><filename>../kplr1_lcs-targ.fits</filename><checksum>bb</checksum><size>3</size></file>
  </fileList>
</dataProductMessage>"#,
    )
    .unwrap();
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder);

    let err = fx.run(&mut handler, &manifest).unwrap_err();
    assert!(matches!(
        err.root(),
        DispatchError::InvalidFileName { filename, .. } if filename == "../kplr1_lcs-targ.fits"
    ));
    assert!(fx.incoming.join("kplr1_ffi-orig.fits").exists());
    assert!(!fx.processing.join("kplr1_ffi-orig.fits").exists());
    assert!(recorder.calls().is_empty());
}

#[test]
fn missing_data_file_is_a_staging_error() {
    let fx = Fixture::new();
    let manifest = fx.stage("kplr1_sdnm.xml", &["kplr1_ffi-orig.fits"]);
    std::fs::remove_file(fx.incoming.join("kplr1_ffi-orig.fits")).unwrap();
    let recorder = Recorder::default();
    let mut handler = fx.handler(&recorder);

    let err = fx.run(&mut handler, &manifest).unwrap_err();
    assert!(matches!(err.root(), DispatchError::Stage { .. }));
    assert!(recorder.calls().is_empty());
}

// ---------------------------------------------------------------------------
// 4. Events and durable store
// ---------------------------------------------------------------------------

#[test]
fn one_terminal_state_and_pre_post_events() {
    let fx = Fixture::new();
    let events_path = fx.tmp.path().join("state").join("events.jsonl");
    let manifest = fx.stage("kplr1_sdnm.xml", &["kplr1_ffi-orig.fits"]);
    let recorder = Recorder::failing_on(DispatcherType::Ffi);
    let mut handler = fx
        .handler(&recorder)
        .with_publisher(EventLogPublisher::new(&events_path));

    let _ = fx.run(&mut handler, &manifest);

    let events = EventLogPublisher::new(&events_path).read_all().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].phase, EventPhase::Pre);
    assert_eq!(events[0].state, RecordState::Processing);
    assert_eq!(events[1].phase, EventPhase::Post);
    assert_eq!(events[1].state, RecordState::Failure);
    assert_eq!(events[0].receipt_id, events[1].receipt_id);

    let receipts = handler.store().receipts();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].state.is_terminal());
}

#[test]
fn json_store_survives_reopen() {
    let fx = Fixture::new();
    let store_path = fx.tmp.path().join("state").join("receipts.json");
    let manifest = fx.stage("kplr1_sdnm.xml", &["kplr1_ffi-orig.fits", "kplr1_rp.rp"]);
    let recorder = Recorder::default();
    let mut handler = NotificationMessageHandler::new(JsonStore::open(&store_path).unwrap(), fx.blobs())
        .with_provider(recorder.clone());

    handler
        .handle_file(&fx.incoming, &fx.processing, &manifest)
        .unwrap();

    let reopened = JsonStore::open(&store_path).unwrap();
    let receipts = reopened.receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].state, RecordState::Success);
    assert_eq!(reopened.dispatches_for(receipts[0].id.unwrap()).len(), 2);
}
