//! Watcher scans against real directories.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dr_core::{FileEntry, Manifest, RecordState};
use dr_daemon::{
    build_watcher, FileWatcher, FileWatcherHandler, Outcome, WatcherConfig,
};
use dr_dispatch::{EventLogPublisher, JsonStore, ReceiptStore};
use filetime::{set_file_mtime, FileTime};
use tempfile::TempDir;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
struct Recording {
    seen: Arc<Mutex<Vec<String>>>,
    fail: Vec<String>,
}

impl Recording {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl FileWatcherHandler for Recording {
    type Error = std::io::Error;

    fn handle_file(
        &mut self,
        _incoming_dir: &Path,
        processing_dir: &Path,
        manifest_file: &Path,
    ) -> Result<(), std::io::Error> {
        assert!(manifest_file.starts_with(processing_dir));
        assert!(manifest_file.exists(), "manifest staged before the handler runs");
        let name = manifest_file
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        self.seen.lock().unwrap().push(name.clone());
        if self.fail.contains(&name) {
            return Err(std::io::Error::other("simulated handler failure"));
        }
        Ok(())
    }
}

fn dirs(tmp: &TempDir) -> (PathBuf, PathBuf) {
    let incoming = tmp.path().join("incoming");
    let processing = tmp.path().join("processing");
    std::fs::create_dir_all(&incoming).unwrap();
    std::fs::create_dir_all(&processing).unwrap();
    (incoming, processing)
}

fn watcher(tmp: &TempDir, handler: Recording) -> FileWatcher<Recording> {
    let (incoming, processing) = dirs(tmp);
    FileWatcher::new(
        "test",
        incoming,
        processing,
        vec!["_sdnm.xml".to_string()],
        Duration::from_millis(20),
        handler,
    )
}

fn touch(dir: &Path, name: &str, unix_secs: i64) {
    let path = dir.join(name);
    std::fs::write(&path, "<dataProductMessage/>").unwrap();
    set_file_mtime(&path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
}

fn processing_entries(tmp: &TempDir) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(tmp.path().join("processing"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------------
// 1. Ordering and outcome marking
// ---------------------------------------------------------------------------

#[test]
fn manifests_are_handled_in_modification_time_order() {
    let tmp = TempDir::new().unwrap();
    let handler = Recording::default();
    let mut watcher = watcher(&tmp, handler.clone());
    let incoming = tmp.path().join("incoming");

    // Written out of order; mtimes say b < c < a.
    touch(&incoming, "kplr3_sdnm.xml", 1_300_000_300);
    touch(&incoming, "kplr1_sdnm.xml", 1_300_000_100);
    touch(&incoming, "kplr2_sdnm.xml", 1_300_000_200);

    let report = watcher.scan().unwrap();
    assert_eq!(report.succeeded(), 3);
    assert_eq!(
        handler.seen(),
        vec!["kplr1_sdnm.xml", "kplr2_sdnm.xml", "kplr3_sdnm.xml"]
    );
    assert!(std::fs::read_dir(&incoming).unwrap().next().is_none());
    for entry in processing_entries(&tmp) {
        assert!(entry.starts_with("p--"), "{entry}");
        assert!(entry.ends_with("-SUCCESS"), "{entry}");
    }
}

#[test]
fn failed_manifest_is_marked_and_scan_continues() {
    let tmp = TempDir::new().unwrap();
    let handler = Recording {
        fail: vec!["kplr1_sdnm.xml".to_string()],
        ..Recording::default()
    };
    let mut watcher = watcher(&tmp, handler.clone());
    let incoming = tmp.path().join("incoming");
    touch(&incoming, "kplr1_sdnm.xml", 1_300_000_100);
    touch(&incoming, "kplr2_sdnm.xml", 1_300_000_200);

    let report = watcher.scan().unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.handled[0].outcome, Outcome::Failed);

    let entries = processing_entries(&tmp);
    assert!(entries
        .iter()
        .any(|e| e.contains("kplr1_sdnm.xml") && e.ends_with("-FAILED")));
    assert!(entries
        .iter()
        .any(|e| e.contains("kplr2_sdnm.xml") && e.ends_with("-SUCCESS")));
    assert!(report.handled[0]
        .processing_dir
        .join("kplr1_sdnm.xml")
        .exists());
}

#[test]
fn non_matching_files_are_ignored() {
    let tmp = TempDir::new().unwrap();
    let handler = Recording::default();
    let mut watcher = watcher(&tmp, handler.clone());
    let incoming = tmp.path().join("incoming");
    touch(&incoming, "kplr1_ffi-orig.fits", 1_300_000_100);
    touch(&incoming, "kplr1_tlnm.xml", 1_300_000_100);

    assert!(watcher.scan().unwrap().is_empty());
    assert!(watcher.scan().unwrap().is_empty());
    assert!(handler.seen().is_empty());
    assert!(incoming.join("kplr1_ffi-orig.fits").exists());
}

#[test]
fn unstageable_manifest_waits_for_a_new_modification_time() {
    let tmp = TempDir::new().unwrap();
    let handler = Recording::default();
    let mut watcher = watcher(&tmp, handler.clone());
    let incoming = tmp.path().join("incoming");
    let processing = tmp.path().join("processing");
    touch(&incoming, "kplr1_sdnm.xml", 1_300_000_100);
    touch(&incoming, "kplr2_sdnm.xml", 1_300_000_200);

    // A plain file where the processing root should be: every staging fails.
    std::fs::remove_dir(&processing).unwrap();
    std::fs::write(&processing, "not a directory").unwrap();
    set_file_mtime(&incoming, FileTime::from_unix_time(1_400_000_000, 0)).unwrap();

    let report = watcher.scan().unwrap();
    assert_eq!(report.failed(), 2, "the scan continues past the first failure");
    assert_eq!(report.handled[0].manifest, "kplr1_sdnm.xml");
    assert_eq!(report.handled[1].manifest, "kplr2_sdnm.xml");
    assert!(handler.seen().is_empty());
    assert!(incoming.join("kplr1_sdnm.xml").exists());
    assert!(incoming.join("kplr2_sdnm.xml").exists());

    std::fs::remove_file(&processing).unwrap();
    std::fs::create_dir(&processing).unwrap();

    // Listing again without touching either manifest retries nothing.
    set_file_mtime(&incoming, FileTime::from_unix_time(1_400_000_100, 0)).unwrap();
    assert!(watcher.scan().unwrap().is_empty());

    // A new modification time makes kplr1 eligible again; kplr2 still waits.
    set_file_mtime(
        incoming.join("kplr1_sdnm.xml"),
        FileTime::from_unix_time(1_300_000_300, 0),
    )
    .unwrap();
    set_file_mtime(&incoming, FileTime::from_unix_time(1_400_000_200, 0)).unwrap();
    let report = watcher.scan().unwrap();
    assert_eq!(report.succeeded(), 1);
    assert_eq!(handler.seen(), vec!["kplr1_sdnm.xml"]);
    assert!(!incoming.join("kplr1_sdnm.xml").exists());
    assert!(incoming.join("kplr2_sdnm.xml").exists());
}

// ---------------------------------------------------------------------------
// 2. Full pipeline
// ---------------------------------------------------------------------------

#[test]
fn ingest_watcher_dispatches_and_records() {
    let tmp = TempDir::new().unwrap();
    let config = WatcherConfig::new("science", tmp.path());
    let mut watcher = build_watcher(&config).unwrap();
    let paths = config.paths();

    let files = ["kplr2009001_ffi-orig.fits", "kplr2009001_lcs-targ.fits"];
    for name in files {
        std::fs::write(paths.incoming().join(name), name).unwrap();
    }
    Manifest {
        message_type: "SDNM".into(),
        identifier: "kplr2009001_sdnm.xml".into(),
        files: files
            .iter()
            .map(|f| FileEntry {
                filename: f.to_string(),
                checksum: "00".into(),
                size: f.len() as u64,
            })
            .collect(),
    }
    .save(&paths.incoming().join("kplr2009001_sdnm.xml"))
    .unwrap();

    let report = watcher.scan().unwrap();
    assert_eq!(report.succeeded(), 1, "{report:?}");
    let done = &report.handled[0].processing_dir;
    for name in files {
        assert!(done.join(name).exists());
    }

    let store = JsonStore::open(paths.store_file()).unwrap();
    let receipts = store.receipts();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].state, RecordState::Success);
    assert_eq!(store.dispatches_for(receipts[0].id.unwrap()).len(), 2);

    let events = EventLogPublisher::new(paths.events_file()).read_all().unwrap();
    assert_eq!(events.len(), 2);
}

#[test]
fn ingest_watcher_marks_bad_manifest_failed() {
    let tmp = TempDir::new().unwrap();
    let config = WatcherConfig::new("science", tmp.path());
    let mut watcher = build_watcher(&config).unwrap();
    std::fs::write(
        config.paths().incoming().join("kplr1_sdnm.xml"),
        "<dataProductMessage><fileList>",
    )
    .unwrap();

    let report = watcher.scan().unwrap();
    assert_eq!(report.failed(), 1);
    assert!(report.handled[0]
        .processing_dir
        .to_string_lossy()
        .ends_with("-FAILED"));
}

// ---------------------------------------------------------------------------
// 3. Async loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_loop_handles_files_and_stops_on_shutdown() {
    let tmp = TempDir::new().unwrap();
    let handler = Recording::default();
    let watcher = watcher(&tmp, handler.clone());
    let incoming = tmp.path().join("incoming");
    touch(&incoming, "kplr1_sdnm.xml", 1_300_000_100);

    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    let task = tokio::spawn(watcher.run(shutdown_rx));
    let mut waited = Duration::ZERO;
    while handler.seen().is_empty() && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
        waited += Duration::from_millis(20);
    }
    assert_eq!(handler.seen(), vec!["kplr1_sdnm.xml"]);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("watcher stops")
        .unwrap()
        .unwrap();
}
