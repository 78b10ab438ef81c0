use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

pub const INCOMING_DIR: &str = "incoming";
pub const PROCESSING_DIR: &str = "processing";
pub const STATE_DIR: &str = "state";
pub const STORE_FILE: &str = "receipts.json";
pub const BLOBS_DIR: &str = "blobs";
pub const EVENTS_FILE: &str = "events.jsonl";

pub const PROCESSING_PREFIX: &str = "p--";
pub const SUCCESS_SUFFIX: &str = "-SUCCESS";
pub const FAILED_SUFFIX: &str = "-FAILED";

/// Directory layout under one watcher root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherPaths {
    root: PathBuf,
}

impl WatcherPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn incoming(&self) -> PathBuf {
        self.root.join(INCOMING_DIR)
    }

    pub fn processing(&self) -> PathBuf {
        self.root.join(PROCESSING_DIR)
    }

    pub fn state(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    pub fn store_file(&self) -> PathBuf {
        self.state().join(STORE_FILE)
    }

    pub fn blobs(&self) -> PathBuf {
        self.state().join(BLOBS_DIR)
    }

    pub fn events_file(&self) -> PathBuf {
        self.state().join(EVENTS_FILE)
    }
}

/// `p--<UTC timestamp, ms>--<manifest name>`
pub fn processing_dir_name(now: DateTime<Utc>, manifest_name: &str) -> String {
    format!(
        "{PROCESSING_PREFIX}{}--{manifest_name}",
        now.format("%Y%m%dT%H%M%S%.3fZ")
    )
}

/// A processing directory path under `processing_root` that does not exist yet.
pub fn unique_processing_dir(
    processing_root: &Path,
    now: DateTime<Utc>,
    manifest_name: &str,
) -> PathBuf {
    let base = processing_dir_name(now, manifest_name);
    let mut candidate = processing_root.join(&base);
    let mut n = 1;
    while candidate.exists() || marked(&candidate, true).exists() || marked(&candidate, false).exists()
    {
        n += 1;
        candidate = processing_root.join(format!("{base}.{n}"));
    }
    candidate
}

/// `dir` with the outcome suffix appended to its last component.
pub fn marked(dir: &Path, success: bool) -> PathBuf {
    let suffix = if success { SUCCESS_SUFFIX } else { FAILED_SUFFIX };
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.with_file_name(format!("{name}{suffix}"))
}
