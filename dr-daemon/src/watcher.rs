//! Polling watcher over one `incoming/` directory.
//!
//! Each scan lists the manifests present, oldest modification time first, and
//! for each one: creates a fresh processing directory, renames the manifest into
//! it, runs the handler, then renames the directory with `-SUCCESS` or
//! `-FAILED`. A failure never stops the scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use tokio::sync::broadcast;

use dr_dispatch::{DispatchError, NotificationMessageHandler, ReceiptStore};

use crate::error::{io_err, DaemonError};
use crate::paths::{marked, unique_processing_dir};

/// Receives each staged manifest.
pub trait FileWatcherHandler {
    type Error: std::error::Error + Send + Sync + 'static;

    fn handle_file(
        &mut self,
        incoming_dir: &Path,
        processing_dir: &Path,
        manifest_file: &Path,
    ) -> Result<(), Self::Error>;
}

impl<S: ReceiptStore> FileWatcherHandler for NotificationMessageHandler<S> {
    type Error = DispatchError;

    fn handle_file(
        &mut self,
        incoming_dir: &Path,
        processing_dir: &Path,
        manifest_file: &Path,
    ) -> Result<(), DispatchError> {
        NotificationMessageHandler::handle_file(self, incoming_dir, processing_dir, manifest_file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

/// One manifest picked up by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledManifest {
    pub manifest: String,
    pub outcome: Outcome,
    /// Final, renamed processing directory.
    pub processing_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub handled: Vec<HandledManifest>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.handled.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.count(Outcome::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(Outcome::Failed)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.handled.iter().filter(|h| h.outcome == outcome).count()
    }
}

pub struct FileWatcher<H> {
    name: String,
    incoming: PathBuf,
    processing: PathBuf,
    suffixes: Vec<String>,
    interval: Duration,
    handler: H,
    last_dir_mtime: Option<SystemTime>,
    /// Manifests still in `incoming/` after an attempt (staging failed), by mtime.
    attempted: HashMap<String, SystemTime>,
}

impl<H: FileWatcherHandler> FileWatcher<H> {
    pub fn new(
        name: impl Into<String>,
        incoming: impl Into<PathBuf>,
        processing: impl Into<PathBuf>,
        suffixes: Vec<String>,
        interval: Duration,
        handler: H,
    ) -> Self {
        Self {
            name: name.into(),
            incoming: incoming.into(),
            processing: processing.into(),
            suffixes,
            interval,
            handler,
            last_dir_mtime: None,
            attempted: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// One pass over `incoming/`. Skipped entirely when the directory has not
    /// changed since the previous pass, unless that change is too recent to
    /// trust the timestamp granularity.
    ///
    /// Handled manifests leave `incoming/`; one that could not be staged is
    /// retried only once its modification time changes.
    pub fn scan(&mut self) -> Result<ScanReport, DaemonError> {
        let dir_mtime = std::fs::metadata(&self.incoming)
            .and_then(|m| m.modified())
            .map_err(|e| io_err(&self.incoming, e))?;
        if self.last_dir_mtime == Some(dir_mtime) && !recently(dir_mtime) {
            return Ok(ScanReport::default());
        }
        self.last_dir_mtime = Some(dir_mtime);

        let candidates = self.list_manifests()?;
        self.attempted
            .retain(|name, _| candidates.iter().any(|(_, n, _)| n == name));

        let mut report = ScanReport::default();
        for (path, name, mtime) in candidates {
            if self.attempted.get(&name) == Some(&mtime) {
                continue;
            }
            report.handled.push(self.process(&path, &name, mtime));
        }
        Ok(report)
    }

    /// Matching files in `incoming/`, oldest first (ties broken by name).
    fn list_manifests(&self) -> Result<Vec<(PathBuf, String, SystemTime)>, DaemonError> {
        let entries = std::fs::read_dir(&self.incoming).map_err(|e| io_err(&self.incoming, e))?;
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.incoming, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.suffixes.iter().any(|s| name.ends_with(s.as_str())) {
                continue;
            }
            let metadata = entry.metadata().map_err(|e| io_err(entry.path(), e))?;
            if !metadata.is_file() {
                continue;
            }
            let mtime = metadata.modified().map_err(|e| io_err(entry.path(), e))?;
            found.push((entry.path(), name, mtime));
        }
        found.sort_by(|a, b| a.2.cmp(&b.2).then_with(|| a.1.cmp(&b.1)));
        Ok(found)
    }

    fn process(&mut self, manifest: &Path, name: &str, mtime: SystemTime) -> HandledManifest {
        let started = Instant::now();
        let dir = unique_processing_dir(&self.processing, Utc::now(), name);
        let staged = dir.join(name);

        let staging = std::fs::create_dir_all(&dir)
            .and_then(|()| std::fs::rename(manifest, &staged))
            .map_err(|e| io_err(manifest, e));
        let outcome = match staging {
            Err(err) => {
                tracing::error!(watcher = %self.name, manifest = name, error = %err, "failed to stage manifest");
                self.attempted.insert(name.to_string(), mtime);
                Outcome::Failed
            }
            Ok(()) => match self.handler.handle_file(&self.incoming, &dir, &staged) {
                Ok(()) => Outcome::Success,
                Err(err) => {
                    tracing::error!(watcher = %self.name, manifest = name, error = %err, "manifest failed");
                    Outcome::Failed
                }
            },
        };

        let final_dir = marked(&dir, outcome == Outcome::Success);
        let processing_dir = if dir.exists() {
            match std::fs::rename(&dir, &final_dir) {
                Ok(()) => final_dir,
                Err(err) => {
                    tracing::error!(dir = %dir.display(), error = %err, "failed to mark processing directory");
                    dir
                }
            }
        } else {
            dir
        };

        tracing::info!(
            watcher = %self.name,
            manifest = name,
            outcome = ?outcome,
            duration_ms = started.elapsed().as_millis() as u64,
            "handled manifest"
        );
        HandledManifest {
            manifest: name.to_string(),
            outcome,
            processing_dir,
        }
    }
}

/// Directory timestamps younger than this are rescanned even when unchanged.
const MTIME_SETTLE: Duration = Duration::from_secs(2);

fn recently(mtime: SystemTime) -> bool {
    SystemTime::now()
        .duration_since(mtime)
        .map_or(true, |age| age < MTIME_SETTLE)
}

impl<H> FileWatcher<H>
where
    H: FileWatcherHandler + Send + 'static,
{
    /// Scan, then sleep for the interval, until `shutdown` fires.
    ///
    /// Shutdown is only observed between scans; a scan in progress always
    /// finishes.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        let mut watcher = self;
        tracing::info!(watcher = %watcher.name, dir = %watcher.incoming.display(), "watcher started");
        loop {
            match shutdown.try_recv() {
                Err(broadcast::error::TryRecvError::Empty) => {}
                _ => break,
            }

            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = watcher.scan();
                (watcher, result)
            })
            .await
            .map_err(|err| DaemonError::Task(format!("scan join error: {err}")))?;
            watcher = returned;

            match result {
                Ok(report) if !report.is_empty() => tracing::info!(
                    watcher = %watcher.name,
                    succeeded = report.succeeded(),
                    failed = report.failed(),
                    "scan complete"
                ),
                Ok(_) => {}
                Err(err) => tracing::warn!(watcher = %watcher.name, error = %err, "scan failed"),
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(watcher.interval) => {}
            }
        }
        tracing::info!(watcher = %watcher.name, "watcher stopped");
        Ok(())
    }
}
