//! Polling ingestion daemon: one [`FileWatcher`] per configured directory.

pub mod config;
mod error;
pub mod paths;
mod runtime;
pub mod watcher;

pub use config::{DaemonConfig, WatcherConfig};
pub use error::DaemonError;
pub use paths::WatcherPaths;
pub use runtime::{build_watcher, init_tracing, run, scan_once, start_blocking, IngestWatcher};
pub use watcher::{FileWatcher, FileWatcherHandler, HandledManifest, Outcome, ScanReport};
