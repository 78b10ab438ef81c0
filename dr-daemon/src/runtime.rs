use dr_dispatch::{DirBlobStore, EventLogPublisher, JsonStore, NotificationMessageHandler};
use tokio::sync::broadcast;

use crate::config::{DaemonConfig, WatcherConfig};
use crate::error::{io_err, DaemonError};
use crate::watcher::{FileWatcher, ScanReport};

/// The production watcher: JSON store, directory blobs and an event log, all
/// under the watcher's `state/` directory.
pub type IngestWatcher = FileWatcher<NotificationMessageHandler<JsonStore>>;

/// Build the watcher for `config`, creating its directories.
pub fn build_watcher(config: &WatcherConfig) -> Result<IngestWatcher, DaemonError> {
    let paths = config.paths();
    for dir in [paths.incoming(), paths.processing(), paths.state()] {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    let store = JsonStore::open(paths.store_file())?;
    let handler = NotificationMessageHandler::new(store, DirBlobStore::new(paths.blobs()))
        .with_publisher(EventLogPublisher::new(paths.events_file()))
        .with_move_to_processing(config.move_to_processing);

    Ok(FileWatcher::new(
        &config.name,
        paths.incoming(),
        paths.processing(),
        config.manifest_suffixes.clone(),
        config.scan_interval(),
        handler,
    ))
}

/// Run a single scan of every watcher on the current thread.
pub fn scan_once(config: &DaemonConfig) -> Result<Vec<(String, ScanReport)>, DaemonError> {
    config.validate()?;
    let mut reports = Vec::with_capacity(config.watchers.len());
    for watcher_config in &config.watchers {
        let mut watcher = build_watcher(watcher_config)?;
        let report = watcher.scan()?;
        reports.push((watcher_config.name.clone(), report));
    }
    Ok(reports)
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: DaemonConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run every configured watcher until ctrl-c, or until any watcher exits.
pub async fn run(config: DaemonConfig) -> Result<(), DaemonError> {
    config.validate()?;
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let mut handles = Vec::with_capacity(config.watchers.len() + 1);
    for watcher_config in &config.watchers {
        let watcher = build_watcher(watcher_config)?;
        let shutdown = shutdown_tx.clone();
        let handle = tokio::spawn(async move {
            let result = watcher.run(shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        });
        handles.push((watcher_config.name.clone(), handle));
    }

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Task(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };
    handles.push(("signal_handler".to_string(), signal_handle));

    tracing::info!(watchers = config.watchers.len(), "daemon started");
    let mut first_error = None;
    for (task, handle) in handles {
        if let Err(err) = handle_join(&task, handle.await) {
            tracing::error!(task = %task, error = %err, "task failed");
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task(format!("{task} task join failure: {err}"))),
    }
}

/// Install the fmt subscriber once. `RUST_LOG` overrides the `info` default;
/// `DR_LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("DR_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt().json().with_env_filter(filter).with_target(false).try_init()
    } else {
        fmt().with_env_filter(filter).with_target(false).try_init()
    };
}
