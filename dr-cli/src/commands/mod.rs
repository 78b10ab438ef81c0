pub mod dispatcher;
pub mod drcopy;
pub mod nm;
pub mod receipts;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use dr_daemon::config::config_path_at;
use dr_daemon::{DaemonConfig, WatcherConfig};

/// Load `explicit`, or `~/.dr/dr.yaml` when no path was given.
pub fn load_config(explicit: Option<&Path>) -> Result<DaemonConfig> {
    let path: PathBuf = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let home = dirs::home_dir().context("could not determine home directory")?;
            config_path_at(&home)
        }
    };
    DaemonConfig::load_at(&path)
        .with_context(|| format!("failed to load config {}", path.display()))
}

/// The named watcher, or the only one when no name is given.
pub fn select_watcher<'a>(
    config: &'a DaemonConfig,
    name: Option<&str>,
) -> Result<&'a WatcherConfig> {
    match name {
        Some(name) => config
            .watcher(name)
            .with_context(|| format!("no watcher named '{name}'")),
        None if config.watchers.len() == 1 => Ok(&config.watchers[0]),
        None => bail!(
            "several watchers configured ({}); choose one with --watcher",
            watcher_names(config)
        ),
    }
}

pub fn watcher_names(config: &DaemonConfig) -> String {
    config
        .watchers
        .iter()
        .map(|w| w.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
