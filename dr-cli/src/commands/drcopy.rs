//! `dr drcopy`: hand a manifest to a watcher.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use dr_core::nm_tools;

use super::{load_config, watcher_names};

#[derive(Args, Debug)]
pub struct DrCopyArgs {
    /// Manifest to copy; the files it lists must sit next to it.
    pub manifest: PathBuf,

    /// Target watcher. Defaults to the first one whose suffixes accept the manifest.
    #[arg(long)]
    pub watcher: Option<String>,
}

impl DrCopyArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let manifest_name = self
            .manifest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("'{}' has no file name", self.manifest.display()))?;

        let watcher = match self.watcher.as_deref() {
            Some(name) => config
                .watcher(name)
                .with_context(|| format!("no watcher named '{name}'"))?,
            None => config.watcher_for_manifest(&manifest_name).with_context(|| {
                format!(
                    "no watcher accepts '{manifest_name}' (watchers: {})",
                    watcher_names(&config)
                )
            })?,
        };

        let incoming = watcher.paths().incoming();
        std::fs::create_dir_all(&incoming)
            .with_context(|| format!("failed to create {}", incoming.display()))?;
        let relocation = nm_tools::copy(&self.manifest, &incoming)
            .with_context(|| format!("failed to copy {}", self.manifest.display()))?;
        println!(
            "copied {} file(s) and {} to watcher '{}'",
            relocation.files.len(),
            manifest_name,
            watcher.name
        );
        Ok(())
    }
}
