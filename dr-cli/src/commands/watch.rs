//! `dr watch`: run the configured watchers.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use dr_daemon::{init_tracing, scan_once, start_blocking, Outcome};

use super::load_config;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Scan every watcher once and exit instead of polling.
    #[arg(long)]
    pub once: bool,
}

impl WatchArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        if !self.once {
            return start_blocking(config).context("watcher runtime failed");
        }

        init_tracing();
        let reports = scan_once(&config).context("scan failed")?;
        let mut failed = 0;
        for (watcher, report) in &reports {
            failed += report.failed();
            println!(
                "{}: {} succeeded, {} failed",
                watcher.bold(),
                report.succeeded(),
                report.failed()
            );
            for handled in &report.handled {
                let marker = match handled.outcome {
                    Outcome::Success => "ok".green(),
                    Outcome::Failed => "failed".red(),
                };
                println!(
                    "  [{marker}] {} -> {}",
                    handled.manifest,
                    handled.processing_dir.display()
                );
            }
        }
        if failed > 0 {
            anyhow::bail!("{failed} manifest(s) failed");
        }
        Ok(())
    }
}
