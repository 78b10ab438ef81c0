//! dr: data-receipt ingestion CLI.
//!
//! # Usage
//!
//! ```text
//! dr watch [--once]
//! dr drcopy <manifest> [--watcher <name>]
//! dr nmcopy <manifest> <dest-dir>
//! dr nmmove <manifest> <dest-dir>
//! dr nmsplit <manifest> <max-files-per-manifest>
//! dr nmsort <manifest>
//! dr receipts [--watcher <name>] [--limit <n>] [--json]
//! dr dispatcher list|enable|disable [<type>] [--watcher <name>]
//! ```
//!
//! Every command that needs configuration reads `~/.dr/dr.yaml` unless
//! `--config` is given.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    dispatcher::DispatcherCommand,
    drcopy::DrCopyArgs,
    nm::{NmRelocateArgs, NmSortArgs, NmSplitArgs},
    receipts::ReceiptsArgs,
    watch::WatchArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dr",
    version,
    about = "Ingest notification messages and dispatch their data files",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ~/.dr/dr.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every configured watcher until ctrl-c.
    Watch(WatchArgs),

    /// Copy a manifest and its files into a watcher's incoming directory.
    Drcopy(DrCopyArgs),

    /// Copy a manifest and its files to another directory.
    Nmcopy(NmRelocateArgs),

    /// Move a manifest and its files to another directory.
    Nmmove(NmRelocateArgs),

    /// Split a manifest into smaller ones without separating batch prefixes.
    Nmsplit(NmSplitArgs),

    /// Write a copy of a manifest with its files in filename order.
    Nmsort(NmSortArgs),

    /// Show receipt records from a watcher's store.
    Receipts(ReceiptsArgs),

    /// Inspect or toggle dispatcher types.
    Dispatcher {
        #[command(subcommand)]
        command: DispatcherCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config;
    match cli.command {
        Commands::Watch(args) => args.run(config.as_deref()),
        Commands::Drcopy(args) => args.run(config.as_deref()),
        Commands::Nmcopy(args) => args.run_copy(),
        Commands::Nmmove(args) => args.run_move(),
        Commands::Nmsplit(args) => args.run(),
        Commands::Nmsort(args) => args.run(),
        Commands::Receipts(args) => args.run(config.as_deref()),
        Commands::Dispatcher { command } => commands::dispatcher::run(command, config.as_deref()),
    }
}
