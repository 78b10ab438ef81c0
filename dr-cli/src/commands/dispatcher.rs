//! `dr dispatcher`: operator kill-switches per dispatcher type.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use dr_core::{DispatcherStatus, DispatcherType, DISPATCHER_ORDERING};
use dr_dispatch::{JsonStore, ReceiptStore};

use super::{load_config, select_watcher};

#[derive(Subcommand, Debug)]
pub enum DispatcherCommand {
    /// Every dispatcher type in dispatch order with its status.
    List {
        #[command(flatten)]
        target: WatcherArg,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },
    /// Allow a dispatcher type to run again.
    Enable {
        /// Type name, e.g. `FFI` or `long-cadence-pixel`.
        dispatcher_type: DispatcherType,
        #[command(flatten)]
        target: WatcherArg,
    },
    /// Skip a dispatcher type for every following message.
    Disable {
        dispatcher_type: DispatcherType,
        #[command(flatten)]
        target: WatcherArg,
    },
}

#[derive(Args, Debug)]
pub struct WatcherArg {
    /// Watcher whose store to use; optional when only one is configured.
    #[arg(long)]
    pub watcher: Option<String>,
}

pub fn run(command: DispatcherCommand, config_path: Option<&Path>) -> Result<()> {
    match command {
        DispatcherCommand::List { target, json } => list(config_path, target, json),
        DispatcherCommand::Enable {
            dispatcher_type,
            target,
        } => set_enabled(config_path, target, dispatcher_type, true),
        DispatcherCommand::Disable {
            dispatcher_type,
            target,
        } => set_enabled(config_path, target, dispatcher_type, false),
    }
}

fn open_store(config_path: Option<&Path>, target: &WatcherArg) -> Result<(String, JsonStore)> {
    let config = load_config(config_path)?;
    let watcher = select_watcher(&config, target.watcher.as_deref())?;
    let store_file = watcher.paths().store_file();
    let store = JsonStore::open(&store_file)
        .with_context(|| format!("failed to open store {}", store_file.display()))?;
    Ok((watcher.name.clone(), store))
}

fn set_enabled(
    config_path: Option<&Path>,
    target: WatcherArg,
    dispatcher_type: DispatcherType,
    enabled: bool,
) -> Result<()> {
    let (watcher, mut store) = open_store(config_path, &target)?;
    store.begin()?;
    let saved = store
        .set_dispatcher_status(DispatcherStatus {
            dispatcher_type,
            enabled,
        })
        .and_then(|()| store.commit());
    if saved.is_err() {
        store.rollback_if_active();
    }
    saved.with_context(|| format!("failed to update {dispatcher_type} for watcher '{watcher}'"))?;

    let word = if enabled {
        "enabled".green()
    } else {
        "disabled".red()
    };
    println!("{dispatcher_type} {word} for watcher '{watcher}'");
    Ok(())
}

#[derive(Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "order")]
    order: usize,
    #[tabled(rename = "dispatcher")]
    dispatcher_type: String,
    #[tabled(rename = "enabled")]
    enabled: bool,
}

fn list(config_path: Option<&Path>, target: WatcherArg, json: bool) -> Result<()> {
    let (_, store) = open_store(config_path, &target)?;
    let rows: Vec<StatusRow> = DISPATCHER_ORDERING
        .iter()
        .enumerate()
        .map(|(idx, ty)| StatusRow {
            order: idx + 1,
            dispatcher_type: ty.to_string(),
            enabled: store.dispatcher_status(*ty).map_or(true, |s| s.enabled),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
