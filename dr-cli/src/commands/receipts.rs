//! `dr receipts`: receipt history of one watcher.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use dr_core::{ReceiptRecord, RecordState};
use dr_dispatch::{JsonStore, ReceiptStore};

use super::{load_config, select_watcher};

#[derive(Args, Debug)]
pub struct ReceiptsArgs {
    /// Watcher whose store to read; optional when only one is configured.
    #[arg(long)]
    pub watcher: Option<String>,

    /// Show only the most recent N receipts.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ReceiptsArgs {
    pub fn run(self, config_path: Option<&Path>) -> Result<()> {
        let config = load_config(config_path)?;
        let watcher = select_watcher(&config, self.watcher.as_deref())?;
        let store_file = watcher.paths().store_file();
        let store = JsonStore::open(&store_file)
            .with_context(|| format!("failed to open store {}", store_file.display()))?;

        let mut receipts = store.receipts();
        receipts.sort_by_key(|r| r.id);
        if let Some(limit) = self.limit {
            let skip = receipts.len().saturating_sub(limit);
            receipts.drain(..skip);
        }

        let rows: Vec<ReceiptRow> = receipts
            .iter()
            .map(|receipt| ReceiptRow::build(&store, receipt))
            .collect();

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }
        print_table(&watcher.name, rows);
        Ok(())
    }
}

#[derive(Serialize)]
struct ReceiptRow {
    id: Option<u64>,
    identifier: String,
    message_type: String,
    state: RecordState,
    files: usize,
    dispatchers: Vec<String>,
    first_timestamp: Option<String>,
    last_timestamp: Option<String>,
    received_at: String,
}

impl ReceiptRow {
    fn build(store: &JsonStore, receipt: &ReceiptRecord) -> Self {
        let dispatchers = receipt
            .id
            .map(|id| store.dispatches_for(id))
            .unwrap_or_default()
            .into_iter()
            .map(|d| d.dispatcher_type.to_string())
            .collect();
        Self {
            id: receipt.id.map(|id| id.0),
            identifier: receipt.identifier.clone(),
            message_type: receipt.message_type.clone(),
            state: receipt.state,
            files: receipt.total_file_count,
            dispatchers,
            first_timestamp: receipt.first_timestamp.clone(),
            last_timestamp: receipt.last_timestamp.clone(),
            received_at: receipt.received_at.to_rfc3339(),
        }
    }
}

#[derive(Tabled)]
struct ReceiptTableRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "manifest")]
    identifier: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "files")]
    files: usize,
    #[tabled(rename = "dispatchers")]
    dispatchers: String,
    #[tabled(rename = "received")]
    received_at: String,
}

fn print_table(watcher: &str, rows: Vec<ReceiptRow>) {
    if rows.is_empty() {
        println!("No receipts recorded for watcher '{watcher}'.");
        return;
    }
    let failed = rows.iter().filter(|r| r.state == RecordState::Failure).count();

    let table_rows: Vec<ReceiptTableRow> = rows
        .into_iter()
        .map(|row| ReceiptTableRow {
            id: row.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            identifier: row.identifier,
            state: colored_state(row.state),
            files: row.files,
            dispatchers: row.dispatchers.join(", "),
            received_at: row.received_at,
        })
        .collect();
    let count = table_rows.len();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("{count} receipt(s), {failed} failed");
}

fn colored_state(state: RecordState) -> String {
    match state {
        RecordState::Success => state.to_string().green().to_string(),
        RecordState::Failure => state.to_string().red().to_string(),
        RecordState::Processing => state.to_string().yellow().to_string(),
    }
}
