//! `autodeploy status` — local changes and preserved stashes.
//!
//! A working copy with local changes blocks every deployment, so this is the
//! first thing to look at when runs keep ending in `AbortedDirtyTree`.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use autodeploy_agent::logging::{self, Console};
use autodeploy_core::OperationState;
use autodeploy_sync::{Inspector, StashEntry, SystemRunner};

use crate::GlobalArgs;

/// Arguments for `autodeploy status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct StatusJson {
    clean: bool,
    operation: OperationState,
    changes: Vec<ChangeRow>,
    preserved_stashes: Vec<StashRow>,
}

#[derive(Serialize, Tabled)]
struct ChangeRow {
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "path")]
    path: String,
}

#[derive(Serialize, Tabled)]
struct StashRow {
    #[tabled(rename = "stash")]
    reference: String,
    #[tabled(rename = "message")]
    message: String,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<i32> {
        let config = global.load_config()?;
        if !config.work_dir.is_dir() {
            bail!("working directory {} does not exist", config.work_dir.display());
        }
        if !self.json {
            logging::init_console(Console::Stdout);
        }

        let inspector = Inspector::new(&SystemRunner, &config);
        let status = inspector
            .classify_working_copy()
            .context("failed to read working copy status")?;
        let stashes = inspector
            .preserved_stashes()
            .context("failed to list stashes")?;

        let changes: Vec<ChangeRow> = status
            .entries
            .iter()
            .map(String::as_str)
            .map(change_row)
            .collect();
        let stash_rows: Vec<StashRow> = stashes.into_iter().map(stash_row).collect();

        if self.json {
            let payload = StatusJson {
                clean: status.is_clean(),
                operation: status.operation,
                changes,
                preserved_stashes: stash_rows,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(0);
        }

        println!(
            "{} | {} | branch {}",
            config.process_name.bold(),
            config.work_dir.display(),
            config.branch
        );
        if status.operation != OperationState::None {
            println!("{}", format!("{} in progress", status.operation).red().bold());
        }

        if changes.is_empty() {
            println!("{}", "No local changes.".green());
        } else {
            println!(
                "{}",
                format!("Local changes ({}):", status.describe_changes()).yellow().bold()
            );
            let mut table = Table::new(changes);
            table.with(Style::rounded());
            println!("{table}");
            println!("Commit or remove these before the next deployment.");
        }

        if stash_rows.is_empty() {
            println!("No preserved stashes ({}).", config.stash_label);
        } else {
            println!("{}", "Preserved stashes:".bold());
            let mut table = Table::new(stash_rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        Ok(0)
    }
}

/// Split a porcelain line (`XY path`) into its status code and path.
fn change_row(entry: &str) -> ChangeRow {
    let status = entry.get(..2).unwrap_or(entry).trim().to_string();
    let path = entry.get(3..).unwrap_or_default().to_string();
    ChangeRow { status, path }
}

fn stash_row(entry: StashEntry) -> StashRow {
    StashRow {
        reference: entry.reference,
        message: entry.message,
    }
}
