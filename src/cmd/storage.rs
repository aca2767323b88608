//! Local storage commands: `sprintboard storage show|clear`.

use anyhow::{Context, Result};

use super::super::StorageCommands;
use super::{confirm, open_context};
use crate::Cli;

pub async fn cmd_storage(cli: &Cli, command: StorageCommands) -> Result<()> {
    let ctx = open_context(cli)?;

    match command {
        StorageCommands::Show => {
            println!();
            println!("Data directory:  {}", ctx.config.data_dir().display());
            println!("Cache directory: {}", ctx.config.cache_dir().display());
            println!();
            let keys = ctx.storage.keys();
            if keys.is_empty() {
                println!("No stored keys.");
            } else {
                for key in &keys {
                    println!("  - {}", key);
                }
                println!();
                println!("{} key(s) stored", keys.len());
            }
            println!();
        }
        StorageCommands::Clear { force } => {
            if !confirm("Log out and clear all local data?", force) {
                println!("Cancelled.");
                return Ok(());
            }
            let report = ctx
                .teardown()
                .await
                .context("Failed to clear local storage")?;
            println!(
                "Cleared {} stored key(s), {} session value(s) and {} cache entr(y/ies).",
                report.durable_keys, report.session_keys, report.cache_entries
            );
        }
    }

    Ok(())
}
