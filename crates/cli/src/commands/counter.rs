// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use std::path::Path;
use std::time::Duration;

use lineage_kernel::counter::{CounterStore, LockFileCounter, LockStatus};

use super::block_on;

pub fn show(counter_path: &Path) -> anyhow::Result<()> {
    let counter = LockFileCounter::new(counter_path);
    let (value, lock) = block_on(async { (counter.current().await, counter.lock_status().await) })?;

    println!("\nCounter Status Report");
    println!("---------------------");

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Item", "Status", "Details"]);

    match value {
        Ok(v) if counter_path.exists() => {
            table.add_row(vec!["Counter", "OK", &v.to_string()]);
        }
        Ok(_) => {
            table.add_row(vec!["Counter", "MISSING", "next allocation starts at 1"]);
        }
        Err(e) => {
            table.add_row(vec!["Counter", "CORRUPT", &e.to_string()]);
        }
    }

    match lock? {
        LockStatus::Free => {
            table.add_row(vec!["Lock", "FREE", ""]);
        }
        LockStatus::Held { info, stale } => {
            let status = if stale { "STALE" } else { "HELD" };
            let details = match info {
                Some(info) => format!(
                    "holder {} (pid {}), acquired {}, expires {}",
                    info.holder_id,
                    info.pid,
                    info.acquired_at.to_rfc3339(),
                    info.expires_at.to_rfc3339()
                ),
                None => "unreadable lock contents".to_string(),
            };
            table.add_row(vec!["Lock", status, &details]);
        }
    }

    println!("{}", table);
    Ok(())
}

/// Overwrite the counter under its lock. Recovery for a corrupted file; the new
/// value should be at least the highest sequence already stored.
pub fn set(counter_path: &Path, value: u64, timeout: Duration) -> anyhow::Result<()> {
    let counter = LockFileCounter::new(counter_path);
    block_on(counter.set(value, timeout))??;
    println!("Counter at {} set to {}", counter_path.display(), value);
    Ok(())
}
