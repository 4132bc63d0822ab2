// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};

use std::path::Path;

use anyhow::Context;
use lineage_kernel::id::{Allocation, EventId};
use lineage_kernel::sink::{EventSink, FsSink};

use super::block_on;

pub fn list(dir: &Path) -> anyhow::Result<()> {
    let sink = FsSink::new(dir);
    let rows = block_on(async {
        let mut rows = Vec::new();
        for id in sink.list().await? {
            let size = sink.fetch(&id).await?.map_or(0, |bytes| bytes.len());
            rows.push((id, size));
        }
        Ok::<_, lineage_kernel::SinkError>(rows)
    })??;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Event ID", "Allocation", "Size (bytes)"]);

    for (id, size) in &rows {
        table.add_row(vec![id.to_string(), describe(id.allocation()), size.to_string()]);
    }

    println!("{}", table);
    println!("{} events in {}", rows.len(), dir.display());
    Ok(())
}

pub fn show(dir: &Path, id: &str) -> anyhow::Result<()> {
    let id = parse_id(id)?;
    let sink = FsSink::new(dir);
    let bytes = block_on(sink.fetch(&id))??
        .with_context(|| format!("No event {} in {}", id, dir.display()))?;
    println!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}

/// Accepts a bare identifier or its file name.
fn parse_id(raw: &str) -> anyhow::Result<EventId> {
    EventId::from_file_name(raw)
        .or_else(|| raw.parse().ok())
        .with_context(|| format!("Not an event identifier: {}", raw))
}

fn describe(allocation: Allocation) -> String {
    match allocation {
        Allocation::Sequence(n) => format!("sequence {}", n),
        Allocation::Timestamp(_) => match allocation.timestamp() {
            Some(at) => format!("fallback {}", at.to_rfc3339()),
            None => "fallback".to_string(),
        },
    }
}
