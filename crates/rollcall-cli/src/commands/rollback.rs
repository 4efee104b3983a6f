//! Rollback command - restore a snapshot.

use std::path::Path;

use colored::Colorize;

use super::open_engine;

pub fn run(data_dir: &Path, snapshot: u64, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let report = engine.rollback(snapshot)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} snapshot {} ({}, {})",
            "Restored".cyan().bold(),
            report.restored_from.id.to_string().white().bold(),
            report.restored_from.reason,
            report.restored_from.taken_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("  Replaced state saved as snapshot {}", report.snapshot.id);
        println!("Canonical records: {}", report.canonical_count.to_string().white().bold());
    }
    Ok(())
}
