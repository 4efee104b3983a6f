//! History command - list snapshots.

use std::path::Path;

use colored::Colorize;

use super::open_engine;

pub fn run(data_dir: &Path, limit: Option<usize>, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let mut snapshots = engine.history()?;
    if let Some(limit) = limit {
        snapshots.truncate(limit);
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    if snapshots.is_empty() {
        println!("{}", "No snapshots yet.".dimmed());
        return Ok(());
    }

    println!("{}", "Snapshots (newest first)".cyan().bold());
    for handle in &snapshots {
        println!(
            "  {:>4}  {}  {:>6} records  {:<28} {}",
            handle.id.to_string().white().bold(),
            handle.taken_at.format("%Y-%m-%d %H:%M:%S"),
            handle.record_count,
            handle.reason,
            handle.digest.dimmed()
        );
    }
    Ok(())
}
