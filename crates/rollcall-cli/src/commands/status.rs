//! Status command - dataset summary.

use std::path::Path;

use colored::Colorize;

use super::open_engine;

pub fn run(data_dir: &Path, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let status = engine.status()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} {}", "Dataset in".cyan().bold(), data_dir.display().to_string().white());
    println!();
    println!(
        "Records: {} ({} active, {} superseded)",
        status.records.to_string().white().bold(),
        status.active.to_string().green(),
        status.superseded.to_string().dimmed()
    );
    println!("Canonical records: {}", status.canonical_count.to_string().white().bold());

    if status.sections.is_empty() {
        println!("Sections: {}", "(none)".dimmed());
    } else {
        println!("Sections ({}): {}", status.sections.len(), status.sections.join(", "));
    }

    if status.pending_manual_entry > 0 {
        println!(
            "{} {} placeholders awaiting manual entry",
            "Note:".yellow().bold(),
            status.pending_manual_entry
        );
    }
    if status.pending_corrections > 0 {
        println!(
            "{} {} deferred corrections waiting for their records",
            "Note:".yellow().bold(),
            status.pending_corrections
        );
    }

    println!();
    println!(
        "Logged: {} correction batches, {} removals",
        status.corrections_logged, status.removals_logged
    );
    match &status.latest_snapshot {
        Some(handle) => println!(
            "Latest snapshot: {} ({}, {})",
            handle.id,
            handle.reason,
            handle.taken_at.format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("Latest snapshot: {}", "(none)".dimmed()),
    }
    Ok(())
}
