//! Renumber command - recompute canonical indexes.

use std::path::Path;

use colored::Colorize;

use super::open_engine;

pub fn run(data_dir: &Path, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let report = engine.renumber_now()?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} {} records ({} changed, snapshot {})",
            "Renumbered".cyan().bold(),
            report.canonical_count.to_string().white().bold(),
            report.changed,
            report.snapshot.id
        );
    }
    Ok(())
}
