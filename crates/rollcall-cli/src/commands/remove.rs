//! Remove command - take a record out of the dataset.

use std::path::Path;

use colored::Colorize;

use super::open_engine;
use crate::cli::TargetArgs;

pub fn run(
    data_dir: &Path,
    target: TargetArgs,
    reason: String,
    actor: Option<String>,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reference = target
        .reference()
        .ok_or("Name the record with --stable-id, --record-id or --section with --sequence")?;

    let engine = open_engine(data_dir)?;
    let report = engine.remove(&reference, &reason, actor.as_deref())?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {} (snapshot {})",
        "Removed".red().bold(),
        report.removed.reference(),
        report.snapshot.id
    );
    for id in &report.reinstated {
        println!("  {} {}", "reinstated".green(), id);
    }
    println!("Canonical records: {}", report.canonical_count.to_string().white().bold());
    Ok(())
}
