//! Correct command - apply a file of corrections.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use colored::Colorize;
use rollcall::{CorrectOptions, Correction};

use super::open_engine;

pub fn run(
    data_dir: &Path,
    file: PathBuf,
    create_missing: bool,
    defer: bool,
    actor: Option<String>,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let reader = File::open(&file)
        .map(BufReader::new)
        .map_err(|e| format!("Cannot open corrections file {}: {}", file.display(), e))?;
    let corrections: Vec<Correction> = serde_json::from_reader(reader)?;

    let engine = open_engine(data_dir)?;
    let options = CorrectOptions {
        create_missing,
        defer_unmatched: defer,
        actor,
    };
    let report = engine.correct(corrections, &options)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} {}/{} corrections (snapshot {})",
        "Applied".cyan().bold(),
        report.applied.to_string().white().bold(),
        report.submitted,
        report.snapshot.id
    );

    for change in &report.changes {
        println!(
            "  {} {}: {} -> {}",
            change.target,
            change.field.white(),
            change.prior.to_string().red(),
            change.new.to_string().green()
        );
    }
    for created in &report.created {
        println!("  {} {}", "created".green(), created);
    }

    if !report.not_found.is_empty() {
        println!();
        println!("{}", "Not found:".yellow().bold());
        for missing in &report.not_found {
            let target = missing
                .target
                .as_ref()
                .map_or_else(|| "(no target)".to_string(), |t| t.to_string());
            println!("  [{}] {}", missing.index, target);
        }
        if report.deferred > 0 {
            println!("  {} deferred until a later ingest", report.deferred);
        }
    }

    if !report.refused.is_empty() {
        println!();
        println!("{}", "Refused:".red().bold());
        for refused in &report.refused {
            println!("  [{}] {}", refused.index, refused.reason);
        }
    }

    println!();
    println!("Canonical records: {}", report.canonical_count.to_string().white().bold());
    Ok(())
}
