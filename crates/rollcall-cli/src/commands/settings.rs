//! Dataset settings - expected ranges, section order, snapshot retention.

use std::path::Path;

use colored::Colorize;
use rollcall::SequenceRange;

use super::open_engine;

pub fn range(data_dir: &Path, section: String, range: SequenceRange) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let report = engine.set_expected_range(&section, range)?;

    println!(
        "{} {} to {}",
        "Set range of".cyan().bold(),
        report.section_key.white().bold(),
        range
    );
    if !report.gaps.is_empty() {
        println!("  {} gaps", report.gaps.len().to_string().yellow());
    }
    if !report.out_of_range.is_empty() {
        println!("  {} records outside the range", report.out_of_range.len().to_string().red());
    }
    Ok(())
}

pub fn order(data_dir: &Path, sections: Vec<String>) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let listed = sections.join(" > ");
    let report = engine.set_section_order(sections)?;

    println!("{} {}", "Section order:".cyan().bold(), listed);
    println!(
        "  Renumbered {} records ({} changed)",
        report.canonical_count, report.changed
    );
    Ok(())
}

pub fn prune(data_dir: &Path, keep: usize) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let removed = engine.prune_snapshots(keep)?;

    if removed.is_empty() {
        println!("{}", "Nothing to prune.".dimmed());
    } else {
        println!(
            "{} {} snapshots, kept the newest {}",
            "Pruned".yellow().bold(),
            removed.len(),
            keep
        );
    }
    Ok(())
}
