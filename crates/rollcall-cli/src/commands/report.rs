//! Report command - show one section's gaps, duplicates and superseded records.

use std::path::Path;

use colored::Colorize;

use super::open_engine;

pub fn run(data_dir: &Path, section: String, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let report = engine.section_report(&section)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{} {}", "Section".cyan().bold(), report.section_key.white().bold());
    match report.expected_range {
        Some(range) => println!("  Expected range: {}", range),
        None => println!("  Expected range: {}", "(inferred from records)".dimmed()),
    }
    println!("  Active records: {}", report.active.to_string().white().bold());
    println!();

    if report.gaps.is_empty() {
        println!("{}", "No gaps.".green());
    } else {
        println!(
            "{} {}",
            format!("Gaps ({}):", report.gaps.len()).yellow().bold(),
            join_numbers(&report.gaps)
        );
    }

    if !report.pending_manual_entry.is_empty() {
        println!(
            "{} {}",
            "Awaiting manual entry:".yellow().bold(),
            join_numbers(&report.pending_manual_entry)
        );
    }

    if !report.out_of_range.is_empty() {
        println!(
            "{} {}",
            "Outside expected range:".red().bold(),
            join_numbers(&report.out_of_range)
        );
    }

    if !report.duplicates.is_empty() {
        println!();
        println!("{}", "Unsettled duplicates:".red().bold());
        for dup in &report.duplicates {
            println!(
                "  #{}: {} would win over {} ({})",
                dup.declared_sequence,
                dup.winner,
                dup.losers.len(),
                dup.rule.label()
            );
        }
    }

    if !report.superseded.is_empty() {
        println!();
        println!("{}", "Superseded:".dimmed().bold());
        for entry in &report.superseded {
            let sequence = entry
                .declared_sequence
                .map_or_else(|| "?".to_string(), |s| s.to_string());
            let label = entry.stable_id.as_deref().unwrap_or("-");
            println!(
                "  {} #{} {} -> {}",
                entry.record_id,
                sequence,
                label.dimmed(),
                entry.superseded_by
            );
        }
    }

    Ok(())
}

fn join_numbers(numbers: &[u32]) -> String {
    numbers.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", ")
}
