//! Ingest command - reconcile an extraction batch.

use std::path::{Path, PathBuf};

use colored::Colorize;
use rollcall::input::read_batch_file;
use rollcall::{IngestOptions, SequenceRange};

use super::open_engine;

#[allow(clippy::too_many_arguments)]
pub fn run(
    data_dir: &Path,
    file: PathBuf,
    section: String,
    all_or_nothing: bool,
    placeholders: bool,
    range: Option<SequenceRange>,
    actor: Option<String>,
    json_output: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !file.exists() {
        return Err(format!("Batch file not found: {}", file.display()).into());
    }

    let records = read_batch_file(&file)?;
    let engine = open_engine(data_dir)?;

    let mut options = IngestOptions::new();
    options.all_or_nothing = all_or_nothing;
    options.materialize_placeholders = placeholders;
    options.expected_range = range;
    options.actor = actor;

    let report = engine.ingest_batch(&section, records, &options)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{} {} records into {} (snapshot {})",
            "Ingested".cyan().bold(),
            report.received.to_string().white().bold(),
            report.section_key.white(),
            report.snapshot.id
        );

        if report.batch_rejected {
            println!(
                "{} batch rejected as a whole; nothing was changed.",
                "Warning:".yellow().bold()
            );
        } else {
            println!("  Added:    {}", report.added.to_string().green());
            println!(
                "  Matched:  {} ({} field updates)",
                report.matched.to_string().blue(),
                report.updated_fields
            );
            if report.stable_ids_adopted > 0 {
                println!("  Stable ids assigned: {}", report.stable_ids_adopted);
            }
        }

        if !report.conflicts.is_empty() {
            println!();
            println!("{}", "Conflicts (not applied):".red().bold());
            for conflict in &report.conflicts {
                println!("  [{}] {}: {}", conflict.index, conflict.target, conflict.reason);
            }
        }

        if !report.rejected.is_empty() {
            println!();
            println!("{}", "Needs manual placement:".yellow().bold());
            for rejected in &report.rejected {
                println!(
                    "  [{}] {}: {}",
                    rejected.index,
                    rejected.reason.label(),
                    rejected.detail
                );
            }
        }

        if !report.gaps.is_empty() {
            println!();
            let gaps: Vec<String> = report
                .gaps
                .iter()
                .map(|g| format!("{}#{}", g.section_key, g.declared_sequence))
                .collect();
            println!("{} {}", "Gaps:".yellow().bold(), gaps.join(", "));
        }

        if !report.duplicates_resolved.is_empty() {
            println!();
            println!("{}", "Duplicates resolved:".yellow().bold());
            for dup in &report.duplicates_resolved {
                println!(
                    "  {}#{}: kept {} ({}), superseded {}",
                    dup.section_key,
                    dup.declared_sequence,
                    dup.winner,
                    dup.rule.label(),
                    dup.losers.len()
                );
            }
        }

        if !report.placeholders_created.is_empty() {
            println!(
                "{} {} placeholders awaiting manual entry",
                "Created".cyan(),
                report.placeholders_created.len()
            );
        }
        if report.pending_corrections_applied > 0 {
            println!(
                "Applied {} deferred corrections",
                report.pending_corrections_applied
            );
        }
        if !report.pending_corrections_refused.is_empty() {
            println!("{}", "Dropped deferred corrections:".yellow().bold());
            for refused in &report.pending_corrections_refused {
                let target = refused.target.as_ref().map(|t| t.to_string()).unwrap_or_default();
                println!("  {}: {}", target, refused.reason);
            }
        }

        println!();
        println!("Canonical records: {}", report.canonical_count.to_string().white().bold());
    }

    if all_or_nothing {
        report.ensure_clean()?;
    }
    Ok(())
}
