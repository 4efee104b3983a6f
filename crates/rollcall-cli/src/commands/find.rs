//! Find command - search records by field content.

use std::path::Path;

use colored::Colorize;

use super::open_engine;

pub fn run(data_dir: &Path, field: String, needle: String, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;
    let records = engine.find(&field, &needle);

    if json_output {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No records with {} matching '{}'", field, needle);
        return Ok(());
    }

    println!("{} {} records", "Found".cyan().bold(), records.len());
    for record in &records {
        let index = record
            .canonical_index
            .map_or_else(|| "-".to_string(), |i| i.to_string());
        let value = record.field(&field).map(|v| v.to_string()).unwrap_or_default();
        let state = if record.is_active() {
            "active".green()
        } else {
            "superseded".dimmed()
        };
        println!(
            "  {:>5}  {:<24} {}  {}",
            index,
            record.reference().to_string(),
            value.white(),
            state
        );
    }
    Ok(())
}
