//! Export command - write active records in canonical order as CSV.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use colored::Colorize;

use super::open_engine;

pub fn run(data_dir: &Path, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(data_dir)?;

    match output {
        Some(path) => {
            let file = File::create(&path)
                .map_err(|e| format!("Cannot create {}: {}", path.display(), e))?;
            let rows = engine.export_csv(BufWriter::new(file))?;
            eprintln!(
                "{} {} records to {}",
                "Exported".green().bold(),
                rows,
                path.display()
            );
        }
        None => {
            engine.export_csv(io::stdout().lock())?;
        }
    }
    Ok(())
}
