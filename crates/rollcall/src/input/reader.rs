//! Batch readers for extraction output: JSON arrays and delimited text.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{Result, RollcallError};
use crate::record::FieldValue;

use super::incoming::{parse_declared_sequence, IncomingRecord};

/// Delimiters to try when auto-detecting.
const DELIMITERS: &[u8] = &[b'\t', b',', b';', b'|'];

/// Columns with a fixed meaning; every other column is a semantic field.
const SECTION_COLUMN: &str = "section_key";
const SEQUENCE_COLUMN: &str = "declared_sequence";
const STABLE_ID_COLUMN: &str = "stable_id";

/// Input format of a batch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    /// JSON array of records.
    Json,
    /// Delimited text with a header row (delimiter auto-detected).
    Delimited,
}

impl BatchFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => BatchFormat::Json,
            _ => BatchFormat::Delimited,
        }
    }
}

/// Read a batch file, choosing the format by extension.
pub fn read_batch_file(path: impl AsRef<Path>) -> Result<Vec<IncomingRecord>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| RollcallError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut contents = Vec::new();
    file.read_to_end(&mut contents).map_err(|e| RollcallError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    match BatchFormat::from_path(path) {
        BatchFormat::Json => read_json_batch(&contents),
        BatchFormat::Delimited => read_delimited_batch(&contents, None),
    }
}

/// Parse a JSON array of incoming records.
pub fn read_json_batch(bytes: &[u8]) -> Result<Vec<IncomingRecord>> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Parse delimited text with a header row.
///
/// `section_key`, `declared_sequence` and `stable_id` columns are recognized
/// by name; all other columns become fields. Empty cells become null.
pub fn read_delimited_batch(bytes: &[u8], delimiter: Option<u8>) -> Result<Vec<IncomingRecord>> {
    let delimiter = match delimiter {
        Some(d) => d,
        None => detect_delimiter(bytes),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut batch = Vec::new();
    for result in reader.records() {
        let row = result?;
        let mut record = IncomingRecord::default();
        for (column, cell) in headers.iter().zip(row.iter()) {
            let cell = cell.trim();
            match column.as_str() {
                SECTION_COLUMN => {
                    if !cell.is_empty() {
                        record.section_key = Some(cell.to_string());
                    }
                }
                SEQUENCE_COLUMN => record.declared_sequence = parse_declared_sequence(cell),
                STABLE_ID_COLUMN => {
                    if !cell.is_empty() {
                        record.stable_id = Some(cell.to_string());
                    }
                }
                _ => {
                    record.fields.insert(column.clone(), FieldValue::from_raw(cell));
                }
            }
        }
        batch.push(record);
    }

    Ok(batch)
}

/// Detect the delimiter by analyzing the first few lines.
fn detect_delimiter(bytes: &[u8]) -> u8 {
    let lines: Vec<String> = BufReader::new(bytes)
        .lines()
        .take(10)
        .filter_map(|l| l.ok())
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut best_delimiter = b',';
    let mut best_score = 0;

    for &delim in DELIMITERS {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| count_delimiter_in_line(line, delim))
            .collect();

        let Some(&first_count) = counts.first() else {
            continue;
        };
        if first_count == 0 {
            continue;
        }

        // Consistent counts across lines beat raw frequency
        let score = if counts.iter().all(|&c| c == first_count) {
            first_count * 1000 + usize::from(delim == b'\t') * 100
        } else {
            first_count
        };

        if score > best_score {
            best_score = score;
            best_delimiter = delim;
        }
    }

    best_delimiter
}

/// Count delimiter occurrences in a line, respecting quotes.
fn count_delimiter_in_line(line: &str, delimiter: u8) -> usize {
    let delim_char = delimiter as char;
    let mut count = 0;
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == delim_char && !in_quotes => count += 1,
            _ => {}
        }
    }

    count
}
