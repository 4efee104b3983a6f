//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use rollcall::{RecordId, RecordRef, SequenceRange};
use std::path::PathBuf;

/// rollcall: reconcile OCR-extracted roll records into one canonical sequence
#[derive(Parser)]
#[command(name = "rollcall")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding dataset.json, its history and rollcall.json
    #[arg(short, long, global = true, default_value = ".rollcall")]
    pub data_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile an extraction batch (JSON array or CSV/TSV) into the dataset
    Ingest {
        /// Path to the batch file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Section the batch belongs to
        #[arg(short, long)]
        section: String,

        /// Reject the whole batch if any record conflicts or is unidentifiable
        #[arg(long)]
        all_or_nothing: bool,

        /// Insert placeholders awaiting manual entry at every gap
        #[arg(long)]
        placeholders: bool,

        /// Expected declared-sequence range for the section (e.g. 1..120)
        #[arg(short, long)]
        range: Option<SequenceRange>,

        /// Actor recorded in provenance
        #[arg(long)]
        actor: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply a JSON array of corrections
    Correct {
        /// Path to the corrections file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Create records for position targets that do not exist
        #[arg(long)]
        create_missing: bool,

        /// Keep corrections whose target is missing and retry them on later ingests
        #[arg(long)]
        defer: bool,

        /// Actor recorded in provenance
        #[arg(long)]
        actor: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute canonical indexes
    Renumber {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show gaps, duplicates and superseded records of a section
    Report {
        /// Section key
        #[arg(value_name = "SECTION")]
        section: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a record (snapshotted and logged)
    Remove {
        #[command(flatten)]
        target: TargetArgs,

        /// Why the record is being removed
        #[arg(long)]
        reason: String,

        /// Actor recorded in the removal log
        #[arg(long)]
        actor: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List snapshots, newest first
    History {
        /// Show at most this many snapshots
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Restore a snapshot as the current dataset
    Rollback {
        /// Snapshot id (see `rollcall history`)
        #[arg(value_name = "SNAPSHOT")]
        snapshot: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export active records in canonical order as CSV
    Export {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show dataset summary
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Set the expected declared-sequence range of a section
    Range {
        /// Section key
        #[arg(value_name = "SECTION")]
        section: String,

        /// Range, e.g. 1..120
        #[arg(value_name = "RANGE")]
        range: SequenceRange,
    },

    /// Set the order sections are numbered in
    Order {
        /// Every known section, in order
        #[arg(value_name = "SECTION", required = true)]
        sections: Vec<String>,
    },

    /// Delete all but the newest snapshots
    Prune {
        /// Snapshots to keep
        #[arg(long)]
        keep: usize,
    },

    /// Find records whose field contains a value
    Find {
        /// Field name
        #[arg(value_name = "FIELD")]
        field: String,

        /// Text to look for (case-insensitive)
        #[arg(value_name = "TEXT")]
        needle: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Ways to name one record on the command line.
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = true)]
pub struct TargetArgs {
    /// Target by stable id
    #[arg(long, conflicts_with_all = ["section", "sequence", "record_id"])]
    pub stable_id: Option<String>,

    /// Target section (with --sequence)
    #[arg(long, requires = "sequence")]
    pub section: Option<String>,

    /// Target declared sequence (with --section)
    #[arg(long, requires = "section")]
    pub sequence: Option<u32>,

    /// Target by internal record id
    #[arg(long, conflicts_with_all = ["section", "sequence"])]
    pub record_id: Option<u64>,
}

impl TargetArgs {
    /// The record reference these arguments name.
    pub fn reference(&self) -> Option<RecordRef> {
        if let Some(id) = &self.stable_id {
            return Some(RecordRef::stable_id(id.clone()));
        }
        if let Some(id) = self.record_id {
            return Some(RecordRef::id(RecordId(id)));
        }
        match (&self.section, self.sequence) {
            (Some(section), Some(seq)) => Some(RecordRef::position(section.clone(), seq)),
            _ => None,
        }
    }
}
