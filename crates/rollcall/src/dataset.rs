//! The canonical dataset: records, section order, and audit logs.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::correction::Correction;
use crate::error::{Result, RollcallError};
use crate::record::{Record, RecordId, RecordRef};

/// Current version of the persisted dataset format.
pub const FORMAT_VERSION: &str = "1.0.0";

/// Inclusive range of declared sequence numbers a section is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceRange {
    pub start: u32,
    pub end: u32,
}

impl SequenceRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: u32, end: u32) -> Result<Self> {
        if start > end {
            return Err(RollcallError::Config(format!(
                "Invalid sequence range {}..={}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Whether `sequence` falls inside the range.
    pub fn contains(&self, sequence: u32) -> bool {
        (self.start..=self.end).contains(&sequence)
    }

    /// Iterate every sequence number in the range.
    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }

    /// Number of sequence numbers in the range.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize + 1
    }

    /// Ranges always hold at least one number.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl FromStr for SequenceRange {
    type Err = RollcallError;

    /// Parse `1..10`, `1..=10` or `1-10` (both ends inclusive).
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (start, end) = s
            .split_once("..=")
            .or_else(|| s.split_once(".."))
            .or_else(|| s.split_once('-'))
            .ok_or_else(|| RollcallError::Config(format!("Invalid sequence range '{}'", s)))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| RollcallError::Config(format!("Invalid sequence range '{}'", s)))
        };
        Self::new(parse(start)?, parse(end)?)
    }
}

impl fmt::Display for SequenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Audit entry for one `correct` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionLogEntry {
    /// When the corrections were applied.
    pub at: DateTime<Utc>,

    /// Who supplied them.
    pub actor: String,

    /// Snapshot taken before they were applied.
    pub snapshot_id: u64,

    /// The corrections exactly as supplied.
    pub corrections: Vec<Correction>,

    /// How many found their target.
    pub applied: usize,

    /// Targets that did not exist.
    pub not_found: Vec<RecordRef>,
}

/// Audit entry for one explicit removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalLogEntry {
    /// When the record was removed.
    pub at: DateTime<Utc>,

    /// Who removed it.
    pub actor: String,

    /// Why.
    pub reason: String,

    /// Snapshot taken before removal.
    pub snapshot_id: u64,

    /// The record as it was just before removal.
    pub record: Record,
}

/// The canonical collection of records plus everything needed to audit it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Version of the dataset format.
    pub format_version: String,

    /// When the dataset was created.
    pub created_at: DateTime<Utc>,

    /// When the dataset was last published.
    pub updated_at: DateTime<Utc>,

    /// Total order over section keys; insertion order unless set explicitly.
    #[serde(default)]
    pub section_order: Vec<String>,

    /// Expected declared-sequence range per section.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub expected_ranges: IndexMap<String, SequenceRange>,

    /// All records, active and superseded.
    #[serde(default)]
    pub records: Vec<Record>,

    /// Corrections whose target did not exist yet; retried on later ingests.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_corrections: Vec<Correction>,

    /// Every `correct` call, oldest first.
    #[serde(default)]
    pub correction_log: Vec<CorrectionLogEntry>,

    /// Every explicit removal, oldest first.
    #[serde(default)]
    pub removal_log: Vec<RemovalLogEntry>,

    /// Next record handle to allocate.
    #[serde(default = "first_record_id")]
    pub next_record_id: u64,
}

fn first_record_id() -> u64 {
    1
}

impl Dataset {
    /// Create an empty dataset.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            format_version: FORMAT_VERSION.to_string(),
            created_at: now,
            updated_at: now,
            section_order: Vec::new(),
            expected_ranges: IndexMap::new(),
            records: Vec::new(),
            pending_corrections: Vec::new(),
            correction_log: Vec::new(),
            removal_log: Vec::new(),
            next_record_id: first_record_id(),
        }
    }

    /// Allocate a fresh record handle.
    pub fn allocate_id(&mut self) -> RecordId {
        let id = RecordId(self.next_record_id);
        self.next_record_id += 1;
        id
    }

    /// Register a section at the end of the order if it is not known yet.
    pub fn ensure_section(&mut self, section_key: &str) {
        if !self.section_order.iter().any(|s| s == section_key) {
            self.section_order.push(section_key.to_string());
        }
    }

    /// Add a record, registering its section.
    pub fn insert(&mut self, record: Record) {
        self.ensure_section(&record.section_key);
        if record.id.0 >= self.next_record_id {
            self.next_record_id = record.id.0 + 1;
        }
        self.records.push(record);
    }

    /// Remove a record by handle, returning it.
    pub fn take(&mut self, id: RecordId) -> Option<Record> {
        let pos = self.records.iter().position(|r| r.id == id)?;
        Some(self.records.remove(pos))
    }

    /// Get a record by handle.
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Get a mutable record by handle.
    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.id == id)
    }

    /// Find the record a reference points at.
    pub fn find(&self, reference: &RecordRef) -> Option<&Record> {
        self.records.iter().find(|r| r.matches(reference))
    }

    /// Find the record a reference points at, mutably.
    pub fn find_mut(&mut self, reference: &RecordRef) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.matches(reference))
    }

    /// Records that take part in canonical ordering.
    pub fn active_records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter().filter(|r| r.is_active())
    }

    /// All records of one section, active and superseded.
    pub fn section_records(&self, section_key: &str) -> Vec<&Record> {
        self.records
            .iter()
            .filter(|r| r.section_key == section_key)
            .collect()
    }

    /// Whether a section is known.
    pub fn has_section(&self, section_key: &str) -> bool {
        self.section_order.iter().any(|s| s == section_key)
    }

    /// Stored expected range for a section.
    pub fn expected_range(&self, section_key: &str) -> Option<SequenceRange> {
        self.expected_ranges.get(section_key).copied()
    }

    /// Number of records holding a canonical index.
    pub fn canonical_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.canonical_index.is_some())
            .count()
    }

    /// Replace the section order. The new order must be a permutation of the
    /// known sections, optionally extended with sections not seen yet.
    pub fn set_section_order(&mut self, order: Vec<String>) -> Result<()> {
        let mut seen = HashSet::new();
        for key in &order {
            if !seen.insert(key.as_str()) {
                return Err(RollcallError::Config(format!(
                    "Section '{}' appears twice in the section order",
                    key
                )));
            }
        }
        if let Some(missing) = self.section_order.iter().find(|s| !seen.contains(s.as_str())) {
            return Err(RollcallError::Config(format!(
                "Section order omits known section '{}'",
                missing
            )));
        }
        self.section_order = order;
        Ok(())
    }

    /// Records ordered by canonical index (active records only).
    pub fn canonical_records(&self) -> Vec<&Record> {
        let mut records: Vec<&Record> = self
            .records
            .iter()
            .filter(|r| r.canonical_index.is_some())
            .collect();
        records.sort_by_key(|r| r.canonical_index);
        records
    }

    /// Mark the dataset as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}
