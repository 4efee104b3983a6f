//! The record entity and the ways callers refer to one.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::provenance::{ProvenanceEntry, ProvenanceOp, QualityTag};
use super::value::FieldValue;

/// Engine-internal record handle. Allocated from a dataset-wide counter and
/// never reused, so records lacking a stable id can still be addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rec_{:06}", self.0)
    }
}

/// Pointer from a losing duplicate to the record that won its position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupersededBy {
    /// Winning record.
    pub winner: RecordId,

    /// Winner's stable id, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,

    /// Winner's canonical index as of the last renumber.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_index: Option<u32>,
}

impl SupersededBy {
    /// Point at `winner`.
    pub fn new(winner: &Record) -> Self {
        Self {
            winner: winner.id,
            stable_id: winner.stable_id().map(str::to_string),
            canonical_index: winner.canonical_index,
        }
    }
}

impl fmt::Display for SupersededBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.stable_id, self.canonical_index) {
            (Some(id), _) => write!(f, "{}", id),
            (None, Some(index)) => write!(f, "#{}", index),
            (None, None) => write!(f, "{}", self.winner),
        }
    }
}

/// How a caller identifies a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum RecordRef {
    /// By external stable identifier.
    StableId { stable_id: String },
    /// By section and declared sequence (active records only).
    Position {
        section_key: String,
        declared_sequence: u32,
    },
    /// By engine-internal handle.
    Id { record_id: RecordId },
}

impl RecordRef {
    /// Reference by stable id.
    pub fn stable_id(id: impl Into<String>) -> Self {
        RecordRef::StableId {
            stable_id: id.into(),
        }
    }

    /// Reference by section and declared sequence.
    pub fn position(section_key: impl Into<String>, declared_sequence: u32) -> Self {
        RecordRef::Position {
            section_key: section_key.into(),
            declared_sequence,
        }
    }

    /// Reference by record handle.
    pub fn id(record_id: RecordId) -> Self {
        RecordRef::Id { record_id }
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::StableId { stable_id } => write!(f, "stable id '{}'", stable_id),
            RecordRef::Position {
                section_key,
                declared_sequence,
            } => write!(f, "{}#{}", section_key, declared_sequence),
            RecordRef::Id { record_id } => write!(f, "{}", record_id),
        }
    }
}

/// One entry in the roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Engine-internal handle.
    pub id: RecordId,

    /// External identifier; may be absent on low-quality extractions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,

    /// Sub-document the record was extracted from.
    pub section_key: String,

    /// Sequence number printed in the source section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_sequence: Option<u32>,

    /// Dataset-wide ordinal, owned by the sequencer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_index: Option<u32>,

    /// Semantic attributes.
    #[serde(default)]
    pub fields: IndexMap<String, FieldValue>,

    /// Per-field quality tags.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub quality: IndexMap<String, QualityTag>,

    /// When the extraction stage produced this record.
    pub extracted_at: DateTime<Utc>,

    /// Set when this record lost a duplicate tie-break.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<SupersededBy>,

    /// Placeholder awaiting manual entry.
    #[serde(default)]
    pub pending_manual_entry: bool,

    /// Append-only history of every change.
    #[serde(default)]
    pub provenance_log: Vec<ProvenanceEntry>,
}

impl Record {
    /// Create an empty record in a section.
    pub fn new(id: RecordId, section_key: impl Into<String>) -> Self {
        Self {
            id,
            stable_id: None,
            section_key: section_key.into(),
            declared_sequence: None,
            canonical_index: None,
            fields: IndexMap::new(),
            quality: IndexMap::new(),
            extracted_at: Utc::now(),
            superseded_by: None,
            pending_manual_entry: false,
            provenance_log: Vec::new(),
        }
    }

    /// Create a placeholder occupying a gap: blank fields, each tagged missing.
    pub fn placeholder(
        id: RecordId,
        section_key: impl Into<String>,
        declared_sequence: u32,
        field_names: &[String],
        actor: &str,
    ) -> Self {
        let mut record = Self::new(id, section_key).with_declared_sequence(declared_sequence);
        for name in field_names {
            record.fields.insert(name.clone(), FieldValue::Null);
            record.quality.insert(name.clone(), QualityTag::Missing);
        }
        record.pending_manual_entry = true;
        record.log(
            ProvenanceEntry::new(ProvenanceOp::Placeholder, actor)
                .with_note(format!("gap at sequence {}", declared_sequence)),
        );
        record
    }

    /// Set the stable id.
    pub fn with_stable_id(mut self, id: impl Into<String>) -> Self {
        self.stable_id = Some(id.into());
        self
    }

    /// Set the declared sequence.
    pub fn with_declared_sequence(mut self, sequence: u32) -> Self {
        self.declared_sequence = Some(sequence);
        self
    }

    /// Set a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set a quality tag.
    pub fn with_quality(mut self, name: impl Into<String>, tag: QualityTag) -> Self {
        self.quality.insert(name.into(), tag);
        self
    }

    /// Set the extraction timestamp.
    pub fn with_extracted_at(mut self, at: DateTime<Utc>) -> Self {
        self.extracted_at = at;
        self
    }

    /// Usable stable id: present, trimmed, non-empty.
    pub fn stable_id(&self) -> Option<&str> {
        self.stable_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Whether the record takes part in canonical ordering.
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }

    /// Section and declared sequence, when the sequence is known.
    pub fn position(&self) -> Option<(&str, u32)> {
        self.declared_sequence
            .map(|seq| (self.section_key.as_str(), seq))
    }

    /// Get a field value.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Count of semantic fields holding a non-blank value.
    pub fn non_blank_field_count(&self) -> usize {
        self.fields.values().filter(|v| !v.is_blank()).count()
    }

    /// Deterministic text form of the non-blank fields, sorted by key.
    pub fn fingerprint(&self) -> String {
        let mut pairs: Vec<String> = self
            .fields
            .iter()
            .filter(|(_, v)| !v.is_blank())
            .map(|(k, v)| format!("{}={}", k, v.comparison_key()))
            .collect();
        pairs.sort();
        pairs.join("\u{1f}")
    }

    /// Whether this record is the one `reference` points at.
    pub fn matches(&self, reference: &RecordRef) -> bool {
        match reference {
            RecordRef::StableId { stable_id } => self.stable_id() == Some(stable_id.trim()),
            RecordRef::Position {
                section_key,
                declared_sequence,
            } => {
                self.is_active()
                    && self.section_key == *section_key
                    && self.declared_sequence == Some(*declared_sequence)
            }
            RecordRef::Id { record_id } => self.id == *record_id,
        }
    }

    /// Preferred reference for reports: stable id, else position, else handle.
    pub fn reference(&self) -> RecordRef {
        if let Some(id) = self.stable_id() {
            return RecordRef::stable_id(id);
        }
        match self.declared_sequence {
            Some(seq) => RecordRef::position(self.section_key.clone(), seq),
            None => RecordRef::id(self.id),
        }
    }

    /// Overwrite a field, logging the change. Returns the entry when the value
    /// actually changed; equal values leave the record and its log untouched.
    pub fn set_field(
        &mut self,
        name: &str,
        value: FieldValue,
        operation: ProvenanceOp,
        actor: &str,
    ) -> Option<ProvenanceEntry> {
        self.set_field_with_note(name, value, operation, actor, None)
    }

    /// Like [`Record::set_field`], attaching `note` to the logged entry.
    pub fn set_field_with_note(
        &mut self,
        name: &str,
        value: FieldValue,
        operation: ProvenanceOp,
        actor: &str,
        note: Option<&str>,
    ) -> Option<ProvenanceEntry> {
        let prior = self.fields.get(name).cloned().unwrap_or_default();
        if prior == value {
            return None;
        }
        self.fields.insert(name.to_string(), value.clone());
        let mut entry = ProvenanceEntry::field_change(operation, actor, name, prior, value);
        entry.note = note.map(str::to_string);
        self.log(entry.clone());
        Some(entry)
    }

    /// Whether any field is still tagged missing or blank on a placeholder.
    pub fn has_missing_fields(&self) -> bool {
        self.fields.iter().any(|(name, value)| {
            value.is_blank() && self.quality.get(name) == Some(&QualityTag::Missing)
        })
    }

    /// Append to the provenance log.
    pub fn log(&mut self, entry: ProvenanceEntry) {
        self.provenance_log.push(entry);
    }
}
