//! Correction requests and their outcomes.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, QualityTag, RecordId, RecordRef};

/// An explicit, field-level override for one record.
///
/// The target is given by `record_id`, `stable_id`, or
/// `section_key` + `declared_sequence`, checked in that order. Only the
/// fields present in `fields` are written.
///
/// ```
/// use rollcall::Correction;
///
/// let c: Correction = serde_json::from_str(r#"{"stable_id": "X1", "fields": {"age": 31}}"#).unwrap();
/// assert_eq!(c.target().unwrap().to_string(), "stable id 'X1'");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    /// Target by record handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,

    /// Target by stable id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,

    /// Target section (with `declared_sequence`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_key: Option<String>,

    /// Target declared sequence (with `section_key`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_sequence: Option<u32>,

    /// Field values to write.
    #[serde(default)]
    pub fields: IndexMap<String, FieldValue>,

    /// Quality tag for written fields (default: corrected).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityTag>,

    /// Assign or replace the stable id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_stable_id: Option<String>,

    /// Move the record to another section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_section_key: Option<String>,

    /// Move the record to another declared sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_declared_sequence: Option<u32>,

    /// Operator note, copied into provenance entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Correction {
    /// Correction targeting a stable id.
    pub fn for_stable_id(stable_id: impl Into<String>) -> Self {
        Self {
            stable_id: Some(stable_id.into()),
            ..Self::default()
        }
    }

    /// Correction targeting a section position.
    pub fn for_position(section_key: impl Into<String>, declared_sequence: u32) -> Self {
        Self {
            section_key: Some(section_key.into()),
            declared_sequence: Some(declared_sequence),
            ..Self::default()
        }
    }

    /// Correction targeting a record handle.
    pub fn for_record(record_id: RecordId) -> Self {
        Self {
            record_id: Some(record_id),
            ..Self::default()
        }
    }

    /// Add a field value to write.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Set the quality tag for written fields.
    pub fn with_quality(mut self, tag: QualityTag) -> Self {
        self.quality = Some(tag);
        self
    }

    /// Assign a stable id.
    pub fn with_new_stable_id(mut self, id: impl Into<String>) -> Self {
        self.new_stable_id = Some(id.into());
        self
    }

    /// Move to another position.
    pub fn with_new_position(mut self, section_key: impl Into<String>, declared_sequence: u32) -> Self {
        self.new_section_key = Some(section_key.into());
        self.new_declared_sequence = Some(declared_sequence);
        self
    }

    /// Attach an operator note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Resolve the target reference, if the correction names one.
    pub fn target(&self) -> Option<RecordRef> {
        if let Some(id) = self.record_id {
            return Some(RecordRef::id(id));
        }
        if let Some(id) = self.stable_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            return Some(RecordRef::stable_id(id));
        }
        match (&self.section_key, self.declared_sequence) {
            (Some(section), Some(seq)) => Some(RecordRef::position(section.clone(), seq)),
            _ => None,
        }
    }

    /// Whether the correction changes where the record sits or who it is.
    pub fn edits_identity(&self) -> bool {
        self.new_stable_id.is_some()
            || self.new_section_key.is_some()
            || self.new_declared_sequence.is_some()
    }
}

/// A correction that could not be applied, by position in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRef {
    /// Index of the correction in the submitted list.
    pub index: usize,

    /// Target it named, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<RecordRef>,

    /// Why it was not applied.
    pub reason: String,
}

/// One field value that changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Record that changed.
    pub record_id: RecordId,

    /// How reports refer to it.
    pub target: RecordRef,

    /// Field name (`stable_id`, `section_key`, `declared_sequence` for
    /// identity edits).
    pub field: String,

    /// Value before.
    pub prior: FieldValue,

    /// Value after.
    pub new: FieldValue,
}

/// Result of applying a list of corrections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrectionOutcome {
    /// Corrections that found (or created) their target.
    pub applied: usize,

    /// Corrections whose target does not exist.
    pub not_found: Vec<CorrectionRef>,

    /// Corrections refused because they would break an invariant.
    pub refused: Vec<CorrectionRef>,

    /// Every field value that changed.
    pub changes: Vec<FieldChange>,

    /// Records created under create-missing semantics.
    pub created: Vec<RecordRef>,

    /// Sections whose membership changed through identity edits.
    pub touched_sections: Vec<String>,

    /// The not-found corrections themselves, for deferral.
    #[serde(skip)]
    pub unmatched: Vec<Correction>,
}

impl CorrectionOutcome {
    /// Create an empty outcome.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn touch_section(&mut self, section_key: &str) {
        if !self.touched_sections.iter().any(|s| s == section_key) {
            self.touched_sections.push(section_key.to_string());
        }
    }
}
