//! Per-field quality tags and the append-only provenance log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value::FieldValue;

/// Provenance/confidence tag for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTag {
    /// Checked against the source document.
    Verified,
    /// Not present in the extraction.
    Missing,
    /// Typed in by an operator.
    ManuallyEntered,
    /// Extracted, but the OCR stage flagged low confidence.
    OcrUncertain,
    /// Overwritten by an explicit correction.
    Corrected,
}

impl QualityTag {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            QualityTag::Verified => "verified",
            QualityTag::Missing => "missing",
            QualityTag::ManuallyEntered => "manually-entered",
            QualityTag::OcrUncertain => "ocr-uncertain",
            QualityTag::Corrected => "corrected",
        }
    }
}

/// Kind of operation recorded in a provenance entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceOp {
    /// Record created from an extraction batch.
    Extracted,
    /// Field filled or updated from a later batch that matched this record.
    IngestMerge,
    /// Field overwritten by an explicit correction.
    Corrected,
    /// Stable id, section, or declared sequence changed.
    IdentityEdit,
    /// Placeholder materialized for a detected gap.
    Placeholder,
    /// Record created by a correction targeting an empty position.
    ManualEntry,
    /// Lost a duplicate tie-break.
    Superseded,
    /// Superseding record went away; this record is active again.
    Reinstated,
}

impl ProvenanceOp {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ProvenanceOp::Extracted => "extracted",
            ProvenanceOp::IngestMerge => "ingest-merge",
            ProvenanceOp::Corrected => "corrected",
            ProvenanceOp::IdentityEdit => "identity-edit",
            ProvenanceOp::Placeholder => "placeholder",
            ProvenanceOp::ManualEntry => "manual-entry",
            ProvenanceOp::Superseded => "superseded",
            ProvenanceOp::Reinstated => "reinstated",
        }
    }
}

/// One entry of a record's provenance log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    /// What happened.
    pub operation: ProvenanceOp,

    /// When it happened.
    pub at: DateTime<Utc>,

    /// Who or what did it (operator, script, "rollcall").
    pub actor: String,

    /// Field affected, for field-level entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Value before the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior_value: Option<FieldValue>,

    /// Value after the change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<FieldValue>,

    /// Free-form note.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ProvenanceEntry {
    /// Create a record-level entry.
    pub fn new(operation: ProvenanceOp, actor: impl Into<String>) -> Self {
        Self {
            operation,
            at: Utc::now(),
            actor: actor.into(),
            field: None,
            prior_value: None,
            new_value: None,
            note: None,
        }
    }

    /// Create a field-level entry capturing old and new values.
    pub fn field_change(
        operation: ProvenanceOp,
        actor: impl Into<String>,
        field: impl Into<String>,
        prior: FieldValue,
        new: FieldValue,
    ) -> Self {
        Self {
            field: Some(field.into()),
            prior_value: Some(prior),
            new_value: Some(new),
            ..Self::new(operation, actor)
        }
    }

    /// Attach a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// One-line description, e.g. `corrected age: 29 -> 31`.
    pub fn describe(&self) -> String {
        match (&self.field, &self.prior_value, &self.new_value) {
            (Some(field), Some(prior), Some(new)) => {
                format!("{} {}: {} -> {}", self.operation.label(), field, prior, new)
            }
            _ => match &self.note {
                Some(note) => format!("{} ({})", self.operation.label(), note),
                None => self.operation.label().to_string(),
            },
        }
    }
}
