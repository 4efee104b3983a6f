//! Records as delivered by the extraction stage.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::record::{FieldValue, ProvenanceEntry, ProvenanceOp, QualityTag, Record, RecordId};

// First run of ASCII digits, e.g. "12" in "No. 12A".
static SEQUENCE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").unwrap());

/// Parse a declared sequence from extracted text.
///
/// OCR output often wraps the printed number in noise (`" 7 "`, `"12A"`,
/// `"No.3"`). The first run of digits wins; text without digits, or a number
/// too large for `u32`, yields `None`.
///
/// ```
/// use rollcall::input::parse_declared_sequence;
///
/// assert_eq!(parse_declared_sequence(" 12A "), Some(12));
/// assert_eq!(parse_declared_sequence("n/a"), None);
/// ```
pub fn parse_declared_sequence(raw: &str) -> Option<u32> {
    SEQUENCE_DIGITS
        .find(raw)
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSequence {
    Number(u64),
    Text(String),
}

fn deserialize_sequence<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawSequence> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawSequence::Number(n)) => u32::try_from(n).ok(),
        Some(RawSequence::Text(s)) => parse_declared_sequence(&s),
        None => None,
    })
}

/// One raw record from an extraction batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncomingRecord {
    /// Section the record came from; defaults to the batch's section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_key: Option<String>,

    /// Printed sequence number (number or noisy text).
    #[serde(
        default,
        deserialize_with = "deserialize_sequence",
        skip_serializing_if = "Option::is_none"
    )]
    pub declared_sequence: Option<u32>,

    /// External identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,

    /// Semantic attributes.
    #[serde(default)]
    pub fields: IndexMap<String, FieldValue>,

    /// Per-field quality tags from the extraction stage.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub quality: IndexMap<String, QualityTag>,

    /// When the extraction happened, if the stage reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
}

impl IncomingRecord {
    /// Create an incoming record for a section.
    pub fn new(section_key: impl Into<String>) -> Self {
        Self {
            section_key: Some(section_key.into()),
            ..Self::default()
        }
    }

    /// Set the declared sequence.
    pub fn with_declared_sequence(mut self, sequence: u32) -> Self {
        self.declared_sequence = Some(sequence);
        self
    }

    /// Set the stable id.
    pub fn with_stable_id(mut self, id: impl Into<String>) -> Self {
        self.stable_id = Some(id.into());
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
        self.extracted_at = Some(at);
        self
    }

    /// Fill in the section when the record does not name one.
    pub fn with_default_section(mut self, section_key: &str) -> Self {
        let blank = self
            .section_key
            .as_deref()
            .is_none_or(|s| s.trim().is_empty());
        if blank {
            self.section_key = Some(section_key.to_string());
        }
        self
    }

    /// Usable stable id: present, trimmed, non-empty.
    pub fn stable_id(&self) -> Option<&str> {
        self.stable_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Usable section key.
    pub fn section_key(&self) -> Option<&str> {
        self.section_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Convert into a stored record with a fresh handle.
    pub fn into_record(self, id: RecordId, default_time: DateTime<Utc>, actor: &str) -> Record {
        let stable_id = self.stable_id().map(str::to_string);
        let section_key = self.section_key().unwrap_or_default().to_string();
        let mut record = Record::new(id, section_key).with_extracted_at(self.extracted_at.unwrap_or(default_time));
        record.stable_id = stable_id;
        record.declared_sequence = self.declared_sequence;
        record.fields = self.fields;
        record.quality = self.quality;
        for (name, value) in &record.fields {
            if value.is_blank() && !record.quality.contains_key(name) {
                record.quality.insert(name.clone(), QualityTag::Missing);
            }
        }
        record.log(ProvenanceEntry::new(ProvenanceOp::Extracted, actor));
        record
    }
}
