//! Classification of an incoming batch against the dataset.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::input::IncomingRecord;
use crate::record::{FieldValue, RecordId, RecordRef};

/// Which rule matched an incoming record to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Same stable id.
    StableId,
    /// Same section and declared sequence.
    Position,
}

impl MatchRule {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            MatchRule::StableId => "stable id",
            MatchRule::Position => "position",
        }
    }
}

/// Incoming record that is the same logical entity as an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matched {
    /// Existing record it matched.
    pub existing: RecordId,

    /// Rule that matched.
    pub rule: MatchRule,

    /// Index in the submitted batch.
    pub index: usize,

    /// The incoming record.
    pub incoming: IncomingRecord,
}

/// Incoming record with no existing counterpart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unmatched {
    /// Index in the submitted batch.
    pub index: usize,

    /// The incoming record.
    pub incoming: IncomingRecord,
}

/// Why an incoming record conflicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictReason {
    /// Identity key matched but an identity field disagrees.
    FieldMismatch {
        field: String,
        existing: FieldValue,
        incoming: FieldValue,
    },

    /// Stable id matched a record sitting at a different position.
    PositionMismatch {
        existing_section: String,
        existing_sequence: Option<u32>,
        incoming_section: String,
        incoming_sequence: Option<u32>,
    },

    /// Another record in the same batch already claimed this identity.
    DuplicateInBatch { first_index: usize },
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::FieldMismatch {
                field,
                existing,
                incoming,
            } => write!(f, "{} differs: stored '{}', incoming '{}'", field, existing, incoming),
            ConflictReason::PositionMismatch {
                existing_section,
                existing_sequence,
                incoming_section,
                incoming_sequence,
            } => write!(
                f,
                "stored at {}#{}, incoming at {}#{}",
                existing_section,
                display_sequence(*existing_sequence),
                incoming_section,
                display_sequence(*incoming_sequence)
            ),
            ConflictReason::DuplicateInBatch { first_index } => {
                write!(f, "same identity as batch record {}", first_index)
            }
        }
    }
}

fn display_sequence(sequence: Option<u32>) -> String {
    sequence.map_or_else(|| "?".to_string(), |s| s.to_string())
}

/// Incoming record whose identity collides with existing content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Existing record involved, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing: Option<RecordId>,

    /// Index in the submitted batch.
    pub index: usize,

    /// The incoming record.
    pub incoming: IncomingRecord,

    /// What collided.
    pub reason: ConflictReason,
}

impl Conflict {
    /// The record this conflict is about, as reports name it.
    pub fn target(&self, dataset: &Dataset) -> RecordRef {
        if let Some(existing) = self.existing.and_then(|id| dataset.get(id)) {
            return existing.reference();
        }
        if let Some(id) = self.incoming.stable_id() {
            return RecordRef::stable_id(id);
        }
        match (self.incoming.section_key(), self.incoming.declared_sequence) {
            (Some(section), Some(seq)) => RecordRef::position(section, seq),
            _ => self.existing.map_or_else(|| RecordRef::stable_id(""), RecordRef::id),
        }
    }
}

/// Why an incoming record was rejected outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Neither stable id nor declared sequence (or no section at all).
    Unidentifiable,
    /// New stable id without a declared sequence: nowhere to put it.
    Unplaceable,
}

impl RejectReason {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::Unidentifiable => "unidentifiable",
            RejectReason::Unplaceable => "unplaceable",
        }
    }
}

/// Incoming record the resolver refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejected {
    /// Index in the submitted batch.
    pub index: usize,

    /// The incoming record.
    pub incoming: IncomingRecord,

    /// Why.
    pub reason: RejectReason,

    /// Detail for reports.
    pub detail: String,
}

/// Every incoming record lands in exactly one of these buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub matched: Vec<Matched>,
    pub new: Vec<Unmatched>,
    pub conflicting: Vec<Conflict>,
    pub rejected: Vec<Rejected>,
}

impl Resolution {
    /// Total records classified.
    pub fn len(&self) -> usize {
        self.matched.len() + self.new.len() + self.conflicting.len() + self.rejected.len()
    }

    /// Whether nothing was classified.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every record matched or is new.
    pub fn is_clean(&self) -> bool {
        self.conflicting.is_empty() && self.rejected.is_empty()
    }
}
