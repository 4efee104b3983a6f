//! Deterministic ordering between records claiming the same position.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// Rule that separated a duplicate winner from the runner-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakRule {
    /// Only the winner carries a stable id.
    StableId,
    /// Winner has more non-blank fields.
    FieldCount,
    /// Winner was extracted earlier.
    ExtractionTime,
    /// Winner's field fingerprint sorts first.
    Fingerprint,
    /// Everything else equal; decided by stable id text, then record handle.
    RecordOrder,
}

impl TieBreakRule {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            TieBreakRule::StableId => "has stable id",
            TieBreakRule::FieldCount => "more complete",
            TieBreakRule::ExtractionTime => "extracted earlier",
            TieBreakRule::Fingerprint => "fingerprint order",
            TieBreakRule::RecordOrder => "record order",
        }
    }
}

/// Compare two claimants. `Less` means `a` wins.
///
/// Depends only on record content, never on input order, so re-analyzing the
/// same records always yields the same winner.
pub fn compare(a: &Record, b: &Record) -> Ordering {
    compare_with_rule(a, b).0
}

/// Like [`compare`], also naming the rule that decided.
pub fn compare_with_rule(a: &Record, b: &Record) -> (Ordering, TieBreakRule) {
    let by_stable_id = b.stable_id().is_some().cmp(&a.stable_id().is_some());
    if by_stable_id != Ordering::Equal {
        return (by_stable_id, TieBreakRule::StableId);
    }

    let by_fields = b.non_blank_field_count().cmp(&a.non_blank_field_count());
    if by_fields != Ordering::Equal {
        return (by_fields, TieBreakRule::FieldCount);
    }

    let by_time = a.extracted_at.cmp(&b.extracted_at);
    if by_time != Ordering::Equal {
        return (by_time, TieBreakRule::ExtractionTime);
    }

    let by_fingerprint = a.fingerprint().cmp(&b.fingerprint());
    if by_fingerprint != Ordering::Equal {
        return (by_fingerprint, TieBreakRule::Fingerprint);
    }

    let by_order = a
        .stable_id()
        .cmp(&b.stable_id())
        .then_with(|| a.id.cmp(&b.id));
    (by_order, TieBreakRule::RecordOrder)
}
