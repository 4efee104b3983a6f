//! Applies corrections and ingest updates to records, with provenance.

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::dataset::Dataset;
use crate::record::{FieldValue, ProvenanceEntry, ProvenanceOp, QualityTag, Record, RecordRef};

use super::correction::{Correction, CorrectionOutcome, CorrectionRef, FieldChange};

/// Applies field-level overrides to existing records.
///
/// Only fields named by a correction are written; everything else is left
/// alone. Each changed value appends a provenance entry holding the old and
/// new value.
#[derive(Debug, Clone)]
pub struct CorrectionApplier {
    actor: String,
    create_missing: bool,
}

impl CorrectionApplier {
    /// Create an applier acting as `actor`.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            create_missing: false,
        }
    }

    /// Create records for position targets that do not exist yet.
    pub fn with_create_missing(mut self, create_missing: bool) -> Self {
        self.create_missing = create_missing;
        self
    }

    /// Apply each correction in order.
    pub fn apply_corrections(&self, dataset: &mut Dataset, corrections: &[Correction]) -> CorrectionOutcome {
        let mut outcome = CorrectionOutcome::new();

        for (index, correction) in corrections.iter().enumerate() {
            let Some(target) = correction.target() else {
                warn!(index, "correction names no target");
                outcome.not_found.push(CorrectionRef {
                    index,
                    target: None,
                    reason: "no stable id, record id, or section position given".to_string(),
                });
                continue;
            };

            if let Some(reason) = self.identity_edit_refusal(dataset, &target, correction) {
                warn!(index, %target, %reason, "correction refused");
                outcome.refused.push(CorrectionRef {
                    index,
                    target: Some(target),
                    reason,
                });
                continue;
            }

            match dataset.records.iter().position(|r| r.matches(&target)) {
                Some(pos) => {
                    let record = &mut dataset.records[pos];
                    self.apply_to_record(record, correction, &mut outcome);
                    outcome.applied += 1;
                }
                None => {
                    if self.create_missing {
                        if let RecordRef::Position {
                            section_key,
                            declared_sequence,
                        } = &target
                        {
                            self.create_record(dataset, section_key, *declared_sequence, correction, &mut outcome);
                            outcome.applied += 1;
                            continue;
                        }
                    }
                    warn!(index, %target, "correction target not found");
                    outcome.not_found.push(CorrectionRef {
                        index,
                        target: Some(target),
                        reason: "no such record".to_string(),
                    });
                    outcome.unmatched.push(correction.clone());
                }
            }
        }

        outcome
    }

    /// Merge fields from a later extraction into a matched record.
    ///
    /// Blank incoming values never null out stored ones.
    pub fn merge_update(
        &self,
        record: &mut Record,
        fields: &IndexMap<String, FieldValue>,
        quality: &IndexMap<String, QualityTag>,
    ) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        for (name, value) in fields {
            if value.is_blank() {
                continue;
            }
            if let Some(entry) = record.set_field(name, value.clone(), ProvenanceOp::IngestMerge, &self.actor) {
                match quality.get(name) {
                    Some(tag) => {
                        record.quality.insert(name.clone(), *tag);
                    }
                    None => {
                        if record.quality.get(name) == Some(&QualityTag::Missing) {
                            record.quality.shift_remove(name);
                        }
                    }
                }
                changes.push(field_change(record, entry));
            }
        }
        if record.pending_manual_entry && !record.has_missing_fields() {
            record.pending_manual_entry = false;
        }
        changes
    }

    fn apply_to_record(&self, record: &mut Record, correction: &Correction, outcome: &mut CorrectionOutcome) {
        let tag = correction.quality.unwrap_or(QualityTag::Corrected);

        for (name, value) in &correction.fields {
            let logged = record.set_field_with_note(
                name,
                value.clone(),
                ProvenanceOp::Corrected,
                &self.actor,
                correction.note.as_deref(),
            );
            if let Some(entry) = logged {
                record.quality.insert(name.clone(), tag);
                debug!(record = %record.id, field = %name, change = %entry.describe(), "applied correction");
                outcome.changes.push(field_change(record, entry));
            }
        }

        if let Some(new_id) = &correction.new_stable_id {
            let prior = record
                .stable_id
                .clone()
                .map(FieldValue::Text)
                .unwrap_or_default();
            let new = FieldValue::Text(new_id.trim().to_string());
            if prior != new {
                record.stable_id = Some(new_id.trim().to_string());
                self.log_identity_edit(record, "stable_id", prior, new, correction, outcome);
            }
        }

        if let Some(section) = &correction.new_section_key {
            if *section != record.section_key {
                outcome.touch_section(&record.section_key);
                outcome.touch_section(section);
                let prior = FieldValue::Text(record.section_key.clone());
                record.section_key = section.clone();
                self.log_identity_edit(record, "section_key", prior, FieldValue::Text(section.clone()), correction, outcome);
            }
        }

        if let Some(seq) = correction.new_declared_sequence {
            if record.declared_sequence != Some(seq) {
                outcome.touch_section(&record.section_key);
                let prior = record
                    .declared_sequence
                    .map(|s| FieldValue::Integer(i64::from(s)))
                    .unwrap_or_default();
                record.declared_sequence = Some(seq);
                self.log_identity_edit(
                    record,
                    "declared_sequence",
                    prior,
                    FieldValue::Integer(i64::from(seq)),
                    correction,
                    outcome,
                );
            }
        }

        if record.pending_manual_entry && !record.has_missing_fields() {
            record.pending_manual_entry = false;
        }
    }

    fn log_identity_edit(
        &self,
        record: &mut Record,
        field: &str,
        prior: FieldValue,
        new: FieldValue,
        correction: &Correction,
        outcome: &mut CorrectionOutcome,
    ) {
        let mut entry = ProvenanceEntry::field_change(ProvenanceOp::IdentityEdit, &self.actor, field, prior, new);
        if let Some(note) = &correction.note {
            entry = entry.with_note(note.clone());
        }
        record.log(entry.clone());
        outcome.changes.push(field_change(record, entry));
    }

    fn create_record(
        &self,
        dataset: &mut Dataset,
        section_key: &str,
        declared_sequence: u32,
        correction: &Correction,
        outcome: &mut CorrectionOutcome,
    ) {
        let id = dataset.allocate_id();
        let mut record = Record::new(id, section_key).with_declared_sequence(declared_sequence);
        if let Some(stable_id) = &correction.new_stable_id {
            record.stable_id = Some(stable_id.trim().to_string());
        }
        let tag = correction.quality.unwrap_or(QualityTag::ManuallyEntered);
        for (name, value) in &correction.fields {
            record.fields.insert(name.clone(), value.clone());
            record.quality.insert(name.clone(), tag);
        }
        let mut entry = ProvenanceEntry::new(ProvenanceOp::ManualEntry, &self.actor);
        if let Some(note) = &correction.note {
            entry = entry.with_note(note.clone());
        }
        record.log(entry);

        debug!(record = %id, section = section_key, sequence = declared_sequence, "created record from correction");
        outcome.created.push(record.reference());
        outcome.touch_section(section_key);
        dataset.insert(record);
    }

    /// Reason to refuse a correction whose identity edit would break global
    /// stable-id uniqueness, or `None` when it is safe.
    fn identity_edit_refusal(&self, dataset: &Dataset, target: &RecordRef, correction: &Correction) -> Option<String> {
        let new_id = correction.new_stable_id.as_deref()?.trim();
        if new_id.is_empty() {
            return Some("new stable id is blank".to_string());
        }
        let holder = dataset.find(&RecordRef::stable_id(new_id))?;
        if holder.matches(target) {
            return None;
        }
        Some(format!("stable id '{}' already belongs to {}", new_id, holder.id))
    }
}

impl Default for CorrectionApplier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ACTOR)
    }
}

fn field_change(record: &Record, entry: ProvenanceEntry) -> FieldChange {
    FieldChange {
        record_id: record.id,
        target: record.reference(),
        field: entry.field.unwrap_or_default(),
        prior: entry.prior_value.unwrap_or_default(),
        new: entry.new_value.unwrap_or_default(),
    }
}
