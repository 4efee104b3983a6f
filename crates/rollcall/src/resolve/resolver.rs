//! Identity resolver: decides which incoming records are the same entity as
//! existing ones.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::dataset::Dataset;
use crate::input::IncomingRecord;
use crate::record::{Record, RecordId};

use super::resolution::{
    Conflict, ConflictReason, MatchRule, Matched, RejectReason, Rejected, Resolution, Unmatched,
};

/// Matches incoming records against the dataset.
///
/// Rules, in order:
/// 1. Same stable id: same entity. Superseded records count, so a stable id
///    can never be reused. A differing declared position is a conflict.
/// 2. No stable-id match, same `(section_key, declared_sequence)` as an
///    active record: same entity, unless both sides carry different stable
///    ids (two claimants for one position, left for duplicate analysis).
/// 3. Otherwise the record is new.
///
/// After a key match, any configured identity field that differs materially
/// turns the match into a conflict instead of a silent overwrite.
#[derive(Debug, Clone, Default)]
pub struct IdentityResolver {
    config: ResolverConfig,
}

impl IdentityResolver {
    /// Create a resolver with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver with custom configuration.
    pub fn with_config(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Classify every incoming record. Records without a section key must
    /// have been given one by the caller; they are rejected here otherwise.
    pub fn resolve(&self, dataset: &Dataset, incoming: Vec<IncomingRecord>) -> Resolution {
        let mut by_stable_id: HashMap<&str, &Record> = HashMap::new();
        let mut by_position: HashMap<(&str, u32), Vec<&Record>> = HashMap::new();
        for record in &dataset.records {
            if let Some(id) = record.stable_id() {
                by_stable_id.entry(id).or_insert(record);
            }
            if record.is_active() {
                if let Some(position) = record.position() {
                    by_position.entry(position).or_default().push(record);
                }
            }
        }

        let mut resolution = Resolution::default();
        let mut seen_stable_ids: HashMap<String, usize> = HashMap::new();
        let mut claimed: HashMap<RecordId, usize> = HashMap::new();

        for (index, record) in incoming.into_iter().enumerate() {
            let Some(section_key) = record.section_key().map(str::to_string) else {
                resolution.rejected.push(Rejected {
                    index,
                    incoming: record,
                    reason: RejectReason::Unidentifiable,
                    detail: "no section key".to_string(),
                });
                continue;
            };
            let stable_id = record.stable_id().map(str::to_string);

            if stable_id.is_none() && record.declared_sequence.is_none() {
                warn!(section = %section_key, index, "record has neither stable id nor declared sequence");
                resolution.rejected.push(Rejected {
                    index,
                    incoming: record,
                    reason: RejectReason::Unidentifiable,
                    detail: "neither stable id nor declared sequence".to_string(),
                });
                continue;
            }

            if let Some(id) = &stable_id {
                if let Some(&first_index) = seen_stable_ids.get(id) {
                    resolution.conflicting.push(Conflict {
                        existing: by_stable_id.get(id.as_str()).map(|r| r.id),
                        index,
                        incoming: record,
                        reason: ConflictReason::DuplicateInBatch { first_index },
                    });
                    continue;
                }
                seen_stable_ids.insert(id.clone(), index);
            }

            // Rule 1: stable id
            if let Some(existing) = stable_id.as_deref().and_then(|id| by_stable_id.get(id).copied()) {
                let moved = record.declared_sequence.is_some()
                    && (existing.section_key != section_key
                        || existing.declared_sequence != record.declared_sequence);
                let reason = if moved {
                    Some(ConflictReason::PositionMismatch {
                        existing_section: existing.section_key.clone(),
                        existing_sequence: existing.declared_sequence,
                        incoming_section: section_key.clone(),
                        incoming_sequence: record.declared_sequence,
                    })
                } else {
                    self.identity_mismatch(existing, &record)
                };
                self.classify(&mut resolution, &mut claimed, existing, MatchRule::StableId, index, record, reason);
                continue;
            }

            // Rule 2: position among active records
            if let Some(sequence) = record.declared_sequence {
                let candidate = by_position
                    .get(&(section_key.as_str(), sequence))
                    .and_then(|candidates| match &stable_id {
                        Some(_) => candidates.iter().find(|r| r.stable_id().is_none()).copied(),
                        None => candidates.first().copied(),
                    });
                if let Some(existing) = candidate {
                    let reason = self.identity_mismatch(existing, &record);
                    self.classify(&mut resolution, &mut claimed, existing, MatchRule::Position, index, record, reason);
                    continue;
                }
                debug!(section = %section_key, sequence, index, "new record");
                resolution.new.push(Unmatched {
                    index,
                    incoming: record,
                });
                continue;
            }

            // Stable id never seen and no position to place it at
            warn!(section = %section_key, index, "new stable id without declared sequence");
            resolution.rejected.push(Rejected {
                index,
                incoming: record,
                reason: RejectReason::Unplaceable,
                detail: "new stable id without a declared sequence".to_string(),
            });
        }

        debug!(
            matched = resolution.matched.len(),
            new = resolution.new.len(),
            conflicting = resolution.conflicting.len(),
            rejected = resolution.rejected.len(),
            "resolved batch"
        );
        resolution
    }

    #[allow(clippy::too_many_arguments)]
    fn classify(
        &self,
        resolution: &mut Resolution,
        claimed: &mut HashMap<RecordId, usize>,
        existing: &Record,
        rule: MatchRule,
        index: usize,
        incoming: IncomingRecord,
        reason: Option<ConflictReason>,
    ) {
        let reason = reason.or_else(|| {
            claimed
                .get(&existing.id)
                .map(|&first_index| ConflictReason::DuplicateInBatch { first_index })
        });

        match reason {
            Some(reason) => {
                warn!(existing = %existing.id, index, %reason, "identity conflict");
                resolution.conflicting.push(Conflict {
                    existing: Some(existing.id),
                    index,
                    incoming,
                    reason,
                });
            }
            None => {
                claimed.insert(existing.id, index);
                resolution.matched.push(Matched {
                    existing: existing.id,
                    rule,
                    index,
                    incoming,
                });
            }
        }
    }

    /// First configured identity field whose values differ materially.
    fn identity_mismatch(&self, existing: &Record, incoming: &IncomingRecord) -> Option<ConflictReason> {
        self.config.identity_fields.iter().find_map(|field| {
            let stored = existing.field(field)?;
            let offered = incoming.fields.get(field)?;
            stored.differs_materially(offered).then(|| ConflictReason::FieldMismatch {
                field: field.clone(),
                existing: stored.clone(),
                incoming: offered.clone(),
            })
        })
    }
}
