//! Canonical Sequencer: dataset-wide dense numbering.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;
use crate::error::{Result, RollcallError};
use crate::record::RecordId;

/// Summary of one renumbering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSummary {
    /// Active records numbered.
    pub numbered: usize,

    /// Superseded records whose index was cleared.
    pub superseded: usize,

    /// Active records whose canonical index changed.
    pub changed: usize,
}

/// Assigns `canonical_index` values `1..=N` over active records, ordered by
/// section order then declared sequence.
///
/// Renumbering is a pure function of section order and declared sequences:
/// running it twice yields the same indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalSequencer;

impl CanonicalSequencer {
    /// Create a sequencer.
    pub fn new() -> Self {
        Self
    }

    /// Return a renumbered copy of `dataset`, leaving the input untouched.
    pub fn renumber(&self, dataset: &Dataset) -> Result<Dataset> {
        let mut next = dataset.clone();
        self.renumber_in_place(&mut next)?;
        Ok(next)
    }

    /// Renumber `dataset` in place.
    ///
    /// Fails with [`RollcallError::RenumberInconsistency`] when an active
    /// record has no declared sequence, sits in a section missing from the
    /// section order, or shares its position with another active record.
    /// On failure the dataset is left unchanged.
    pub fn renumber_in_place(&self, dataset: &mut Dataset) -> Result<SequenceSummary> {
        let assignments = self.plan(dataset)?;

        let mut summary = SequenceSummary::default();
        for record in dataset.records.iter_mut() {
            match assignments.get(&record.id) {
                Some(&index) => {
                    if record.canonical_index != Some(index) {
                        summary.changed += 1;
                    }
                    record.canonical_index = Some(index);
                    summary.numbered += 1;
                }
                None => {
                    record.canonical_index = None;
                    summary.superseded += 1;
                }
            }
        }

        // Pointers to winners carry the winner's fresh index
        for record in dataset.records.iter_mut() {
            if let Some(by) = record.superseded_by.as_mut() {
                by.canonical_index = assignments.get(&by.winner).copied();
            }
        }

        debug!(
            numbered = summary.numbered,
            changed = summary.changed,
            superseded = summary.superseded,
            "renumbered dataset"
        );
        Ok(summary)
    }

    /// Compute the index for every active record without changing anything.
    pub fn plan(&self, dataset: &Dataset) -> Result<HashMap<RecordId, u32>> {
        let rank: HashMap<&str, usize> = dataset
            .section_order
            .iter()
            .enumerate()
            .map(|(i, key)| (key.as_str(), i))
            .collect();

        let mut keyed = Vec::new();
        for record in dataset.active_records() {
            let Some(seq) = record.declared_sequence else {
                return Err(RollcallError::RenumberInconsistency(format!(
                    "active record {} in section '{}' has no declared sequence",
                    record.id, record.section_key
                )));
            };
            let Some(&section_rank) = rank.get(record.section_key.as_str()) else {
                return Err(RollcallError::RenumberInconsistency(format!(
                    "section '{}' of record {} is not in the section order",
                    record.section_key, record.id
                )));
            };
            keyed.push(((section_rank, seq), record));
        }

        keyed.sort_by_key(|(key, _)| *key);

        if let Some(pair) = keyed.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            let (_, a) = pair[0];
            let (_, b) = pair[1];
            return Err(RollcallError::RenumberInconsistency(format!(
                "records {} and {} both actively hold {}#{}",
                a.id,
                b.id,
                a.section_key,
                a.declared_sequence.unwrap_or_default()
            )));
        }

        let mut assignments = HashMap::with_capacity(keyed.len());
        for (position, (_, record)) in keyed.iter().enumerate() {
            let index = u32::try_from(position + 1).map_err(|_| {
                RollcallError::RenumberInconsistency("more active records than u32 indexes".to_string())
            })?;
            assignments.insert(record.id, index);
        }
        Ok(assignments)
    }
}
