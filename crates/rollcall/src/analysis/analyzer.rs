//! Gap and duplicate detection within a section.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DEFAULT_GAP_SLACK;
use crate::dataset::{Dataset, SequenceRange};
use crate::record::{ProvenanceEntry, ProvenanceOp, Record, RecordId, SupersededBy};

use super::tiebreak::{compare, compare_with_rule, TieBreakRule};

/// Records competing for one declared sequence, already decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Contested declared sequence.
    pub declared_sequence: u32,

    /// Record that keeps the position.
    pub winner: RecordId,

    /// Records that lose it, best first.
    pub losers: Vec<RecordId>,

    /// Rule that separated the winner from the runner-up.
    pub rule: TieBreakRule,
}

/// Result of analyzing one section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionAnalysis {
    /// Section analyzed.
    pub section_key: String,

    /// Range gaps were computed against; `None` without a configured range
    /// when no active record declares a plausible sequence.
    pub expected_range: Option<SequenceRange>,

    /// Active records considered.
    pub active_count: usize,

    /// Declared sequences in range with no active record.
    pub gaps: Vec<u32>,

    /// Positions claimed by more than one active record.
    pub duplicates: Vec<DuplicateGroup>,

    /// Declared sequences outside the expected range.
    pub out_of_range: Vec<u32>,

    /// Positions held by placeholders still awaiting manual entry.
    pub pending_manual_entry: Vec<u32>,
}

impl SectionAnalysis {
    /// Whether the section has no gaps and no duplicates.
    pub fn is_clean(&self) -> bool {
        self.gaps.is_empty() && self.duplicates.is_empty()
    }
}

/// Finds gaps and duplicates, picks duplicate winners, and marks losers.
///
/// Gaps are only ever reported or filled with explicit placeholders; the
/// analyzer never invents field content.
#[derive(Debug, Clone)]
pub struct GapDuplicateAnalyzer {
    actor: String,
    gap_slack: u32,
}

impl GapDuplicateAnalyzer {
    /// Create an analyzer acting as `actor`.
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actor: actor.into(),
            gap_slack: DEFAULT_GAP_SLACK,
        }
    }

    /// Set how far an inferred range may reach past the numbered records.
    pub fn with_gap_slack(mut self, slack: u32) -> Self {
        self.gap_slack = slack;
        self
    }

    /// Analyze a section's records without changing anything, inferring any
    /// missing range with the default slack.
    pub fn analyze(
        section_key: &str,
        records: &[&Record],
        expected_range: Option<SequenceRange>,
    ) -> SectionAnalysis {
        Self::analyze_with_slack(section_key, records, expected_range, DEFAULT_GAP_SLACK)
    }

    /// Analyze a section's records without changing anything.
    ///
    /// Only active records take part. Without an explicit range, the range is
    /// `1..=max`, where `max` is the highest declared sequence no greater than
    /// the count of numbered positions plus `gap_slack`. Sequences past that
    /// are reported out of range, so one garbled number cannot open a huge
    /// run of gaps.
    pub fn analyze_with_slack(
        section_key: &str,
        records: &[&Record],
        expected_range: Option<SequenceRange>,
        gap_slack: u32,
    ) -> SectionAnalysis {
        let mut by_sequence: BTreeMap<u32, Vec<&Record>> = BTreeMap::new();
        let mut active_count = 0;
        let mut pending_manual_entry = Vec::new();
        for record in records.iter().copied().filter(|r| r.is_active()) {
            active_count += 1;
            if let Some(seq) = record.declared_sequence {
                by_sequence.entry(seq).or_default().push(record);
                if record.pending_manual_entry {
                    pending_manual_entry.push(seq);
                }
            }
        }
        pending_manual_entry.sort_unstable();
        pending_manual_entry.dedup();

        let range = expected_range.or_else(|| {
            let cap = u32::try_from(by_sequence.len())
                .unwrap_or(u32::MAX)
                .saturating_add(gap_slack);
            by_sequence
                .range(..=cap)
                .next_back()
                .map(|(&max, _)| SequenceRange { start: 1, end: max.max(1) })
        });

        let gaps: Vec<u32> = range
            .map(|r| r.iter().filter(|seq| !by_sequence.contains_key(seq)).collect())
            .unwrap_or_default();

        let out_of_range: Vec<u32> = match range {
            Some(r) => by_sequence.keys().copied().filter(|seq| !r.contains(*seq)).collect(),
            None => by_sequence.keys().copied().collect(),
        };

        let duplicates = by_sequence
            .into_iter()
            .filter(|(_, claimants)| claimants.len() > 1)
            .map(|(declared_sequence, mut claimants)| {
                claimants.sort_by(|a, b| compare(a, b));
                let (_, rule) = compare_with_rule(claimants[0], claimants[1]);
                DuplicateGroup {
                    declared_sequence,
                    winner: claimants[0].id,
                    losers: claimants[1..].iter().map(|r| r.id).collect(),
                    rule,
                }
            })
            .collect();

        SectionAnalysis {
            section_key: section_key.to_string(),
            expected_range: range,
            active_count,
            gaps,
            duplicates,
            out_of_range,
            pending_manual_entry,
        }
    }

    /// Analyze a section and settle its duplicates in place.
    ///
    /// Superseded records whose winner no longer holds their position are
    /// reinstated first, then every duplicate loser is marked superseded.
    /// Running this twice in a row changes nothing the second time.
    pub fn reconcile_section(
        &self,
        dataset: &mut Dataset,
        section_key: &str,
        expected_range: Option<SequenceRange>,
    ) -> SectionAnalysis {
        self.reinstate_orphans(dataset, section_key);

        let analysis = {
            let records = dataset.section_records(section_key);
            Self::analyze_with_slack(section_key, &records, expected_range, self.gap_slack)
        };

        for group in &analysis.duplicates {
            self.supersede(dataset, group);
        }

        debug!(
            section = section_key,
            gaps = analysis.gaps.len(),
            duplicates = analysis.duplicates.len(),
            "analyzed section"
        );
        analysis
    }

    /// Insert a placeholder at each gap: every field blank and tagged missing,
    /// flagged for manual entry.
    pub fn materialize_gaps(
        &self,
        dataset: &mut Dataset,
        section_key: &str,
        gaps: &[u32],
        field_names: &[String],
    ) -> Vec<RecordId> {
        let mut created = Vec::with_capacity(gaps.len());
        for &seq in gaps {
            let id = dataset.allocate_id();
            dataset.insert(Record::placeholder(id, section_key, seq, field_names, &self.actor));
            created.push(id);
        }
        if !created.is_empty() {
            info!(section = section_key, count = created.len(), "inserted placeholders");
        }
        created
    }

    fn reinstate_orphans(&self, dataset: &mut Dataset, section_key: &str) {
        let orphans: Vec<RecordId> = dataset
            .records
            .iter()
            .filter(|r| r.section_key == section_key)
            .filter_map(|r| {
                let by = r.superseded_by.as_ref()?;
                let held = dataset
                    .get(by.winner)
                    .is_some_and(|w| w.is_active() && w.position() == r.position());
                (!held).then_some(r.id)
            })
            .collect();

        for id in orphans {
            if let Some(record) = dataset.get_mut(id) {
                record.superseded_by = None;
                record.log(
                    ProvenanceEntry::new(ProvenanceOp::Reinstated, &self.actor)
                        .with_note("winner no longer holds this position"),
                );
                debug!(record = %id, "reinstated superseded record");
            }
        }
    }

    fn supersede(&self, dataset: &mut Dataset, group: &DuplicateGroup) {
        let Some(winner) = dataset.get(group.winner) else {
            return;
        };
        let pointer = SupersededBy::new(winner);
        let note = format!(
            "lost sequence {} to {} ({})",
            group.declared_sequence,
            winner.reference(),
            group.rule.label()
        );

        for loser in dataset
            .records
            .iter_mut()
            .filter(|r| group.losers.contains(&r.id))
        {
            loser.superseded_by = Some(pointer.clone());
            loser.canonical_index = None;
            loser.log(ProvenanceEntry::new(ProvenanceOp::Superseded, &self.actor).with_note(note.clone()));
            info!(loser = %loser.id, winner = %group.winner, sequence = group.declared_sequence, "superseded duplicate");
        }

        // Earlier losers of a record that just lost follow it to the new winner
        for record in dataset.records.iter_mut() {
            let redirected = record
                .superseded_by
                .as_ref()
                .is_some_and(|by| group.losers.contains(&by.winner));
            if redirected {
                record.superseded_by = Some(pointer.clone());
                record.log(
                    ProvenanceEntry::new(ProvenanceOp::Superseded, &self.actor)
                        .with_note(format!("redirected to {}", pointer)),
                );
            }
        }
    }
}

impl Default for GapDuplicateAnalyzer {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_ACTOR)
    }
}
