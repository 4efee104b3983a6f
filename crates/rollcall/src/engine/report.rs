//! Options and structured reports for engine operations.

use serde::{Deserialize, Serialize};

use crate::analysis::{DuplicateGroup, TieBreakRule};
use crate::correction::{CorrectionRef, FieldChange};
use crate::dataset::{Dataset, SequenceRange};
use crate::error::{Result, RollcallError};
use crate::input::IncomingRecord;
use crate::record::{Record, RecordId, RecordRef, SupersededBy};
use crate::resolve::{ConflictReason, Rejected};
use crate::snapshot::SnapshotHandle;

/// Options for [`ReconciliationEngine::ingest_batch`](super::ReconciliationEngine::ingest_batch).
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Reject the whole batch when any record conflicts or is rejected.
    pub all_or_nothing: bool,

    /// Fill gaps with placeholder records awaiting manual entry.
    pub materialize_placeholders: bool,

    /// Expected range for the batch's section; stored for later analyses.
    pub expected_range: Option<SequenceRange>,

    /// Actor for provenance entries (default: the configured actor).
    pub actor: Option<String>,
}

impl IngestOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the whole batch on any conflict or rejection.
    pub fn all_or_nothing(mut self) -> Self {
        self.all_or_nothing = true;
        self
    }

    /// Insert placeholders at gaps.
    pub fn with_placeholders(mut self) -> Self {
        self.materialize_placeholders = true;
        self
    }

    /// Set the expected range for the batch's section.
    pub fn with_expected_range(mut self, range: SequenceRange) -> Self {
        self.expected_range = Some(range);
        self
    }

    /// Set the actor.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// Options for [`ReconciliationEngine::correct`](super::ReconciliationEngine::correct).
#[derive(Debug, Clone, Default)]
pub struct CorrectOptions {
    /// Create records for position targets that do not exist.
    pub create_missing: bool,

    /// Keep not-found corrections and retry them on later ingests.
    pub defer_unmatched: bool,

    /// Actor for provenance entries (default: the configured actor).
    pub actor: Option<String>,
}

impl CorrectOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create records for missing position targets.
    pub fn create_missing(mut self) -> Self {
        self.create_missing = true;
        self
    }

    /// Retry not-found corrections on later ingests.
    pub fn defer_unmatched(mut self) -> Self {
        self.defer_unmatched = true;
        self
    }

    /// Set the actor.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// A declared sequence with no active record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionGap {
    pub section_key: String,
    pub declared_sequence: u32,
}

/// A settled duplicate, with records named the way reports name them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDuplicate {
    pub section_key: String,
    pub declared_sequence: u32,
    pub winner: RecordRef,
    pub losers: Vec<RecordId>,
    pub rule: TieBreakRule,
}

impl ResolvedDuplicate {
    pub(crate) fn new(dataset: &Dataset, section_key: &str, group: &DuplicateGroup) -> Self {
        let winner = dataset
            .get(group.winner)
            .map_or_else(|| RecordRef::id(group.winner), Record::reference);
        Self {
            section_key: section_key.to_string(),
            declared_sequence: group.declared_sequence,
            winner,
            losers: group.losers.clone(),
            rule: group.rule,
        }
    }
}

/// An incoming record that collided with existing content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    /// Index in the submitted batch.
    pub index: usize,

    /// Record the conflict is about.
    pub target: RecordRef,

    /// What collided.
    pub reason: ConflictReason,

    /// The incoming record, untouched, for manual review.
    pub incoming: IncomingRecord,
}

/// Result of one ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Section the batch was submitted for.
    pub section_key: String,

    /// Snapshot taken before anything changed.
    pub snapshot: SnapshotHandle,

    /// Records submitted.
    pub received: usize,

    /// Whether the batch was refused as a whole (nothing changed).
    pub batch_rejected: bool,

    /// New records inserted.
    pub added: usize,

    /// Incoming records matched to existing ones.
    pub matched: usize,

    /// Field values changed by matched records.
    pub updated_fields: usize,

    /// Stable ids assigned to records that had none.
    pub stable_ids_adopted: usize,

    /// Identity conflicts, not applied.
    pub conflicts: Vec<ConflictEntry>,

    /// Records that could not be identified or placed.
    pub rejected: Vec<Rejected>,

    /// Gaps found in the affected sections.
    pub gaps: Vec<SectionGap>,

    /// Duplicates settled by the tie-break.
    pub duplicates_resolved: Vec<ResolvedDuplicate>,

    /// Placeholders inserted at gaps.
    pub placeholders_created: Vec<RecordRef>,

    /// Deferred corrections that found their target during this ingest.
    pub pending_corrections_applied: usize,

    /// Deferred corrections that found their target but were refused, and
    /// so were dropped from the pending list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_corrections_refused: Vec<CorrectionRef>,

    /// Active records after the ingest.
    pub canonical_count: usize,
}

impl IngestReport {
    pub(crate) fn new(section_key: &str, snapshot: SnapshotHandle, received: usize) -> Self {
        Self {
            section_key: section_key.to_string(),
            snapshot,
            received,
            batch_rejected: false,
            added: 0,
            matched: 0,
            updated_fields: 0,
            stable_ids_adopted: 0,
            conflicts: Vec::new(),
            rejected: Vec::new(),
            gaps: Vec::new(),
            duplicates_resolved: Vec::new(),
            placeholders_created: Vec::new(),
            pending_corrections_applied: 0,
            pending_corrections_refused: Vec::new(),
            canonical_count: 0,
        }
    }

    /// Turn the first conflict or rejection into an error.
    pub fn ensure_clean(&self) -> Result<()> {
        if let Some(rejected) = self.rejected.first() {
            return Err(RollcallError::UnidentifiableRecord {
                section_key: rejected
                    .incoming
                    .section_key()
                    .unwrap_or(&self.section_key)
                    .to_string(),
                detail: format!("batch record {}: {}", rejected.index, rejected.detail),
            });
        }
        if let Some(conflict) = self.conflicts.first() {
            return Err(RollcallError::IdentityConflict {
                target: conflict.target.clone(),
                detail: format!("batch record {}: {}", conflict.index, conflict.reason),
            });
        }
        Ok(())
    }
}

/// Result of one `correct` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionReport {
    /// Snapshot taken before anything changed.
    pub snapshot: SnapshotHandle,

    /// Corrections submitted.
    pub submitted: usize,

    /// Corrections that found (or created) their target.
    pub applied: usize,

    /// Corrections whose target does not exist.
    pub not_found: Vec<CorrectionRef>,

    /// Corrections refused to protect stable-id uniqueness.
    pub refused: Vec<CorrectionRef>,

    /// Every field value that changed.
    pub changes: Vec<FieldChange>,

    /// Records created for missing position targets.
    pub created: Vec<RecordRef>,

    /// Not-found corrections kept for later ingests.
    pub deferred: usize,

    /// Duplicates settled after identity edits.
    pub duplicates_resolved: Vec<ResolvedDuplicate>,

    /// Active records after the call.
    pub canonical_count: usize,
}

/// Result of an explicit renumber or section reorder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenumberReport {
    /// Snapshot taken before renumbering.
    pub snapshot: SnapshotHandle,

    /// Active records numbered.
    pub canonical_count: usize,

    /// Records whose canonical index changed.
    pub changed: usize,
}

/// A superseded record and where it points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupersededEntry {
    pub record_id: RecordId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_sequence: Option<u32>,
    pub superseded_by: SupersededBy,
}

/// Read-only view of one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionReport {
    pub section_key: String,
    pub expected_range: Option<SequenceRange>,
    pub gaps: Vec<u32>,
    /// Active duplicates not yet settled (empty after any reconcile).
    pub duplicates: Vec<ResolvedDuplicate>,
    pub active: usize,
    pub superseded: Vec<SupersededEntry>,
    pub pending_manual_entry: Vec<u32>,
    pub out_of_range: Vec<u32>,
}

/// Result of removing a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemovalReport {
    /// Snapshot taken before removal.
    pub snapshot: SnapshotHandle,

    /// The record as it was when removed.
    pub removed: Record,

    /// Former losers that took its place again.
    pub reinstated: Vec<RecordId>,

    /// Active records after removal.
    pub canonical_count: usize,
}

/// Result of rolling back to a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Snapshot of the state being replaced.
    pub snapshot: SnapshotHandle,

    /// Snapshot that was restored.
    pub restored_from: SnapshotHandle,

    /// Active records after the rollback.
    pub canonical_count: usize,
}

/// Overall counts for the current dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub records: usize,
    pub active: usize,
    pub superseded: usize,
    pub canonical_count: usize,
    pub sections: Vec<String>,
    pub pending_manual_entry: usize,
    pub pending_corrections: usize,
    pub corrections_logged: usize,
    pub removals_logged: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_snapshot: Option<SnapshotHandle>,
}
