//! Reconciliation orchestrator: the engine's public entry points.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexSet;
use tracing::{debug, info, warn};

use crate::analysis::{GapDuplicateAnalyzer, SectionAnalysis};
use crate::config::EngineConfig;
use crate::correction::{Correction, CorrectionApplier, CorrectionOutcome, CorrectionRef};
use crate::dataset::{CorrectionLogEntry, Dataset, RemovalLogEntry, SequenceRange};
use crate::error::{Result, RollcallError};
use crate::input::IncomingRecord;
use crate::record::{FieldValue, ProvenanceEntry, ProvenanceOp, Record, RecordRef};
use crate::resolve::{IdentityResolver, MatchRule};
use crate::sequence::{CanonicalSequencer, SequenceSummary};
use crate::snapshot::{SnapshotHandle, SnapshotManager};
use crate::store::{DatasetStore, FileStore, MemoryStore, SnapshotStore};

use super::report::{
    ConflictEntry, CorrectOptions, CorrectionReport, EngineStatus, IngestOptions, IngestReport,
    RemovalReport, RenumberReport, ResolvedDuplicate, RollbackReport, SectionGap, SectionReport,
    SupersededEntry,
};

/// The reconciliation engine.
///
/// Every mutating call follows the same path: take the writer lock, snapshot
/// the published dataset, work on a private copy, publish it, and only then
/// swap it in for readers. A failure anywhere before the swap leaves readers
/// and the store on the previous version.
pub struct ReconciliationEngine {
    config: EngineConfig,
    resolver: IdentityResolver,
    store: Arc<dyn DatasetStore>,
    snapshots: Arc<dyn SnapshotStore>,
    writer: Mutex<SnapshotManager>,
    current: RwLock<Arc<Dataset>>,
}

impl ReconciliationEngine {
    /// Open an engine over the given stores, loading the published dataset.
    pub fn open(
        config: EngineConfig,
        store: Arc<dyn DatasetStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        config.validate()?;
        let dataset = store.load()?.unwrap_or_default();
        let manager = SnapshotManager::open(snapshots.clone())?;
        info!(records = dataset.records.len(), sections = dataset.section_order.len(), "opened dataset");

        let engine = Self {
            resolver: IdentityResolver::with_config(config.resolver.clone()),
            config,
            store,
            snapshots,
            writer: Mutex::new(manager),
            current: RwLock::new(Arc::new(dataset)),
        };

        if let Some(configured) = &engine.config.section_order {
            let known = engine.dataset().section_order.clone();
            let order = configured_order(configured, &known);
            if order != known {
                engine.set_section_order(order)?;
            }
        }
        Ok(engine)
    }

    /// Open an engine over a JSON file store rooted at `dir`.
    pub fn open_dir(dir: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let store = Arc::new(FileStore::open(dir)?);
        Self::open(config, store.clone(), store)
    }

    /// Open an engine over a fresh in-memory store.
    pub fn in_memory(config: EngineConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::new());
        Self::open(config, store.clone(), store)
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The current published dataset. Cheap; never blocks on the writer.
    pub fn dataset(&self) -> Arc<Dataset> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ===== Mutating operations =====

    /// Reconcile one extraction batch into the dataset.
    ///
    /// Records without a section key are taken to belong to `section_key`.
    pub fn ingest_batch(
        &self,
        section_key: &str,
        records: Vec<IncomingRecord>,
        options: &IngestOptions,
    ) -> Result<IngestReport> {
        let actor = self.actor(options.actor.as_deref());
        let reason = format!("ingest {}", section_key);

        self.write(&reason, |ds, handle, _| {
            let mut report = IngestReport::new(section_key, handle.clone(), records.len());
            let incoming: Vec<IncomingRecord> = records
                .into_iter()
                .map(|r| r.with_default_section(section_key))
                .collect();

            let resolution = self.resolver.resolve(ds, incoming);
            report.rejected = resolution.rejected.clone();
            report.conflicts = resolution
                .conflicting
                .iter()
                .map(|c| ConflictEntry {
                    index: c.index,
                    target: c.target(ds),
                    reason: c.reason.clone(),
                    incoming: c.incoming.clone(),
                })
                .collect();

            if options.all_or_nothing && !resolution.is_clean() {
                warn!(
                    section = section_key,
                    conflicts = report.conflicts.len(),
                    rejected = report.rejected.len(),
                    "batch rejected as a whole"
                );
                report.batch_rejected = true;
                report.canonical_count = ds.canonical_count();
                return Ok((report, false));
            }

            ds.ensure_section(section_key);
            if let Some(range) = options.expected_range {
                ds.expected_ranges.insert(section_key.to_string(), range);
            }

            let applier = CorrectionApplier::new(actor.as_str());
            let mut touched: IndexSet<String> = IndexSet::new();
            touched.insert(section_key.to_string());

            for matched in resolution.matched {
                let Some(record) = ds.get_mut(matched.existing) else {
                    continue;
                };
                if matched.rule == MatchRule::Position && adopt_stable_id(record, &matched.incoming, &actor) {
                    report.stable_ids_adopted += 1;
                }
                let changes = applier.merge_update(record, &matched.incoming.fields, &matched.incoming.quality);
                report.updated_fields += changes.len();
                report.matched += 1;
                touched.insert(record.section_key.clone());
            }

            let batch_start = extraction_start(ds);
            for unmatched in resolution.new {
                let id = ds.allocate_id();
                // Undated records keep their batch order as extraction order
                let extracted_at = batch_start + Duration::nanoseconds(unmatched.index as i64);
                let record = unmatched.incoming.into_record(id, extracted_at, &actor);
                debug!(record = %id, reference = %record.reference(), "added record");
                touched.insert(record.section_key.clone());
                ds.insert(record);
                report.added += 1;
            }

            let analyses = self.reconcile_sections(ds, &touched, &actor);
            for analysis in &analyses {
                report.gaps.extend(analysis.gaps.iter().map(|&seq| SectionGap {
                    section_key: analysis.section_key.clone(),
                    declared_sequence: seq,
                }));
                report
                    .duplicates_resolved
                    .extend(analysis.duplicates.iter().map(|g| ResolvedDuplicate::new(ds, &analysis.section_key, g)));
            }

            if options.materialize_placeholders {
                let analyzer = GapDuplicateAnalyzer::new(actor.as_str());
                for analysis in &analyses {
                    let created =
                        analyzer.materialize_gaps(ds, &analysis.section_key, &analysis.gaps, &self.config.semantic_fields);
                    report.placeholders_created.extend(
                        created
                            .into_iter()
                            .filter_map(|id| ds.get(id))
                            .map(Record::reference),
                    );
                }
            }

            renumber(ds)?;
            let (applied, refused) = self.retry_pending(ds, handle, &actor)?;
            report.pending_corrections_applied = applied;
            report.pending_corrections_refused = refused;
            report.canonical_count = ds.canonical_count();

            info!(
                section = section_key,
                added = report.added,
                matched = report.matched,
                conflicts = report.conflicts.len(),
                rejected = report.rejected.len(),
                gaps = report.gaps.len(),
                duplicates = report.duplicates_resolved.len(),
                canonical = report.canonical_count,
                "ingested batch"
            );
            Ok((report, true))
        })
    }

    /// Apply explicit corrections.
    pub fn correct(&self, corrections: Vec<Correction>, options: &CorrectOptions) -> Result<CorrectionReport> {
        let actor = self.actor(options.actor.as_deref());

        self.write("correct", |ds, handle, _| {
            let applier = CorrectionApplier::new(actor.as_str()).with_create_missing(options.create_missing);
            let outcome = applier.apply_corrections(ds, &corrections);

            let mut deferred = 0;
            if options.defer_unmatched && !outcome.unmatched.is_empty() {
                deferred = outcome.unmatched.len();
                ds.pending_corrections.extend(outcome.unmatched.iter().cloned());
                info!(deferred, "deferred unmatched corrections");
            }

            let duplicates_resolved = self.settle_identity_edits(ds, &outcome, &actor);
            renumber(ds)?;

            ds.correction_log.push(CorrectionLogEntry {
                at: Utc::now(),
                actor: actor.clone(),
                snapshot_id: handle.id,
                corrections: corrections.clone(),
                applied: outcome.applied,
                not_found: outcome.not_found.iter().filter_map(|c| c.target.clone()).collect(),
            });

            let report = CorrectionReport {
                snapshot: handle.clone(),
                submitted: corrections.len(),
                applied: outcome.applied,
                not_found: outcome.not_found,
                refused: outcome.refused,
                changes: outcome.changes,
                created: outcome.created,
                deferred,
                duplicates_resolved,
                canonical_count: ds.canonical_count(),
            };
            info!(
                submitted = report.submitted,
                applied = report.applied,
                not_found = report.not_found.len(),
                changes = report.changes.len(),
                "applied corrections"
            );
            Ok((report, true))
        })
    }

    /// Renumber the dataset without any other change.
    pub fn renumber_now(&self) -> Result<RenumberReport> {
        self.write("renumber", |ds, handle, _| {
            let summary = renumber(ds)?;
            info!(canonical = summary.numbered, changed = summary.changed, "renumbered");
            Ok((
                RenumberReport {
                    snapshot: handle.clone(),
                    canonical_count: summary.numbered,
                    changed: summary.changed,
                },
                true,
            ))
        })
    }

    /// Remove a record outright. Any records it had beaten in a duplicate
    /// tie-break compete for its position again.
    pub fn remove(&self, reference: &RecordRef, reason: &str, actor: Option<&str>) -> Result<RemovalReport> {
        let actor = self.actor(actor);

        self.write("remove", |ds, handle, _| {
            let id = ds
                .find(reference)
                .map(|r| r.id)
                .ok_or_else(|| RollcallError::NotFound(reference.to_string()))?;
            let beaten: Vec<_> = ds
                .records
                .iter()
                .filter(|r| r.superseded_by.as_ref().is_some_and(|by| by.winner == id))
                .map(|r| r.id)
                .collect();

            let Some(removed) = ds.take(id) else {
                return Err(RollcallError::NotFound(reference.to_string()));
            };
            ds.removal_log.push(RemovalLogEntry {
                at: Utc::now(),
                actor: actor.clone(),
                reason: reason.to_string(),
                snapshot_id: handle.id,
                record: removed.clone(),
            });

            let mut sections = IndexSet::new();
            sections.insert(removed.section_key.clone());
            self.reconcile_sections(ds, &sections, &actor);
            renumber(ds)?;

            let reinstated = beaten
                .into_iter()
                .filter(|id| ds.get(*id).is_some_and(Record::is_active))
                .collect();

            info!(record = %removed.id, reason, "removed record");
            Ok((
                RemovalReport {
                    snapshot: handle.clone(),
                    removed,
                    reinstated,
                    canonical_count: ds.canonical_count(),
                },
                true,
            ))
        })
    }

    /// Restore a snapshot as the current dataset. The state being replaced is
    /// snapshotted first, so a rollback can itself be rolled back.
    pub fn rollback(&self, snapshot_id: u64) -> Result<RollbackReport> {
        let reason = format!("rollback to {}", snapshot_id);

        self.write(&reason, |ds, handle, snapshots| {
            let target = snapshots.find(snapshot_id)?;
            let next_record_id = ds.next_record_id;
            *ds = snapshots.restore(&target)?;
            // Handles issued after the snapshot stay retired
            ds.next_record_id = ds.next_record_id.max(next_record_id);
            renumber(ds)?;
            info!(snapshot = snapshot_id, records = ds.records.len(), "rolled back");
            Ok((
                RollbackReport {
                    snapshot: handle.clone(),
                    restored_from: target,
                    canonical_count: ds.canonical_count(),
                },
                true,
            ))
        })
    }

    /// Store the expected declared-sequence range for a section.
    pub fn set_expected_range(&self, section_key: &str, range: SequenceRange) -> Result<SectionReport> {
        let reason = format!("expected range {} {}", section_key, range);

        self.write(&reason, |ds, _, _| {
            ds.ensure_section(section_key);
            ds.expected_ranges.insert(section_key.to_string(), range);
            renumber(ds)?;
            info!(section = section_key, %range, "set expected range");
            Ok((section_report(ds, section_key, self.config.gap_slack), true))
        })
    }

    /// Replace the section order and renumber.
    pub fn set_section_order(&self, order: Vec<String>) -> Result<RenumberReport> {
        self.write("section order", |ds, handle, _| {
            ds.set_section_order(order)?;
            let summary = renumber(ds)?;
            info!(sections = ds.section_order.len(), changed = summary.changed, "set section order");
            Ok((
                RenumberReport {
                    snapshot: handle.clone(),
                    canonical_count: summary.numbered,
                    changed: summary.changed,
                },
                true,
            ))
        })
    }

    /// Delete all but the newest `keep` snapshots.
    pub fn prune_snapshots(&self, keep: usize) -> Result<Vec<SnapshotHandle>> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .prune(keep)
    }

    // ===== Read operations =====

    /// Gap, duplicate and supersession view of one section.
    pub fn section_report(&self, section_key: &str) -> Result<SectionReport> {
        let dataset = self.dataset();
        if !dataset.has_section(section_key) {
            return Err(RollcallError::NotFound(format!("section '{}'", section_key)));
        }
        Ok(section_report(&dataset, section_key, self.config.gap_slack))
    }

    /// Snapshot handles, newest first. Never blocks on the writer.
    pub fn history(&self) -> Result<Vec<SnapshotHandle>> {
        SnapshotManager::list_in(self.snapshots.as_ref())
    }

    /// Records (active and superseded) matching a predicate.
    pub fn search(&self, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.dataset()
            .records
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }

    /// Records whose `field` contains `needle`, ignoring case.
    pub fn find(&self, field: &str, needle: &str) -> Vec<Record> {
        let needle = needle.trim().to_lowercase();
        self.search(|r| {
            r.field(field)
                .is_some_and(|v| v.comparison_key().contains(&needle))
        })
    }

    /// Write active records in canonical order as CSV. Returns rows written.
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let dataset = self.dataset();
        let records = dataset.canonical_records();

        let field_names: IndexSet<&str> = records
            .iter()
            .flat_map(|r| r.fields.keys().map(String::as_str))
            .collect();

        let mut csv_writer = csv::Writer::from_writer(writer);
        let mut header = vec![
            "canonical_index",
            "section_key",
            "declared_sequence",
            "stable_id",
            "pending_manual_entry",
        ];
        header.extend(field_names.iter().copied());
        csv_writer.write_record(&header)?;

        for record in &records {
            let mut row = vec![
                record.canonical_index.map(|i| i.to_string()).unwrap_or_default(),
                record.section_key.clone(),
                record.declared_sequence.map(|s| s.to_string()).unwrap_or_default(),
                record.stable_id().unwrap_or_default().to_string(),
                record.pending_manual_entry.to_string(),
            ];
            row.extend(
                field_names
                    .iter()
                    .map(|name| record.field(name).map(FieldValue::to_string).unwrap_or_default()),
            );
            csv_writer.write_record(&row)?;
        }
        csv_writer
            .flush()
            .map_err(|e| RollcallError::storage("<export>", e))?;
        Ok(records.len())
    }

    /// Overall counts for the current dataset. Never blocks on the writer.
    pub fn status(&self) -> Result<EngineStatus> {
        let dataset = self.dataset();
        let active = dataset.active_records().count();
        Ok(EngineStatus {
            records: dataset.records.len(),
            active,
            superseded: dataset.records.len() - active,
            canonical_count: dataset.canonical_count(),
            sections: dataset.section_order.clone(),
            pending_manual_entry: dataset
                .active_records()
                .filter(|r| r.pending_manual_entry)
                .count(),
            pending_corrections: dataset.pending_corrections.len(),
            corrections_logged: dataset.correction_log.len(),
            removals_logged: dataset.removal_log.len(),
            latest_snapshot: self.history()?.into_iter().next(),
        })
    }

    // ===== Internals =====

    fn actor(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.config.default_actor)
            .to_string()
    }

    /// Snapshot, mutate a private copy, publish, swap.
    ///
    /// `op` returns its report and whether the copy should be published.
    fn write<R>(
        &self,
        reason: &str,
        op: impl FnOnce(&mut Dataset, &SnapshotHandle, &SnapshotManager) -> Result<(R, bool)>,
    ) -> Result<R> {
        let mut snapshots = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let base = self.dataset();
        let handle = snapshots.snapshot(&base, reason)?;

        let mut working = Dataset::clone(&base);
        let (result, publish) = op(&mut working, &handle, &snapshots)?;

        if publish {
            working.touch();
            self.store.publish(&working)?;
            *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(working);
        }
        Ok(result)
    }

    fn reconcile_sections(
        &self,
        ds: &mut Dataset,
        sections: &IndexSet<String>,
        actor: &str,
    ) -> Vec<SectionAnalysis> {
        let analyzer = GapDuplicateAnalyzer::new(actor).with_gap_slack(self.config.gap_slack);
        sections
            .iter()
            .map(|section| {
                let range = ds.expected_range(section);
                analyzer.reconcile_section(ds, section, range)
            })
            .collect()
    }

    /// Register and re-analyze sections whose membership changed.
    fn settle_identity_edits(
        &self,
        ds: &mut Dataset,
        outcome: &CorrectionOutcome,
        actor: &str,
    ) -> Vec<ResolvedDuplicate> {
        let sections: IndexSet<String> = outcome.touched_sections.iter().cloned().collect();
        for section in &sections {
            ds.ensure_section(section);
        }
        self.reconcile_sections(ds, &sections, actor)
            .iter()
            .flat_map(|a| {
                a.duplicates
                    .iter()
                    .map(|g| ResolvedDuplicate::new(ds, &a.section_key, g))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Retry deferred corrections; renumber again when any applied.
    ///
    /// Returns how many applied and the ones refused, which leave the pending
    /// list for good.
    fn retry_pending(
        &self,
        ds: &mut Dataset,
        handle: &SnapshotHandle,
        actor: &str,
    ) -> Result<(usize, Vec<CorrectionRef>)> {
        if ds.pending_corrections.is_empty() {
            return Ok((0, Vec::new()));
        }

        let pending = std::mem::take(&mut ds.pending_corrections);
        let outcome = CorrectionApplier::new(actor).apply_corrections(ds, &pending);
        ds.pending_corrections = outcome.unmatched.clone();

        for refused in &outcome.refused {
            warn!(index = refused.index, reason = %refused.reason, "dropped deferred correction");
        }
        if outcome.applied == 0 {
            return Ok((0, outcome.refused));
        }

        let unapplied: HashSet<usize> = outcome
            .not_found
            .iter()
            .chain(&outcome.refused)
            .map(|c| c.index)
            .collect();
        let applied: Vec<Correction> = pending
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !unapplied.contains(i))
            .map(|(_, c)| c)
            .collect();

        self.settle_identity_edits(ds, &outcome, actor);
        renumber(ds)?;

        ds.correction_log.push(CorrectionLogEntry {
            at: Utc::now(),
            actor: actor.to_string(),
            snapshot_id: handle.id,
            corrections: applied,
            applied: outcome.applied,
            not_found: Vec::new(),
        });
        info!(applied = outcome.applied, still_pending = ds.pending_corrections.len(), "applied deferred corrections");
        Ok((outcome.applied, outcome.refused))
    }
}

/// The configured order first, then known sections it leaves out, in their
/// current order.
fn configured_order(configured: &[String], known: &[String]) -> Vec<String> {
    let mut order = configured.to_vec();
    order.extend(known.iter().filter(|s| !configured.contains(s)).cloned());
    order
}

/// Default extraction time for a batch: now, or just after the latest
/// extraction already stored when the clock reads earlier.
fn extraction_start(ds: &Dataset) -> DateTime<Utc> {
    let now = Utc::now();
    match ds.records.iter().map(|r| r.extracted_at).max() {
        Some(latest) if latest >= now => latest + Duration::nanoseconds(1),
        _ => now,
    }
}

fn renumber(ds: &mut Dataset) -> Result<SequenceSummary> {
    CanonicalSequencer::new().renumber_in_place(ds)
}

/// Give a position-matched record the incoming stable id when it has none.
fn adopt_stable_id(record: &mut Record, incoming: &IncomingRecord, actor: &str) -> bool {
    let Some(stable_id) = incoming.stable_id() else {
        return false;
    };
    if record.stable_id().is_some() {
        return false;
    }
    record.stable_id = Some(stable_id.to_string());
    record.log(ProvenanceEntry::field_change(
        ProvenanceOp::IdentityEdit,
        actor,
        "stable_id",
        FieldValue::Null,
        FieldValue::Text(stable_id.to_string()),
    ));
    debug!(record = %record.id, stable_id, "adopted stable id");
    true
}

fn section_report(ds: &Dataset, section_key: &str, gap_slack: u32) -> SectionReport {
    let records = ds.section_records(section_key);
    let analysis =
        GapDuplicateAnalyzer::analyze_with_slack(section_key, &records, ds.expected_range(section_key), gap_slack);
    let superseded = records
        .iter()
        .filter_map(|r| {
            r.superseded_by.as_ref().map(|by| SupersededEntry {
                record_id: r.id,
                stable_id: r.stable_id().map(str::to_string),
                declared_sequence: r.declared_sequence,
                superseded_by: by.clone(),
            })
        })
        .collect();

    SectionReport {
        section_key: section_key.to_string(),
        expected_range: analysis.expected_range,
        gaps: analysis.gaps,
        duplicates: analysis
            .duplicates
            .iter()
            .map(|g| ResolvedDuplicate::new(ds, section_key, g))
            .collect(),
        active: analysis.active_count,
        superseded,
        pending_manual_entry: analysis.pending_manual_entry,
        out_of_range: analysis.out_of_range,
    }
}
