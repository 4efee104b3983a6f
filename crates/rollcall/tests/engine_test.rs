//! Integration tests for the reconciliation engine.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, TimeZone, Utc};
use tempfile::TempDir;

use rollcall::{
    CorrectOptions, Correction, EngineConfig, FieldValue, IncomingRecord, IngestOptions, MemoryStore,
    ProvenanceOp, QualityTag, ReconciliationEngine, RecordRef, RollcallError, SequenceRange, TieBreakRule,
};

/// Engine over a fresh in-memory store.
fn engine() -> ReconciliationEngine {
    ReconciliationEngine::in_memory(EngineConfig::default()).expect("Failed to open engine")
}

/// Engine plus a handle on its store, for failure injection.
fn engine_with_store() -> (ReconciliationEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = ReconciliationEngine::open(EngineConfig::default(), store.clone(), store.clone())
        .expect("Failed to open engine");
    (engine, store)
}

/// A numbered record with a name.
fn entry(section: &str, seq: u32, name: &str) -> IncomingRecord {
    IncomingRecord::new(section)
        .with_declared_sequence(seq)
        .with_field("name", name)
}

fn ingest(engine: &ReconciliationEngine, section: &str, batch: Vec<IncomingRecord>) -> rollcall::IngestReport {
    engine
        .ingest_batch(section, batch, &IngestOptions::new())
        .expect("Ingest failed")
}

// =============================================================================
// Duplicate Resolution
// =============================================================================

#[test]
fn test_duplicate_position_keeps_earliest_extraction() {
    let engine = engine();
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();

    let batch = vec![
        entry("W7B1", 1, "A").with_stable_id("X1").with_extracted_at(t0),
        entry("W7B1", 1, "B")
            .with_stable_id("X2")
            .with_extracted_at(t0 + Duration::minutes(5)),
    ];
    let report = ingest(&engine, "W7B1", batch);

    assert_eq!(report.added, 2);
    assert_eq!(report.duplicates_resolved.len(), 1);
    let dup = &report.duplicates_resolved[0];
    assert_eq!(dup.declared_sequence, 1);
    assert_eq!(dup.winner, RecordRef::stable_id("X1"));
    assert_eq!(dup.rule, TieBreakRule::ExtractionTime);
    assert_eq!(report.canonical_count, 1);

    let dataset = engine.dataset();
    let holders: Vec<_> = dataset
        .records
        .iter()
        .filter(|r| r.section_key == "W7B1" && r.canonical_index == Some(1))
        .collect();
    assert_eq!(holders.len(), 1);
    assert_eq!(holders[0].stable_id(), Some("X1"));

    let loser = dataset.find(&RecordRef::stable_id("X2")).unwrap();
    assert!(!loser.is_active());
    assert_eq!(loser.canonical_index, None);
    let by = loser.superseded_by.as_ref().unwrap();
    assert_eq!(by.stable_id.as_deref(), Some("X1"));
    assert_eq!(by.canonical_index, Some(1));
    assert_eq!(
        loser.provenance_log.last().map(|e| e.operation),
        Some(ProvenanceOp::Superseded)
    );
}

#[test]
fn test_batch_order_is_extraction_order_without_timestamps() {
    // Equal completeness; the first record read off the page wins even when
    // its name sorts later.
    let in_order = engine();
    let batch = vec![
        entry("W7B1", 1, "B").with_stable_id("X1"),
        entry("W7B1", 1, "A").with_stable_id("X2"),
    ];
    let report = ingest(&in_order, "W7B1", batch);
    assert_eq!(report.duplicates_resolved.len(), 1);
    assert_eq!(report.duplicates_resolved[0].winner, RecordRef::stable_id("X1"));
    assert_eq!(report.duplicates_resolved[0].rule, TieBreakRule::ExtractionTime);

    let flipped = engine();
    let batch = vec![
        entry("W7B1", 1, "A").with_stable_id("X2"),
        entry("W7B1", 1, "B").with_stable_id("X1"),
    ];
    let report = ingest(&flipped, "W7B1", batch);
    assert_eq!(report.duplicates_resolved[0].winner, RecordRef::stable_id("X2"));
    assert_eq!(report.duplicates_resolved[0].rule, TieBreakRule::ExtractionTime);
}

#[test]
fn test_more_complete_record_wins() {
    let engine = engine();
    let batch = vec![
        entry("W7B1", 1, "A").with_stable_id("X1"),
        entry("W7B1", 1, "B").with_stable_id("X2").with_field("age", 40),
    ];
    let report = ingest(&engine, "W7B1", batch);

    assert_eq!(report.duplicates_resolved[0].winner, RecordRef::stable_id("X2"));
    assert_eq!(report.duplicates_resolved[0].rule, TieBreakRule::FieldCount);
}

#[test]
fn test_stable_id_wins_regardless_of_input_order() {
    for flipped in [false, true] {
        let engine = engine();
        let with_id = entry("S", 7, "Meena").with_stable_id("ID-7");
        let without_id = entry("S", 7, "Meena K").with_field("age", 52);
        let batch = if flipped {
            vec![without_id, with_id]
        } else {
            vec![with_id, without_id]
        };

        let report = ingest(&engine, "S", batch);
        assert_eq!(report.duplicates_resolved.len(), 1);
        assert_eq!(report.duplicates_resolved[0].winner, RecordRef::stable_id("ID-7"));
        assert_eq!(report.duplicates_resolved[0].rule, TieBreakRule::StableId);
    }
}

#[test]
fn test_duplicate_arriving_in_later_batch() {
    let engine = engine();
    ingest(&engine, "W7B1", vec![entry("W7B1", 1, "A").with_stable_id("X1")]);

    let report = ingest(
        &engine,
        "W7B1",
        vec![entry("W7B1", 1, "B").with_stable_id("X2").with_field("age", 30)],
    );

    assert_eq!(report.added, 1);
    assert_eq!(report.duplicates_resolved.len(), 1);
    assert_eq!(report.duplicates_resolved[0].winner, RecordRef::stable_id("X2"));

    let section = engine.section_report("W7B1").unwrap();
    assert_eq!(section.active, 1);
    assert!(section.duplicates.is_empty());
    assert_eq!(section.superseded.len(), 1);
    assert_eq!(section.superseded[0].stable_id.as_deref(), Some("X1"));
}

// =============================================================================
// Identity Resolution
// =============================================================================

#[test]
fn test_reingest_matches_by_stable_id() {
    let engine = engine();
    ingest(&engine, "W7B1", vec![entry("W7B1", 1, "A").with_stable_id("X1")]);

    let report = ingest(
        &engine,
        "W7B1",
        vec![entry("W7B1", 1, "A").with_stable_id("X1").with_field("age", 29)],
    );

    assert_eq!(report.added, 0);
    assert_eq!(report.matched, 1);
    assert_eq!(report.updated_fields, 1);
    assert!(report.duplicates_resolved.is_empty());

    let dataset = engine.dataset();
    assert_eq!(dataset.records.len(), 1);
    let record = dataset.find(&RecordRef::stable_id("X1")).unwrap();
    assert_eq!(record.field("age"), Some(&FieldValue::Integer(29)));
    assert_eq!(
        record.provenance_log.last().map(|e| e.operation),
        Some(ProvenanceOp::IngestMerge)
    );
}

#[test]
fn test_position_match_adopts_stable_id() {
    let engine = engine();
    ingest(&engine, "W7B1", vec![entry("W7B1", 4, "Ravi")]);

    let report = ingest(&engine, "W7B1", vec![entry("W7B1", 4, "Ravi").with_stable_id("R4")]);

    assert_eq!(report.matched, 1);
    assert_eq!(report.stable_ids_adopted, 1);
    let dataset = engine.dataset();
    assert_eq!(dataset.records.len(), 1);
    assert!(dataset.find(&RecordRef::stable_id("R4")).is_some());
}

#[test]
fn test_identity_conflict_is_reported_not_applied() {
    let engine = engine();
    ingest(&engine, "W7B1", vec![entry("W7B1", 1, "Asha").with_stable_id("X1")]);

    let report = ingest(&engine, "W7B1", vec![entry("W7B1", 1, "Zubair").with_stable_id("X1")]);

    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].target, RecordRef::stable_id("X1"));
    assert_eq!(report.matched, 0);

    let dataset = engine.dataset();
    let record = dataset.find(&RecordRef::stable_id("X1")).unwrap();
    assert_eq!(record.field("name"), Some(&FieldValue::from("Asha")));
}

#[test]
fn test_unidentifiable_records_are_rejected() {
    let engine = engine();
    let batch = vec![
        entry("W7B1", 1, "Asha"),
        IncomingRecord::new("W7B1").with_field("name", "No Number"),
    ];
    let report = ingest(&engine, "W7B1", batch);

    assert_eq!(report.added, 1);
    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].index, 1);
    assert_eq!(engine.dataset().records.len(), 1);
}

#[test]
fn test_all_or_nothing_rejects_whole_batch() {
    let engine = engine();
    let batch = vec![
        entry("W7B1", 1, "Asha"),
        IncomingRecord::new("W7B1").with_field("name", "No Number"),
    ];
    let report = engine
        .ingest_batch("W7B1", batch, &IngestOptions::new().all_or_nothing())
        .unwrap();

    assert!(report.batch_rejected);
    assert_eq!(report.added, 0);
    assert!(engine.dataset().records.is_empty());
    assert!(matches!(
        report.ensure_clean(),
        Err(RollcallError::UnidentifiableRecord { .. })
    ));
}

// =============================================================================
// Gaps and Placeholders
// =============================================================================

#[test]
fn test_gaps_are_reported_not_fabricated() {
    let engine = engine();
    let batch: Vec<_> = (1..=9).map(|seq| entry("S", seq, &format!("P{}", seq))).collect();
    let range = SequenceRange::new(1, 10).unwrap();

    let report = engine
        .ingest_batch("S", batch, &IngestOptions::new().with_expected_range(range))
        .unwrap();

    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].declared_sequence, 10);
    assert!(report.placeholders_created.is_empty());

    let dataset = engine.dataset();
    assert!(dataset.records.iter().all(|r| r.declared_sequence != Some(10)));

    let section = engine.section_report("S").unwrap();
    assert_eq!(section.expected_range, Some(range));
    assert_eq!(section.gaps, vec![10]);
}

#[test]
fn test_stored_range_drives_later_reports() {
    let engine = engine();
    ingest(&engine, "S", vec![entry("S", 1, "A"), entry("S", 2, "B"), entry("S", 12, "L")]);
    assert_eq!(engine.section_report("S").unwrap().gaps.len(), 9);

    let range: SequenceRange = "1..10".parse().unwrap();
    let report = engine.set_expected_range("S", range).unwrap();

    assert_eq!(report.expected_range, Some(range));
    assert_eq!(report.gaps, (3..=10).collect::<Vec<u32>>());
    assert_eq!(report.out_of_range, vec![12]);
    assert_eq!(engine.dataset().expected_range("S"), Some(range));
}

#[test]
fn test_garbled_sequence_reported_out_of_range() {
    let engine = engine();
    let report = ingest(
        &engine,
        "W7B1",
        vec![entry("W7B1", 1, "A"), entry("W7B1", 3, "C"), entry("W7B1", 20_000_000, "Z")],
    );
    assert_eq!(report.added, 3);
    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].declared_sequence, 2);
    assert_eq!(report.canonical_count, 3);

    let section = engine.section_report("W7B1").unwrap();
    assert_eq!(section.expected_range, Some(SequenceRange::new(1, 3).unwrap()));
    assert_eq!(section.out_of_range, vec![20_000_000]);
}

#[test]
fn test_gap_slack_is_configurable() {
    let engine = ReconciliationEngine::in_memory(EngineConfig::default().with_gap_slack(0)).unwrap();
    let report = ingest(&engine, "S", vec![entry("S", 1, "A"), entry("S", 5, "E")]);
    assert!(report.gaps.is_empty());
    assert_eq!(engine.section_report("S").unwrap().out_of_range, vec![5]);

    // An explicit range is taken as given
    engine.set_expected_range("S", SequenceRange::new(1, 5).unwrap()).unwrap();
    assert_eq!(engine.section_report("S").unwrap().gaps, vec![2, 3, 4]);
}

#[test]
fn test_placeholders_fill_gaps_on_request() {
    let engine = engine();
    let batch = vec![entry("S", 1, "A"), entry("S", 4, "D")];

    let report = engine
        .ingest_batch("S", batch, &IngestOptions::new().with_placeholders())
        .unwrap();

    assert_eq!(report.placeholders_created.len(), 2);
    assert_eq!(report.canonical_count, 4);

    let section = engine.section_report("S").unwrap();
    assert!(section.gaps.is_empty());
    assert_eq!(section.pending_manual_entry, vec![2, 3]);

    let dataset = engine.dataset();
    let placeholder = dataset.find(&RecordRef::position("S", 2)).unwrap();
    assert!(placeholder.pending_manual_entry);
    assert_eq!(placeholder.quality.get("name"), Some(&QualityTag::Missing));
    assert_eq!(placeholder.non_blank_field_count(), 0);
}

#[test]
fn test_correction_completes_placeholder() {
    let engine = engine();
    engine
        .ingest_batch(
            "S",
            vec![entry("S", 1, "A"), entry("S", 3, "C")],
            &IngestOptions::new().with_placeholders(),
        )
        .unwrap();

    let mut fill = Correction::for_position("S", 2).with_quality(QualityTag::ManuallyEntered);
    for field in &engine.config().semantic_fields {
        fill = fill.with_field(field.clone(), "entered");
    }
    engine.correct(vec![fill], &CorrectOptions::new()).unwrap();

    let dataset = engine.dataset();
    let record = dataset.find(&RecordRef::position("S", 2)).unwrap();
    assert!(!record.pending_manual_entry);
    assert_eq!(record.quality.get("name"), Some(&QualityTag::ManuallyEntered));
}

// =============================================================================
// Corrections
// =============================================================================

#[test]
fn test_correction_changes_only_named_field() {
    let engine = engine();
    ingest(
        &engine,
        "W7B1",
        vec![entry("W7B1", 1, "A").with_stable_id("X1").with_field("age", 29)],
    );
    let before = engine.dataset().find(&RecordRef::stable_id("X1")).unwrap().clone();

    let report = engine
        .correct(
            vec![Correction::for_stable_id("X1").with_field("age", 31)],
            &CorrectOptions::new(),
        )
        .unwrap();

    assert_eq!(report.applied, 1);
    assert!(report.not_found.is_empty());

    let dataset = engine.dataset();
    let after = dataset.find(&RecordRef::stable_id("X1")).unwrap();
    assert_eq!(after.field("age"), Some(&FieldValue::Integer(31)));
    assert_eq!(after.field("name"), Some(&FieldValue::from("A")));
    assert_eq!(after.provenance_log.len(), before.provenance_log.len() + 1);

    let entry = after.provenance_log.last().unwrap();
    assert_eq!(entry.operation, ProvenanceOp::Corrected);
    assert_eq!(entry.field.as_deref(), Some("age"));
    assert_eq!(entry.prior_value, Some(FieldValue::Integer(29)));
    assert_eq!(entry.new_value, Some(FieldValue::Integer(31)));
    assert_eq!(entry.describe(), "corrected age: 29 -> 31");
}

#[test]
fn test_correction_not_found_is_reported() {
    let engine = engine();
    ingest(&engine, "W7B1", vec![entry("W7B1", 1, "A")]);

    let report = engine
        .correct(
            vec![Correction::for_stable_id("NOPE").with_field("age", 1)],
            &CorrectOptions::new(),
        )
        .unwrap();

    assert_eq!(report.applied, 0);
    assert_eq!(report.not_found.len(), 1);
    assert_eq!(report.deferred, 0);
    assert_eq!(engine.dataset().correction_log.len(), 1);
}

#[test]
fn test_create_missing_position() {
    let engine = engine();
    ingest(&engine, "S", vec![entry("S", 1, "A"), entry("S", 3, "C")]);

    let report = engine
        .correct(
            vec![Correction::for_position("S", 2).with_field("name", "B")],
            &CorrectOptions::new().create_missing(),
        )
        .unwrap();

    assert_eq!(report.created.len(), 1);
    assert_eq!(report.canonical_count, 3);
    let dataset = engine.dataset();
    let created = dataset.find(&RecordRef::position("S", 2)).unwrap();
    assert_eq!(created.canonical_index, Some(2));
}

#[test]
fn test_deferred_correction_applies_on_later_ingest() {
    let engine = engine();
    ingest(&engine, "W7B2", vec![entry("W7B2", 1, "A")]);

    let report = engine
        .correct(
            vec![Correction::for_position("W7B2", 3).with_field("age", 44)],
            &CorrectOptions::new().defer_unmatched(),
        )
        .unwrap();
    assert_eq!(report.deferred, 1);
    assert_eq!(engine.status().unwrap().pending_corrections, 1);

    let report = ingest(&engine, "W7B2", vec![entry("W7B2", 3, "C")]);
    assert_eq!(report.pending_corrections_applied, 1);

    let dataset = engine.dataset();
    assert!(dataset.pending_corrections.is_empty());
    let record = dataset.find(&RecordRef::position("W7B2", 3)).unwrap();
    assert_eq!(record.field("age"), Some(&FieldValue::Integer(44)));
}

#[test]
fn test_refused_deferred_correction_is_reported() {
    let engine = engine();
    let deferred = engine
        .correct(
            vec![Correction::for_position("S", 2).with_new_stable_id("X1")],
            &CorrectOptions::new().defer_unmatched(),
        )
        .unwrap();
    assert_eq!(deferred.deferred, 1);

    // X1 arrives on another record in the same batch as the target
    let report = ingest(
        &engine,
        "S",
        vec![entry("S", 1, "A").with_stable_id("X1"), entry("S", 2, "B")],
    );
    assert_eq!(report.pending_corrections_applied, 0);
    assert_eq!(report.pending_corrections_refused.len(), 1);
    assert_eq!(
        report.pending_corrections_refused[0].target,
        Some(RecordRef::position("S", 2))
    );

    let dataset = engine.dataset();
    assert!(dataset.pending_corrections.is_empty());
    assert_eq!(dataset.find(&RecordRef::position("S", 2)).unwrap().stable_id(), None);
}

#[test]
fn test_identity_edit_moves_record_and_renumbers() {
    let engine = engine();
    ingest(&engine, "S", vec![entry("S", 1, "A"), entry("S", 2, "B"), entry("S", 5, "E")]);

    engine
        .correct(
            vec![Correction::for_position("S", 5).with_new_position("S", 3)],
            &CorrectOptions::new(),
        )
        .unwrap();

    let dataset = engine.dataset();
    let moved = dataset.find(&RecordRef::position("S", 3)).unwrap();
    assert_eq!(moved.field("name"), Some(&FieldValue::from("E")));
    assert_eq!(moved.canonical_index, Some(3));
    assert_eq!(engine.section_report("S").unwrap().gaps, Vec::<u32>::new());
}

// =============================================================================
// Canonical Numbering
// =============================================================================

#[test]
fn test_numbering_is_dense_across_sections() {
    let engine = engine();
    ingest(&engine, "W7B1", vec![entry("W7B1", 1, "A"), entry("W7B1", 3, "C")]);
    ingest(&engine, "W7B2", vec![entry("W7B2", 2, "Q"), entry("W7B2", 1, "P")]);

    let dataset = engine.dataset();
    let order: Vec<_> = dataset
        .canonical_records()
        .iter()
        .map(|r| (r.section_key.clone(), r.declared_sequence, r.canonical_index))
        .collect();
    assert_eq!(
        order,
        vec![
            ("W7B1".to_string(), Some(1), Some(1)),
            ("W7B1".to_string(), Some(3), Some(2)),
            ("W7B2".to_string(), Some(1), Some(3)),
            ("W7B2".to_string(), Some(2), Some(4)),
        ]
    );
}

#[test]
fn test_section_order_changes_numbering() {
    let engine = engine();
    ingest(&engine, "A", vec![entry("A", 1, "a")]);
    ingest(&engine, "B", vec![entry("B", 1, "b")]);

    let report = engine
        .set_section_order(vec!["B".to_string(), "A".to_string()])
        .unwrap();
    assert_eq!(report.changed, 2);

    let dataset = engine.dataset();
    assert_eq!(dataset.find(&RecordRef::position("B", 1)).unwrap().canonical_index, Some(1));
    assert_eq!(dataset.find(&RecordRef::position("A", 1)).unwrap().canonical_index, Some(2));

    let err = engine.set_section_order(vec!["B".to_string()]).unwrap_err();
    assert!(matches!(err, RollcallError::Config(_)));
}

#[test]
fn test_renumber_now_is_idempotent() {
    let engine = engine();
    ingest(&engine, "S", vec![entry("S", 2, "B"), entry("S", 1, "A")]);
    let before: Vec<_> = engine.dataset().records.iter().map(|r| r.canonical_index).collect();

    let report = engine.renumber_now().unwrap();
    assert_eq!(report.changed, 0);
    assert_eq!(report.canonical_count, 2);

    let after: Vec<_> = engine.dataset().records.iter().map(|r| r.canonical_index).collect();
    assert_eq!(before, after);
}

// =============================================================================
// Removal, Snapshots and Rollback
// =============================================================================

#[test]
fn test_removing_winner_reinstates_loser() {
    let engine = engine();
    ingest(
        &engine,
        "W7B1",
        vec![
            entry("W7B1", 1, "A").with_stable_id("X1").with_field("age", 30),
            entry("W7B1", 1, "B").with_stable_id("X2"),
        ],
    );
    let loser_id = engine.dataset().find(&RecordRef::stable_id("X2")).unwrap().id;

    let report = engine
        .remove(&RecordRef::stable_id("X1"), "duplicate scan", Some("auditor"))
        .unwrap();

    assert_eq!(report.removed.stable_id(), Some("X1"));
    assert_eq!(report.reinstated, vec![loser_id]);
    assert_eq!(report.canonical_count, 1);

    let dataset = engine.dataset();
    let reinstated = dataset.get(loser_id).unwrap();
    assert!(reinstated.is_active());
    assert_eq!(reinstated.canonical_index, Some(1));
    assert_eq!(dataset.removal_log.len(), 1);
    assert_eq!(dataset.removal_log[0].actor, "auditor");
    assert_eq!(dataset.removal_log[0].reason, "duplicate scan");
}

#[test]
fn test_remove_unknown_record_fails() {
    let engine = engine();
    let err = engine
        .remove(&RecordRef::stable_id("ghost"), "cleanup", None)
        .unwrap_err();
    assert!(matches!(err, RollcallError::NotFound(_)));
}

#[test]
fn test_every_mutation_is_snapshotted() {
    let engine = engine();
    ingest(&engine, "S", vec![entry("S", 1, "A")]);
    engine
        .correct(vec![Correction::for_position("S", 1).with_field("age", 3)], &CorrectOptions::new())
        .unwrap();
    engine.renumber_now().unwrap();

    let history = engine.history().unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].reason, "renumber");
    assert!(history[0].id > history[1].id);
    assert_eq!(history[2].record_count, 0);
}

#[test]
fn test_rollback_restores_earlier_state() {
    let engine = engine();
    ingest(&engine, "S", vec![entry("S", 1, "A").with_field("age", 29)]);
    let correction = engine
        .correct(vec![Correction::for_position("S", 1).with_field("age", 31)], &CorrectOptions::new())
        .unwrap();

    let report = engine.rollback(correction.snapshot.id).unwrap();
    assert_eq!(report.restored_from.id, correction.snapshot.id);

    let dataset = engine.dataset();
    let record = dataset.find(&RecordRef::position("S", 1)).unwrap();
    assert_eq!(record.field("age"), Some(&FieldValue::Integer(29)));

    // The replaced state was kept; rolling back the rollback brings 31 back
    engine.rollback(report.snapshot.id).unwrap();
    let record = engine.dataset().find(&RecordRef::position("S", 1)).unwrap().clone();
    assert_eq!(record.field("age"), Some(&FieldValue::Integer(31)));
}

#[test]
fn test_rollback_never_reissues_record_handles() {
    let engine = engine();
    ingest(&engine, "S", vec![entry("S", 1, "A").with_stable_id("X1")]);
    let second = ingest(&engine, "S", vec![entry("S", 2, "B").with_stable_id("X2")]);
    let x2 = engine.dataset().find(&RecordRef::stable_id("X2")).unwrap().id;

    engine.rollback(second.snapshot.id).unwrap();
    assert!(engine.dataset().find(&RecordRef::stable_id("X2")).is_none());

    ingest(&engine, "S", vec![entry("S", 2, "C").with_stable_id("X3")]);
    let x3 = engine.dataset().find(&RecordRef::stable_id("X3")).unwrap().id;
    assert!(x3 > x2);
}

#[test]
fn test_prune_keeps_newest() {
    let engine = engine();
    for seq in 1..=4 {
        ingest(&engine, "S", vec![entry("S", seq, "x")]);
    }
    let removed = engine.prune_snapshots(2).unwrap();
    assert_eq!(removed.len(), 2);

    let history = engine.history().unwrap();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|h| h.id > 2));
}

// =============================================================================
// Atomicity
// =============================================================================

#[test]
fn test_failed_publish_leaves_dataset_untouched() {
    let (engine, store) = engine_with_store();
    ingest(&engine, "S", vec![entry("S", 1, "A")]);
    let before = engine.dataset();

    store.fail_publishes(true);
    let err = engine
        .ingest_batch("S", vec![entry("S", 2, "B")], &IngestOptions::new())
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(*engine.dataset(), *before);

    store.fail_publishes(false);
    let report = ingest(&engine, "S", vec![entry("S", 2, "B")]);
    assert_eq!(report.canonical_count, 2);
}

#[test]
fn test_failed_snapshot_blocks_mutation() {
    let (engine, store) = engine_with_store();
    ingest(&engine, "S", vec![entry("S", 1, "A")]);
    let publishes = store.publish_count();

    store.fail_snapshots(true);
    let result = engine.correct(
        vec![Correction::for_position("S", 1).with_field("name", "Z")],
        &CorrectOptions::new(),
    );
    assert!(result.is_err());
    assert_eq!(store.publish_count(), publishes);

    let dataset = engine.dataset();
    let record = dataset.find(&RecordRef::position("S", 1)).unwrap();
    assert_eq!(record.field("name"), Some(&FieldValue::from("A")));
}

#[test]
fn test_readers_never_see_partial_state() {
    let engine = Arc::new(engine());
    ingest(&engine, "S", vec![entry("S", 1, "seed")]);

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for seq in 2..=30 {
                engine
                    .ingest_batch("S", vec![entry("S", seq, "n")], &IngestOptions::new())
                    .unwrap();
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..200 {
                    let dataset = engine.dataset();
                    let indexes: Vec<u32> = dataset
                        .canonical_records()
                        .iter()
                        .filter_map(|r| r.canonical_index)
                        .collect();
                    let expected: Vec<u32> = (1..=indexes.len() as u32).collect();
                    assert_eq!(indexes, expected);
                    assert_eq!(indexes.len(), dataset.records.len());
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(engine.dataset().canonical_count(), 30);
}

// =============================================================================
// Persistence and Export
// =============================================================================

#[test]
fn test_file_store_survives_reopen() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    {
        let engine = ReconciliationEngine::open_dir(dir.path(), EngineConfig::default()).unwrap();
        ingest(&engine, "W7B1", vec![entry("W7B1", 1, "A").with_stable_id("X1")]);
        engine
            .correct(
                vec![Correction::for_stable_id("X1").with_field("age", 31)],
                &CorrectOptions::new(),
            )
            .unwrap();
    }

    let engine = ReconciliationEngine::open_dir(dir.path(), EngineConfig::default()).unwrap();
    let dataset = engine.dataset();
    let record = dataset.find(&RecordRef::stable_id("X1")).unwrap();
    assert_eq!(record.field("age"), Some(&FieldValue::Integer(31)));
    assert_eq!(record.canonical_index, Some(1));

    // Snapshot numbering continues across sessions
    let report = engine.renumber_now().unwrap();
    assert_eq!(report.snapshot.id, 3);
    assert_eq!(engine.history().unwrap().len(), 3);
}

#[test]
fn test_export_csv_in_canonical_order() {
    let engine = engine();
    ingest(&engine, "S", vec![entry("S", 2, "Bela"), entry("S", 1, "Anil").with_stable_id("A1")]);

    let mut out = Vec::new();
    let rows = engine.export_csv(&mut out).unwrap();
    assert_eq!(rows, 2);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(
        lines[0],
        "canonical_index,section_key,declared_sequence,stable_id,pending_manual_entry,name"
    );
    assert_eq!(lines[1], "1,S,1,A1,false,Anil");
    assert_eq!(lines[2], "2,S,2,,false,Bela");
}

#[test]
fn test_find_searches_superseded_too() {
    let engine = engine();
    ingest(
        &engine,
        "S",
        vec![
            entry("S", 1, "Kiran Rao").with_stable_id("K1"),
            entry("S", 1, "Kiran R"),
        ],
    );

    let found = engine.find("name", "kiran");
    assert_eq!(found.len(), 2);
    assert_eq!(found.iter().filter(|r| r.is_active()).count(), 1);
}

#[test]
fn test_unknown_section_report() {
    let engine = engine();
    assert!(matches!(
        engine.section_report("nowhere"),
        Err(RollcallError::NotFound(_))
    ));
}

#[test]
fn test_configured_section_order_applied_on_open() {
    let store = Arc::new(MemoryStore::new());
    {
        let engine = ReconciliationEngine::open(EngineConfig::default(), store.clone(), store.clone()).unwrap();
        ingest(&engine, "A", vec![entry("A", 1, "a")]);
        ingest(&engine, "B", vec![entry("B", 1, "b")]);
    }

    let config = EngineConfig::default().with_section_order(vec!["B".to_string(), "A".to_string()]);
    let engine = ReconciliationEngine::open(config, store.clone(), store).unwrap();
    let dataset = engine.dataset();
    assert_eq!(dataset.section_order, vec!["B", "A"]);
    assert_eq!(dataset.find(&RecordRef::position("B", 1)).unwrap().canonical_index, Some(1));
}

#[test]
fn test_reopen_with_section_missing_from_config() {
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig::default().with_section_order(vec!["A".to_string(), "B".to_string()]);
    {
        let engine = ReconciliationEngine::open(config.clone(), store.clone(), store.clone()).unwrap();
        ingest(&engine, "C", vec![entry("C", 1, "c")]);
        ingest(&engine, "A", vec![entry("A", 1, "a")]);
    }

    let engine = ReconciliationEngine::open(config, store.clone(), store).unwrap();
    let dataset = engine.dataset();
    assert_eq!(dataset.section_order, vec!["A", "B", "C"]);
    assert_eq!(dataset.find(&RecordRef::position("A", 1)).unwrap().canonical_index, Some(1));
    assert_eq!(dataset.find(&RecordRef::position("C", 1)).unwrap().canonical_index, Some(2));
}
