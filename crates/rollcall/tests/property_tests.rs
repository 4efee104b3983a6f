//! Property-based tests for reconciliation invariants.
//!
//! These tests use proptest to generate random batches and verify that the
//! analyzer and sequencer keep their guarantees under all inputs.
//!
//! # Running Property Tests
//!
//! ```bash
//! cargo test -p rollcall --test property_tests
//!
//! # More cases (slower but more thorough)
//! PROPTEST_CASES=10000 cargo test -p rollcall --test property_tests
//! ```

use std::collections::HashSet;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use rollcall::{
    CanonicalSequencer, Dataset, EngineConfig, GapDuplicateAnalyzer, IncomingRecord, IngestOptions, Record,
    RecordId, ReconciliationEngine, SequenceRange,
};

// =============================================================================
// Test Strategies
// =============================================================================

/// One raw claimant: section, sequence, has stable id, field count, minute offset.
type Claimant = (usize, u32, bool, usize, i64);

fn claimant() -> impl Strategy<Value = Claimant> {
    (0usize..3, 1u32..15, any::<bool>(), 0usize..4, 0i64..5)
}

/// Build a dataset in the given order. Each claimant keeps the stable id
/// derived from its position in the generated list, so reordering never
/// changes record content.
fn build_dataset(claimants: &[(usize, Claimant)]) -> Dataset {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let mut ds = Dataset::new();
    for (origin, (section, seq, has_id, fields, minutes)) in claimants {
        let id = ds.allocate_id();
        let mut record = Record::new(id, format!("S{}", section))
            .with_declared_sequence(*seq)
            .with_extracted_at(base + Duration::minutes(*minutes));
        if *has_id {
            record = record.with_stable_id(format!("ID{}", origin));
        }
        for f in 0..*fields {
            record = record.with_field(format!("f{}", f), format!("v{}-{}", seq, f));
        }
        ds.insert(record);
    }
    ds
}

fn numbered(claimants: Vec<Claimant>) -> Vec<(usize, Claimant)> {
    claimants.into_iter().enumerate().collect()
}

fn reconcile_all(ds: &mut Dataset) {
    let analyzer = GapDuplicateAnalyzer::new("proptest");
    for section in ds.section_order.clone() {
        let range = ds.expected_range(&section);
        analyzer.reconcile_section(ds, &section, range);
    }
}

/// Winner for each contested position, keyed by the winner's content.
fn winners(ds: &Dataset) -> Vec<(String, u32, Option<String>, String)> {
    let mut out: Vec<_> = ds
        .active_records()
        .map(|r| {
            (
                r.section_key.clone(),
                r.declared_sequence.unwrap_or_default(),
                r.stable_id().map(str::to_string),
                r.fingerprint(),
            )
        })
        .collect();
    out.sort();
    out
}

// =============================================================================
// Analyzer Properties
// =============================================================================

proptest! {
    /// After reconciling, no two active records share a position.
    #[test]
    fn reconcile_leaves_one_holder_per_position(claimants in prop::collection::vec(claimant(), 1..40)) {
        let mut ds = build_dataset(&numbered(claimants.clone()));
        reconcile_all(&mut ds);

        let mut seen = HashSet::new();
        for record in ds.active_records() {
            prop_assert!(seen.insert((record.section_key.clone(), record.declared_sequence)));
        }
        // Nothing is ever dropped
        prop_assert_eq!(ds.records.len(), claimants.len());
    }

    /// Reconciling twice changes nothing the second time.
    #[test]
    fn reconcile_is_idempotent(claimants in prop::collection::vec(claimant(), 1..40)) {
        let mut ds = build_dataset(&numbered(claimants.clone()));
        reconcile_all(&mut ds);
        let once = ds.clone();
        reconcile_all(&mut ds);
        prop_assert_eq!(ds, once);
    }

    /// The same claimants in any order produce the same winners.
    #[test]
    fn winners_do_not_depend_on_input_order(
        claimants in prop::collection::vec(claimant(), 1..30),
        seed in any::<u64>(),
    ) {
        let original = numbered(claimants);
        let mut shuffled = original.clone();
        for i in (1..shuffled.len()).rev() {
            let j = (seed.wrapping_mul(i as u64 + 7) % (i as u64 + 1)) as usize;
            shuffled.swap(i, j);
        }

        let mut a = build_dataset(&original);
        let mut b = build_dataset(&shuffled);
        reconcile_all(&mut a);
        reconcile_all(&mut b);
        prop_assert_eq!(winners(&a), winners(&b));
    }

    /// Gaps are exactly the unclaimed sequences of the range.
    #[test]
    fn gaps_are_unclaimed_sequences(
        sequences in prop::collection::btree_set(1u32..50, 0..30),
        end in 1u32..60,
    ) {
        let mut ds = Dataset::new();
        for &seq in &sequences {
            let id = ds.allocate_id();
            ds.insert(Record::new(id, "S").with_declared_sequence(seq));
        }
        let range = SequenceRange::new(1, end).unwrap();
        let records = ds.section_records("S");
        let analysis = GapDuplicateAnalyzer::analyze("S", &records, Some(range));

        let expected: Vec<u32> = (1..=end).filter(|s| !sequences.contains(s)).collect();
        prop_assert_eq!(analysis.gaps, expected);
        prop_assert!(analysis.out_of_range.iter().all(|s| *s > end));
        prop_assert_eq!(ds.records.len(), sequences.len());
    }
}

// =============================================================================
// Sequencer Properties
// =============================================================================

proptest! {
    /// Canonical indexes are exactly 1..=N over active records.
    #[test]
    fn numbering_is_dense(claimants in prop::collection::vec(claimant(), 1..40)) {
        let mut ds = build_dataset(&numbered(claimants.clone()));
        reconcile_all(&mut ds);
        CanonicalSequencer::new().renumber_in_place(&mut ds).unwrap();

        let mut indexes: Vec<u32> = ds.active_records().filter_map(|r| r.canonical_index).collect();
        indexes.sort_unstable();
        let active = ds.active_records().count() as u32;
        prop_assert_eq!(indexes, (1..=active).collect::<Vec<_>>());
        prop_assert!(ds.records.iter().filter(|r| !r.is_active()).all(|r| r.canonical_index.is_none()));
    }

    /// Renumbering a renumbered dataset is a no-op.
    #[test]
    fn renumber_is_idempotent(claimants in prop::collection::vec(claimant(), 1..40)) {
        let mut ds = build_dataset(&numbered(claimants.clone()));
        reconcile_all(&mut ds);
        let sequencer = CanonicalSequencer::new();
        sequencer.renumber_in_place(&mut ds).unwrap();
        let once = ds.clone();
        let summary = sequencer.renumber_in_place(&mut ds).unwrap();
        prop_assert_eq!(summary.changed, 0);
        prop_assert_eq!(ds, once);
    }

    /// Index order follows section order, then declared sequence.
    #[test]
    fn numbering_follows_position_order(claimants in prop::collection::vec(claimant(), 1..40)) {
        let mut ds = build_dataset(&numbered(claimants.clone()));
        reconcile_all(&mut ds);
        CanonicalSequencer::new().renumber_in_place(&mut ds).unwrap();

        let rank = |key: &str| ds.section_order.iter().position(|s| s == key).unwrap();
        let ordered = ds.canonical_records();
        for pair in ordered.windows(2) {
            let a = (rank(&pair[0].section_key), pair[0].declared_sequence);
            let b = (rank(&pair[1].section_key), pair[1].declared_sequence);
            prop_assert!(a < b);
        }
    }
}

// =============================================================================
// Engine Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Ingesting the same batch twice adds nothing the second time.
    #[test]
    fn reingest_is_stable(sequences in prop::collection::btree_set(1u32..30, 1..15)) {
        let engine = ReconciliationEngine::in_memory(EngineConfig::default()).unwrap();
        let batch: Vec<_> = sequences
            .iter()
            .map(|&seq| {
                IncomingRecord::new("S")
                    .with_declared_sequence(seq)
                    .with_stable_id(format!("S-{}", seq))
                    .with_field("name", format!("Name {}", seq))
            })
            .collect();

        let first = engine.ingest_batch("S", batch.clone(), &IngestOptions::new()).unwrap();
        let before = engine.dataset().records.clone();
        let second = engine.ingest_batch("S", batch, &IngestOptions::new()).unwrap();

        prop_assert_eq!(first.added, sequences.len());
        prop_assert_eq!(second.added, 0);
        prop_assert_eq!(second.matched, sequences.len());
        prop_assert_eq!(second.updated_fields, 0);
        prop_assert_eq!(&engine.dataset().records, &before);
    }
}

#[test]
fn record_ids_are_never_reused() {
    let engine = ReconciliationEngine::in_memory(EngineConfig::default()).unwrap();
    engine
        .ingest_batch(
            "S",
            vec![IncomingRecord::new("S").with_declared_sequence(1)],
            &IngestOptions::new(),
        )
        .unwrap();
    engine
        .remove(&rollcall::RecordRef::id(RecordId(1)), "test", None)
        .unwrap();
    engine
        .ingest_batch(
            "S",
            vec![IncomingRecord::new("S").with_declared_sequence(1)],
            &IngestOptions::new(),
        )
        .unwrap();
    assert_eq!(engine.dataset().records[0].id, RecordId(2));
}
